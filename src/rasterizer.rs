use image::{Rgba, RgbaImage};
use ndarray::{ArrayView2, Zip};

use crate::color_table::Color;
use crate::colormap::SliceColorRule;
use crate::error::RenderError;

/// Color every sample of the slice. Row `r`, column `c` becomes pixel `(c, r)`.
///
/// # Errors
///
/// Returns `RenderError::MissingRuleEntry` for the first sample the rule cannot color.
pub fn rasterize(
    slice: &ArrayView2<'_, f64>,
    rule: &SliceColorRule,
) -> Result<RgbaImage, RenderError> {
    let (rows, cols) = slice.dim();
    let (Ok(width), Ok(height)) = (u32::try_from(cols), u32::try_from(rows)) else {
        return Err(RenderError::Oversized { rows, cols });
    };

    let pixels = Zip::from(slice).par_map_collect(|&value| {
        rule.color_for(value).map(Color::to_pixel).ok_or(value)
    });

    let mut image = RgbaImage::new(width, height);
    for ((row, col), pixel) in pixels.indexed_iter() {
        let pixel: Rgba<u8> = (*pixel).map_err(|value| RenderError::MissingRuleEntry { value })?;
        image.put_pixel(col as u32, row as u32, pixel);
    }
    Ok(image)
}
