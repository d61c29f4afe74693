use image::{Rgba, RgbaImage, imageops};
use ndarray::ArrayView2;
use thiserror::Error;

use crate::colormap::{HighlightError, RuleBuild, SliceColorRule, SliceColoring};
use crate::enums::Axis;
use crate::error::RenderError;
use crate::rasterizer::rasterize;

/// A slice that rendered, but not the way its profile asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// The transparent grayscale ramp could not be built.
    GrayscaleFallback,
    /// The highlight layer failed; only the grayscale background was kept.
    HighlightFallback,
    /// Background transparency removal was skipped.
    BackgroundKept,
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("highlight layer is {top:?} but the background is {base:?}")]
    SizeMismatch { base: (u32, u32), top: (u32, u32) },

    #[error(transparent)]
    Highlight(#[from] HighlightError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("a {0}x{1} image has no background sample at (1, 1)")]
    NoBackgroundSample(u32, u32),
}

#[derive(Debug, Clone)]
pub struct ComposedSlice {
    pub image: RgbaImage,
    pub degradations: Vec<Degradation>,
}

/// Render a slice into its final image, ready for the writer.
///
/// # Errors
///
/// Only a `RenderError` of the main layer is returned; highlight and post-processing
/// failures degrade the image instead.
pub fn compose(
    slice: &ArrayView2<'_, f64>,
    coloring: &SliceColoring,
    axis: Axis,
) -> Result<ComposedSlice, RenderError> {
    let mut degradations = Vec::new();
    let (mut image, strip_background) = match coloring {
        SliceColoring::Single {
            rule,
            remove_background,
        } => {
            note_fallback(rule, &mut degradations);
            (rasterize(slice, &rule.rule)?, *remove_background)
        }
        SliceColoring::Layered {
            background,
            highlight,
        } => {
            note_fallback(background, &mut degradations);
            match layered(slice, background, highlight) {
                Ok(image) => (image, false),
                Err(err) => {
                    tracing::warn!("Highlight layer failed ({err}), keeping the grayscale only");
                    degradations.push(Degradation::HighlightFallback);
                    let plain = SliceColorRule::standard_grayscale(slice);
                    (rasterize(slice, &plain)?, true)
                }
            }
        }
    };

    if strip_background {
        if let Err(err) = remove_background(&mut image) {
            tracing::warn!("Could not remove the background: {err}");
            degradations.push(Degradation::BackgroundKept);
        }
    }
    flip_for_axis(&mut image, axis);

    Ok(ComposedSlice {
        image,
        degradations,
    })
}

fn note_fallback(rule: &RuleBuild, degradations: &mut Vec<Degradation>) {
    if rule.fallback {
        degradations.push(Degradation::GrayscaleFallback);
    }
}

fn layered(
    slice: &ArrayView2<'_, f64>,
    background: &RuleBuild,
    highlight: &Result<SliceColorRule, HighlightError>,
) -> Result<RgbaImage, CompositeError> {
    let highlight = highlight.as_ref().map_err(Clone::clone)?;
    let mut base = rasterize(slice, &background.rule)?;
    let top = rasterize(slice, highlight)?;
    alpha_over(&mut base, &top)?;
    Ok(base)
}

/// Alpha-composite `top` over `base` in place.
pub fn alpha_over(base: &mut RgbaImage, top: &RgbaImage) -> Result<(), CompositeError> {
    if base.dimensions() != top.dimensions() {
        return Err(CompositeError::SizeMismatch {
            base: base.dimensions(),
            top: top.dimensions(),
        });
    }
    for (below, above) in base.pixels_mut().zip(top.pixels()) {
        *below = over(*below, *above);
    }
    Ok(())
}

#[inline]
fn over(below: Rgba<u8>, above: Rgba<u8>) -> Rgba<u8> {
    match above[3] {
        0 => below,
        255 => above,
        alpha => {
            let top_a = f32::from(alpha) / 255.0;
            let base_a = f32::from(below[3]) / 255.0 * (1.0 - top_a);
            let out_a = top_a + base_a;
            let mix = |c: usize| {
                ((f32::from(above[c]) * top_a + f32::from(below[c]) * base_a) / out_a).round() as u8
            };
            Rgba([mix(0), mix(1), mix(2), (out_a * 255.0).round() as u8])
        }
    }
}

/// Make every pixel with the RGB of pixel `(1, 1)` fully transparent.
///
/// Cleared pixels keep their RGB, so running this twice changes nothing.
/// Returns the number of pixels cleared.
pub fn remove_background(image: &mut RgbaImage) -> Result<usize, CompositeError> {
    let (width, height) = image.dimensions();
    if width < 2 || height < 2 {
        return Err(CompositeError::NoBackgroundSample(width, height));
    }
    let Rgba([r, g, b, _]) = *image.get_pixel(1, 1);
    let mut cleared = 0;
    for pixel in image.pixels_mut() {
        if pixel[0] == r && pixel[1] == g && pixel[2] == b {
            *pixel = Rgba([r, g, b, 0]);
            cleared += 1;
        }
    }
    Ok(cleared)
}

/// Mirror Z slices top to bottom.
pub fn flip_for_axis(image: &mut RgbaImage, axis: Axis) {
    if axis.flips_on_save() {
        imageops::flip_vertical_in_place(image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_table::Color;
    use crate::colormap::ColormapBuilder;
    use crate::profile::{SegmentationKind, SegmentationProfile};
    use ndarray::array;

    fn checkerboard() -> RgbaImage {
        RgbaImage::from_fn(4, 3, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([10, 20, 30, 255])
            } else {
                Rgba([x as u8 * 40, y as u8 * 60, 5, 200])
            }
        })
    }

    #[test]
    fn background_removal_is_idempotent() {
        let mut once = checkerboard();
        let cleared = remove_background(&mut once).unwrap();
        assert_eq!(cleared, 6);
        assert_eq!(once.get_pixel(0, 0), &Rgba([10, 20, 30, 0]));
        assert_eq!(once.get_pixel(1, 0), &Rgba([40, 0, 5, 200]));

        let mut twice = once.clone();
        remove_background(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn background_removal_needs_two_by_two() {
        let mut image = RgbaImage::new(1, 5);
        assert!(matches!(
            remove_background(&mut image),
            Err(CompositeError::NoBackgroundSample(1, 5))
        ));
    }

    #[test]
    fn flip_only_z_and_round_trips() {
        let original = checkerboard();
        let mut image = original.clone();
        flip_for_axis(&mut image, Axis::X);
        flip_for_axis(&mut image, Axis::Y);
        assert_eq!(image, original);

        flip_for_axis(&mut image, Axis::Z);
        assert_eq!(image.get_pixel(1, 0), original.get_pixel(1, 2));
        flip_for_axis(&mut image, Axis::Z);
        assert_eq!(image, original);
    }

    #[test]
    fn over_replaces_opaque_and_skips_transparent() {
        let mut base = RgbaImage::from_pixel(2, 1, Rgba([100, 100, 100, 255]));
        let mut top = RgbaImage::new(2, 1);
        top.put_pixel(0, 0, Color::HIGHLIGHT.to_pixel());
        alpha_over(&mut base, &top).unwrap();
        assert_eq!(base.get_pixel(0, 0), &Color::HIGHLIGHT.to_pixel());
        assert_eq!(base.get_pixel(1, 0), &Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn over_blends_partial_alpha() {
        let blended = over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 51]));
        assert_eq!(blended, Rgba([51, 51, 51, 255]));
    }

    #[test]
    fn over_rejects_mismatched_layers() {
        let mut base = RgbaImage::new(2, 2);
        let top = RgbaImage::new(3, 2);
        assert!(matches!(
            alpha_over(&mut base, &top),
            Err(CompositeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn threshold_pores_without_range_fall_back() {
        let builder =
            ColormapBuilder::new(SegmentationProfile::new(SegmentationKind::ThresholdPores), None)
                .unwrap();
        let slice = array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
        let coloring = builder.build(&slice.view());
        let composed = compose(&slice.view(), &coloring, Axis::X).unwrap();
        assert_eq!(composed.degradations, vec![Degradation::HighlightFallback]);
        // plain ramp over 0..=1: the sampled value 1 is white and becomes transparent
        assert_eq!(composed.image.get_pixel(0, 0), &Rgba([255, 255, 255, 0]));
        assert_eq!(composed.image.get_pixel(2, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn intensity_strips_background_but_labels_do_not() {
        let slice = array![[2.0, 2.0], [2.0, 2.0], [1.0, 0.0]];
        let intensity =
            ColormapBuilder::new(SegmentationProfile::new(SegmentationKind::Intensity), None)
                .unwrap();
        let composed = compose(&slice.view(), &intensity.build(&slice.view()), Axis::Y).unwrap();
        assert!(composed.degradations.is_empty());
        assert_eq!(composed.image.get_pixel(0, 0), &Rgba([255, 255, 255, 0]));
        assert_eq!(composed.image.get_pixel(0, 2), &Rgba([0, 0, 0, 255]));
    }
}
