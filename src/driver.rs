//! Walks a volume along one axis and turns every selected slice into a raster file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, ImageFormat, ImageResult, RgbaImage};
use ndarray::ArrayView2;

use crate::colormap::{ColormapBuilder, as_label, distinct_values};
use crate::compositor::{Degradation, compose};
use crate::enums::{Axis, IndexSelection};
use crate::error::{ConfigError, ConvertError, RenderError};
use crate::volume::{Volume, invert_intensities, rot90};

/// Name of the per-directory file holding the number of written images.
pub const SLICE_COUNT_FILE: &str = "total.txt";

/// Persists finished rasters.
pub trait RasterWriter {
    fn write(&mut self, image: &RgbaImage, path: &Path) -> ImageResult<()>;
}

impl<W: RasterWriter + ?Sized> RasterWriter for &mut W {
    fn write(&mut self, image: &RgbaImage, path: &Path) -> ImageResult<()> {
        (**self).write(image, path)
    }
}

/// Writes rasters to disk in the format named by the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileWriter;

impl RasterWriter for ImageFileWriter {
    fn write(&mut self, image: &RgbaImage, path: &Path) -> ImageResult<()> {
        let format = ImageFormat::from_path(path)?;
        match format {
            // no alpha channel in these encoders
            ImageFormat::Jpeg | ImageFormat::Pnm => DynamicImage::ImageRgba8(image.clone())
                .to_rgb8()
                .save_with_format(path, format),
            _ => image.save_with_format(path, format),
        }
    }
}

/// Output directory, file stem and extension of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub directory: PathBuf,
    pub stem: String,
    pub extension: String,
}

impl OutputLayout {
    /// The extension comes from `output_type`, else from the stem, else `png`.
    pub fn new(directory: impl Into<PathBuf>, stem: &str, output_type: Option<&str>) -> Self {
        let stem_path = Path::new(stem);
        let stem_extension = stem_path.extension().and_then(|ext| ext.to_str());
        let (stem, extension) = match (output_type, stem_extension) {
            (Some(kind), _) => (stem.to_string(), kind.trim_start_matches('.').to_string()),
            (None, Some(ext)) => (
                stem_path
                    .file_stem()
                    .and_then(|name| name.to_str())
                    .unwrap_or(stem)
                    .to_string(),
                ext.to_string(),
            ),
            (None, None) => (stem.to_string(), "png".to_string()),
        };
        Self {
            directory: directory.into(),
            stem,
            extension,
        }
    }

    /// Directory the images of one axis end up in.
    pub fn axis_directory(&self, subdirectory: Option<Axis>) -> PathBuf {
        match subdirectory {
            Some(axis) => self.directory.join(axis.as_str()),
            None => self.directory.clone(),
        }
    }

    pub fn slice_path(
        &self,
        subdirectory: Option<Axis>,
        frame: Option<usize>,
        index: usize,
    ) -> PathBuf {
        let (stem, extension) = (&self.stem, &self.extension);
        let name = match frame {
            Some(frame) => format!("{stem}-frame{frame:03}-slice{index:03}.{extension}"),
            None => format!("{}-slice{index:03}.{}", self.stem, self.extension),
        };
        self.axis_directory(subdirectory).join(name)
    }
}

/// One traversal of a volume along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPlan {
    pub axis: Axis,
    pub selection: IndexSelection,
    /// Rotate each slice by 90° before coloring.
    pub rotate: bool,
    /// Write into a sub-directory named after the axis.
    pub subdirectory: bool,
    /// Frame number of a 4D series, used in file names.
    pub frame: Option<usize>,
}

impl AxisPlan {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            selection: IndexSelection::All,
            rotate: false,
            subdirectory: false,
            frame: None,
        }
    }

    pub fn index_range(&self, extent: usize) -> Result<Range<usize>, ConfigError> {
        let index = match self.selection {
            IndexSelection::All => return Ok(0..extent),
            IndexSelection::Middle => extent / 2,
            IndexSelection::Index(index) => index,
        };
        if index >= extent {
            return Err(ConfigError::SliceOutOfRange {
                axis: self.axis,
                index,
                extent,
            });
        }
        Ok(index..index + 1)
    }
}

/// Which slices contain each integer label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelOccupancy {
    slices: BTreeMap<usize, Vec<usize>>,
}

impl LabelOccupancy {
    pub fn record(&mut self, index: usize, slice: &ArrayView2<'_, f64>) {
        for label in distinct_values(slice).into_iter().filter_map(as_label) {
            self.slices.entry(label).or_default().push(index);
        }
    }

    pub fn slices_with(&self, label: usize) -> &[usize] {
        self.slices.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn labels(&self) -> impl Iterator<Item = usize> + '_ {
        self.slices.keys().copied()
    }
}

/// What happened while converting one axis.
#[derive(Debug)]
pub struct AxisReport {
    pub axis: Axis,
    pub frame: Option<usize>,
    pub written: Vec<PathBuf>,
    pub failed: Vec<(usize, RenderError)>,
    pub degraded: Vec<(usize, Vec<Degradation>)>,
    /// Content of the slice count file, if it could be written.
    pub slice_count: Option<usize>,
    /// Only tracked for profiles that color labels.
    pub occupancy: Option<LabelOccupancy>,
    pub interrupted: bool,
}

impl AxisReport {
    fn new(plan: &AxisPlan, track_labels: bool) -> Self {
        Self {
            axis: plan.axis,
            frame: plan.frame,
            written: Vec::new(),
            failed: Vec::new(),
            degraded: Vec::new(),
            slice_count: None,
            occupancy: track_labels.then(LabelOccupancy::default),
            interrupted: false,
        }
    }
}

pub struct VolumeSliceDriver<'a, W> {
    builder: ColormapBuilder<'a>,
    layout: &'a OutputLayout,
    writer: W,
    invert: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, W: RasterWriter> VolumeSliceDriver<'a, W> {
    pub fn new(builder: ColormapBuilder<'a>, layout: &'a OutputLayout, writer: W) -> Self {
        Self {
            builder,
            layout,
            writer,
            invert: false,
            cancel: None,
        }
    }

    /// Mirror slice intensities after rotation.
    pub fn with_inversion(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Stop between slices once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Convert the selected slices of `volume` along `plan.axis`.
    ///
    /// A slice that cannot be rendered is logged and skipped; only configuration,
    /// directory and write errors end the traversal.
    pub fn convert_axis(
        &mut self,
        volume: &Volume,
        plan: &AxisPlan,
    ) -> Result<AxisReport, ConvertError> {
        let range = plan.index_range(volume.extent(plan.axis))?;
        let subdirectory = plan.subdirectory.then_some(plan.axis);
        let directory = self.layout.axis_directory(subdirectory);
        fs::create_dir_all(&directory)?;

        tracing::info!(
            "Converting axis {} slices {:?} of volume {:?} into {}",
            plan.axis,
            range,
            volume.dim(),
            directory.display()
        );
        let mut report = AxisReport::new(plan, self.builder.profile().kind.is_colored());

        for index in range {
            if self.cancelled() {
                tracing::warn!("Conversion interrupted before slice {index} along {}", plan.axis);
                report.interrupted = true;
                break;
            }
            let Some(raw) = volume.get_slice_from_axis(index, plan.axis) else {
                continue;
            };
            let oriented = if plan.rotate { rot90(raw) } else { raw };
            let inverted;
            let slice = if self.invert {
                inverted = invert_intensities(&oriented);
                inverted.view()
            } else {
                oriented
            };

            if let Some(occupancy) = report.occupancy.as_mut() {
                occupancy.record(index, &slice);
            }

            let coloring = self.builder.build(&slice);
            let composed = match compose(&slice, &coloring, plan.axis) {
                Ok(composed) => composed,
                Err(err) => {
                    tracing::error!("Slice {index} along {} not rendered: {err}", plan.axis);
                    report.failed.push((index, err));
                    continue;
                }
            };
            if !composed.degradations.is_empty() {
                report.degraded.push((index, composed.degradations));
            }

            let path = self.layout.slice_path(subdirectory, plan.frame, index);
            tracing::debug!("Writing {}", path.display());
            self.writer
                .write(&composed.image, &path)
                .map_err(|source| ConvertError::Write {
                    path: path.clone(),
                    source,
                })?;
            report.written.push(path);
        }

        report.slice_count = match write_slice_count(&directory) {
            Ok(count) => {
                tracing::info!("{count} files in {}", directory.display());
                Some(count)
            }
            Err(err) => {
                tracing::warn!("Could not write the slice count in {}: {err}", directory.display());
                None
            }
        };
        Ok(report)
    }
}

/// Count the files of `directory` and store the number in `SLICE_COUNT_FILE`.
pub fn write_slice_count(directory: &Path) -> io::Result<usize> {
    let count_path = directory.join(SLICE_COUNT_FILE);
    if count_path.is_file() {
        fs::remove_file(&count_path)?;
    }
    let mut count = 0;
    for entry in fs::read_dir(directory)? {
        if entry?.file_type()?.is_file() {
            count += 1;
        }
    }
    fs::write(&count_path, count.to_string())?;
    Ok(count)
}
