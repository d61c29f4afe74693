use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::color_table::ColorTable;
use crate::colormap::ColormapBuilder;
use crate::driver::{
    AxisPlan, AxisReport, ImageFileWriter, OutputLayout, RasterWriter, VolumeSliceDriver,
};
use crate::enums::{Axis, IndexSelection};
use crate::error::{ConfigError, ConvertError};
use crate::profile::{SegmentationKind, SegmentationProfile};
use crate::volume::Scan;
use crate::volume_loader::{VolumeMetadata, VolumeSource};

/// Configuration of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    pub source: VolumeSource,
    pub output: OutputLayout,
    pub segmentation_type: String,
    /// Required by the colored segmentation types, ignored by the others.
    pub color_table: Option<PathBuf>,
    pub highlight_threshold: i64,
    pub min_allowed_value: i64,
    pub slices: IndexSelection,
    /// Frame selection for 4D inputs.
    pub frames: IndexSelection,
    /// Convert along X, Y and Z into per-axis sub-directories instead of Z only.
    pub reslice: bool,
    pub invert: bool,
}

/// Outcome of a conversion run, one entry per axis and frame traversed.
#[derive(Debug)]
pub struct ConversionReport {
    pub metadata: VolumeMetadata,
    pub axes: Vec<AxisReport>,
}

impl ConversionReport {
    pub fn written(&self) -> usize {
        self.axes.iter().map(|axis| axis.written.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.axes.iter().map(|axis| axis.failed.len()).sum()
    }

    pub fn degraded(&self) -> usize {
        self.axes.iter().map(|axis| axis.degraded.len()).sum()
    }

    pub fn interrupted(&self) -> bool {
        self.axes.iter().any(|axis| axis.interrupted)
    }
}

impl ConversionJob {
    pub fn new(source: VolumeSource, output: OutputLayout) -> Self {
        Self {
            source,
            output,
            segmentation_type: SegmentationKind::Intensity.tag().to_string(),
            color_table: None,
            highlight_threshold: SegmentationProfile::DEFAULT_HIGHLIGHT_THRESHOLD,
            min_allowed_value: 0,
            slices: IndexSelection::All,
            frames: IndexSelection::All,
            reslice: false,
            invert: false,
        }
    }

    pub fn profile(&self) -> Result<SegmentationProfile, ConfigError> {
        Ok(SegmentationProfile::classify(&self.segmentation_type)?
            .with_highlight_threshold(self.highlight_threshold)
            .with_min_allowed_value(self.min_allowed_value))
    }

    fn load_color_table(
        &self,
        profile: &SegmentationProfile,
    ) -> Result<Option<ColorTable>, ConfigError> {
        if !profile.kind.is_colored() {
            if self.color_table.is_some() {
                tracing::debug!("Segmentation type {} ignores the color table", profile.kind.tag());
            }
            return Ok(None);
        }
        let path = self
            .color_table
            .as_ref()
            .ok_or(ConfigError::MissingColorTable(profile.kind.tag()))?;
        let table = ColorTable::load(path)?;
        if !table.has_transparent_background() {
            tracing::info!("Color table entry 0 is not transparent, label 0 will be painted");
        }
        Ok(Some(table))
    }

    /// Axes to traverse for one frame.
    pub fn plans(&self, frame: Option<usize>) -> Vec<AxisPlan> {
        let axes: &[Axis] = if self.reslice { &Axis::ALL } else { &[Axis::Z] };
        axes.iter()
            .map(|&axis| AxisPlan {
                axis,
                selection: self.slices,
                rotate: self.source.rotates(axis),
                subdirectory: self.reslice,
                frame,
            })
            .collect()
    }

    fn frame_range(&self, scan: &Scan) -> Result<std::ops::Range<usize>, ConfigError> {
        let frames = scan.frame_count();
        if !scan.is_series() {
            return Ok(0..frames);
        }
        let index = match self.frames {
            IndexSelection::All => return Ok(0..frames),
            IndexSelection::Middle => frames / 2,
            IndexSelection::Index(index) => index,
        };
        if index >= frames {
            return Err(ConfigError::FrameOutOfRange { index, frames });
        }
        Ok(index..index + 1)
    }

    /// Run the conversion, writing image files to disk.
    pub fn run(&self) -> Result<ConversionReport, ConvertError> {
        self.run_with(ImageFileWriter, None)
    }

    /// Run the conversion with a custom writer and an optional interruption flag.
    ///
    /// Every configuration problem is reported before the first slice is written.
    pub fn run_with<W: RasterWriter>(
        &self,
        writer: W,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<ConversionReport, ConvertError> {
        let profile = self.profile()?;
        let table = self.load_color_table(&profile)?;
        let builder = ColormapBuilder::new(profile, table.as_ref())?;
        tracing::info!("Segmentation type: {}", profile.kind.tag());

        let (scan, metadata) = self.source.load()?;
        metadata.log();
        let frames = self.frame_range(&scan)?;
        if scan.is_series() {
            tracing::info!("4D volume with {} frames, converting {:?}", scan.frame_count(), frames);
        }

        // fail on a bad slice index before anything is written
        if let Some(first) = scan.frame(frames.start) {
            for plan in self.plans(None) {
                plan.index_range(first.extent(plan.axis))?;
            }
        }

        let layout = OutputLayout {
            stem: metadata.expand_stem(&self.output.stem, &self.source.input_stem()),
            ..self.output.clone()
        };
        if layout.stem != self.output.stem {
            tracing::info!("Output file stem: {}", layout.stem);
        }
        let mut driver =
            VolumeSliceDriver::new(builder, &layout, writer).with_inversion(self.invert);
        if let Some(flag) = cancel {
            driver = driver.with_cancel_flag(flag);
        }

        let mut axes = Vec::new();
        'frames: for frame in frames {
            let Some(volume) = scan.frame(frame) else {
                continue;
            };
            for plan in self.plans(scan.is_series().then_some(frame)) {
                let report = driver.convert_axis(&volume, &plan)?;
                let interrupted = report.interrupted;
                axes.push(report);
                if interrupted {
                    break 'frames;
                }
            }
        }

        let report = ConversionReport { metadata, axes };
        tracing::info!(
            "Wrote {} images ({} degraded, {} failed)",
            report.written(),
            report.degraded(),
            report.failed()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SortBy;

    fn job() -> ConversionJob {
        ConversionJob::new(
            VolumeSource::Nifti {
                path: PathBuf::from("missing.nii"),
            },
            OutputLayout::new("out", "scan", None),
        )
    }

    #[test]
    fn plans_follow_reslicing() {
        let mut job = job();
        let plans = job.plans(None);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].axis, Axis::Z);
        assert!(plans[0].rotate && !plans[0].subdirectory);

        job.reslice = true;
        job.source = VolumeSource::Dicom {
            directory: PathBuf::from("."),
            sort_by: SortBy::None,
        };
        let plans = job.plans(Some(3));
        let axes: Vec<_> = plans.iter().map(|plan| (plan.axis, plan.rotate)).collect();
        assert_eq!(axes, vec![(Axis::X, true), (Axis::Y, true), (Axis::Z, false)]);
        assert!(plans.iter().all(|plan| plan.subdirectory && plan.frame == Some(3)));
    }

    #[test]
    fn unknown_tag_fails_before_loading() {
        let mut job = job();
        job.segmentation_type = "mystery".to_string();
        let err = job.run().unwrap_err();
        assert!(matches!(err, ConvertError::Config(ConfigError::UnknownSegmentationType(_))));
    }

    #[test]
    fn colored_type_needs_color_table() {
        let mut job = job();
        job.segmentation_type = "segmented_minerals".to_string();
        let err = job.run().unwrap_err();
        assert!(matches!(err, ConvertError::Config(ConfigError::MissingColorTable(_))));
    }

    #[test]
    fn profile_carries_thresholds() {
        let mut job = job();
        job.segmentation_type = "segmented pore".to_string();
        job.highlight_threshold = 5;
        job.min_allowed_value = 1;
        let profile = job.profile().unwrap();
        assert_eq!(profile.kind, SegmentationKind::ThresholdPores);
        assert_eq!((profile.highlight_threshold, profile.min_allowed_value), (5, 1));
    }
}
