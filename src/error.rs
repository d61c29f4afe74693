use std::path::PathBuf;

use thiserror::Error;

use crate::enums::Axis;
use crate::volume_loader::VolumeLoaderError;

/// Problems with the run configuration. Fatal before any slice is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read color table {path}: {source}")]
    ColorTableRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("color table {0} contains no RGB or RGBA tuples")]
    EmptyColorTable(PathBuf),

    #[error("unrecognized segmentation type `{0}`")]
    UnknownSegmentationType(String),

    #[error("segmentation type `{0}` needs a color table")]
    MissingColorTable(&'static str),

    #[error("labeled pore coloring needs at least one color after the transparent entry")]
    EmptyPalette,

    #[error("slice index {index} is outside axis {axis} with extent {extent}")]
    SliceOutOfRange {
        axis: Axis,
        index: usize,
        extent: usize,
    },

    #[error("frame index {index} is outside the {frames} available frames")]
    FrameOutOfRange { index: usize, frames: usize },

    #[error("unsupported input {0}: expected a DICOM file or directory, or a NIfTI file")]
    UnsupportedInput(PathBuf),
}

/// A sample could not be turned into a pixel. Signals a colormap defect, not bad input.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no color rule entry for sample value {value}")]
    MissingRuleEntry { value: f64 },

    #[error("slice of {rows}x{cols} samples does not fit in a raster")]
    Oversized { rows: usize, cols: usize },
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] VolumeLoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
