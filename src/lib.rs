//! # Volume raster library
//!
//! This crate turns 3D (and 4D) scientific volumes into stacks of colored
//! 2D slice images. Volumes are read either from a directory of DICOM files
//! or from a NIfTI file, sliced along the X, Y or Z axis, and every slice is
//! colored according to the segmentation type of the data set:
//!  - raw tomography as a grayscale ramp
//!  - segmented phases and minerals through a user color table
//!  - labeled pores through a color table cycled over the label ids
//!  - segmented pores as grayscale with a highlight layer for small values
//!
//! Slices are colored in parallel using rayon. A slice whose coloring fails
//! is skipped; a slice whose highlight layer fails falls back to a plain
//! grayscale image. All outcomes are collected in a [`ConversionReport`].
//!
//! # Examples
//!
//! ## Converting a labeled NIfTI volume
//!
//! Convert every Z slice of `pores.nii.gz` into `out/pores-slice000.png`,
//! `out/pores-slice001.png`, … using the colors of `colors.txt`.
//!
//! ```no_run
//! # use volume_raster::{ConversionJob, OutputLayout, VolumeSource, SortBy};
//! # use std::path::PathBuf;
//! let source = VolumeSource::from_path("pores.nii.gz", SortBy::None)
//!     .expect("should have recognized the input");
//! let mut job = ConversionJob::new(source, OutputLayout::new("out", "pores", None));
//! job.segmentation_type = "labeled pore".to_string();
//! job.color_table = Some(PathBuf::from("colors.txt"));
//! let report = job.run().expect("should have converted the volume");
//! println!("{} slices written", report.written());
//! ```
//!
//! ## Coloring a single slice
//!
//! ```
//! # use volume_raster::{ColormapBuilder, SegmentationKind, SegmentationProfile, compose};
//! # use volume_raster::enums::Axis;
//! # use ndarray::array;
//! let slice = array![[0.0, 1.0], [2.0, 3.0]];
//! let builder = ColormapBuilder::new(SegmentationProfile::new(SegmentationKind::Intensity), None)
//!     .expect("intensity needs no color table");
//! let coloring = builder.build(&slice.view());
//! let composed = compose(&slice.view(), &coloring, Axis::Z).expect("should have rendered");
//! assert_eq!(composed.image.dimensions(), (2, 2));
//! ```

pub mod color_table;
pub mod colormap;
pub mod compositor;
pub mod driver;
pub mod enums;
pub mod error;
pub mod job;
pub mod profile;
pub mod rasterizer;
pub mod volume;
pub mod volume_loader;

pub use color_table::{Color, ColorTable};
pub use colormap::{ColormapBuilder, SliceColorRule, SliceColoring};
pub use compositor::{ComposedSlice, Degradation, compose};
pub use driver::{
    AxisPlan, AxisReport, ImageFileWriter, OutputLayout, RasterWriter, VolumeSliceDriver,
};
pub use enums::{Axis, IndexSelection, SortBy};
pub use error::{ConfigError, ConvertError, RenderError};
pub use job::{ConversionJob, ConversionReport};
pub use profile::{SegmentationKind, SegmentationProfile};
pub use volume::{Scan, Volume};
pub use volume_loader::{VolumeLoader, VolumeMetadata, VolumeSource};
