use crate::{
    enums::{Axis, SortBy},
    error::ConfigError,
    volume::{Scan, Volume},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, ArrayD, Axis as ArrayAxis, Ix2, Ix3, Ix4, IxDyn, s};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Unsupported NIfTI dimensionality: {0}")]
    UnsupportedDimensionality(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Header fields worth reporting, depending on the source format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomMetadata {
    pub patient_name: Option<String>,
    pub patient_age: Option<String>,
    pub patient_sex: Option<String>,
    pub patient_id: Option<String>,
    pub series_description: Option<String>,
    pub protocol_name: Option<String>,
    pub slices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VolumeMetadata {
    Dicom(DicomMetadata),
    Nifti { dim: [u16; 8], pixdim: [f32; 8] },
}

impl DicomMetadata {
    fn fields(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("PatientName", self.patient_name.as_deref()),
            ("PatientAge", self.patient_age.as_deref()),
            ("PatientSex", self.patient_sex.as_deref()),
            ("PatientID", self.patient_id.as_deref()),
            ("SeriesDescription", self.series_description.as_deref()),
            ("ProtocolName", self.protocol_name.as_deref()),
        ]
    }

    /// Header value by DICOM keyword, e.g. `PatientID`.
    pub fn field(&self, keyword: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(name, _)| *name == keyword)
            .and_then(|(_, value)| value)
    }
}

impl VolumeMetadata {
    /// Expand a `%Keyword%Keyword...` stem into header values joined by `-`.
    ///
    /// `%inputFile` stands for `input_stem`. Header values keep only word characters,
    /// with whitespace runs turned into `_`. Stems without a leading `%` are returned as is.
    pub fn expand_stem(&self, template: &str, input_stem: &str) -> String {
        let Some(keys) = template.strip_prefix('%') else {
            return template.to_string();
        };
        let components: Vec<String> = keys
            .split('%')
            .map(|key| {
                if key == "inputFile" {
                    return input_stem.to_string();
                }
                let value = match self {
                    VolumeMetadata::Dicom(meta) => meta.field(key),
                    VolumeMetadata::Nifti { .. } => None,
                };
                match value {
                    Some(value) => sanitize_component(value),
                    None => {
                        tracing::warn!("No header value for stem key {key}, using the key itself");
                        key.to_string()
                    }
                }
            })
            .collect();
        components.join("-")
    }

    /// Log the header fields; missing DICOM fields are warned about.
    pub fn log(&self) {
        match self {
            VolumeMetadata::Dicom(meta) => {
                tracing::info!("DICOM series with {} slices", meta.slices);
                for (name, value) in meta.fields() {
                    match value {
                        Some(value) => tracing::info!("{name}: {value}"),
                        None => tracing::warn!("{name} not found in DICOM header"),
                    }
                }
            }
            VolumeMetadata::Nifti { dim, pixdim } => {
                let rank = usize::from(dim[0]).min(7);
                tracing::info!(
                    "NIfTI volume dims {:?}, voxel size {:?}",
                    &dim[1..=rank],
                    &pixdim[1..=rank]
                );
            }
        }
    }
}

fn sanitize_component(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_' || ch.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Where a conversion reads its samples from.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeSource {
    /// Every `.dcm` file of a directory, one file per Z slice.
    Dicom { directory: PathBuf, sort_by: SortBy },
    /// A 3D or 4D `.nii` / `.nii.gz` file.
    Nifti { path: PathBuf },
}

impl VolumeSource {
    /// Pick the source from an input path. A `.dcm` file stands for its whole directory.
    pub fn from_path(path: impl AsRef<Path>, sort_by: SortBy) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_dir() {
            return Ok(VolumeSource::Dicom {
                directory: path.to_path_buf(),
                sort_by,
            });
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(VolumeSource::Nifti {
                path: path.to_path_buf(),
            })
        } else if name.ends_with(".dcm") {
            let directory = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            Ok(VolumeSource::Dicom { directory, sort_by })
        } else {
            Err(ConfigError::UnsupportedInput(path.to_path_buf()))
        }
    }

    pub fn load(&self) -> Result<(Scan, VolumeMetadata), VolumeLoaderError> {
        match self {
            VolumeSource::Dicom { directory, sort_by } => {
                let (volume, meta) = VolumeLoader::load_from_directory(directory, *sort_by)?;
                Ok((Scan::Volume(volume), VolumeMetadata::Dicom(meta)))
            }
            VolumeSource::Nifti { path } => VolumeLoader::load_nifti(path),
        }
    }

    /// Input name without directory and extension, used by `%inputFile` stems.
    pub fn input_stem(&self) -> String {
        let path = match self {
            VolumeSource::Dicom { directory, .. } => directory.as_path(),
            VolumeSource::Nifti { path } => path.as_path(),
        };
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("volume");
        let name = name.strip_suffix(".gz").unwrap_or(name);
        name.strip_suffix(".nii").unwrap_or(name).to_string()
    }

    /// Whether slices along `axis` are rotated by 90° before coloring.
    pub fn rotates(&self, axis: Axis) -> bool {
        match self {
            VolumeSource::Nifti { .. } => true,
            VolumeSource::Dicom { .. } => axis != Axis::Z,
        }
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<(Volume, DicomMetadata), VolumeLoaderError> {
        let mut images_with_order: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_image_with_order(dicom_object, &sort_by))
            .collect();

        if images_with_order.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_images(&mut images_with_order, sort_by);

        let images: Vec<_> = images_with_order
            .into_iter()
            .map(|(_, image)| image)
            .collect();

        Self::validate_dimensions(&images)?;

        let volume_array = Self::build_volume_array(&images);
        let mut metadata = Self::get_metadata(&dicom_objects[0]);
        metadata.slices = images.len();

        Ok((Volume::new(volume_array), metadata))
    }

    /// Load a volume from file paths, reading the files in parallel
    pub fn load_from_file_paths<P: AsRef<Path> + Sync>(
        paths: &[P],
        sort_by: SortBy,
    ) -> Result<(Volume, DicomMetadata), VolumeLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files, in file name order
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<(Volume, DicomMetadata), VolumeLoaderError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        paths.sort();

        tracing::debug!("Reading {} DICOM files from {}", paths.len(), path.as_ref().display());
        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Load a NIfTI file. 2D images become a single-slice volume, 4D images a series.
    pub fn load_nifti(path: impl AsRef<Path>) -> Result<(Scan, VolumeMetadata), VolumeLoaderError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header();
        let metadata = VolumeMetadata::Nifti {
            dim: header.dim,
            pixdim: header.pixdim,
        };
        let samples = obj.into_volume().into_ndarray::<f64>()?;
        // re-home the samples in this crate's ndarray, in logical (x, y, z, t) order
        let shape = samples.shape().to_vec();
        let values: Vec<f64> = samples.iter().copied().collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;

        let scan = match data.ndim() {
            2 => {
                let image = data.into_dimensionality::<Ix2>()?;
                Scan::Volume(Volume::new(image.insert_axis(ArrayAxis(2))))
            }
            3 => Scan::Volume(Volume::new(data.into_dimensionality::<Ix3>()?)),
            4 => Scan::Series(data.into_dimensionality::<Ix4>()?),
            other => return Err(VolumeLoaderError::UnsupportedDimensionality(other)),
        };
        Ok((scan, metadata))
    }

    fn extract_image_with_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<(Option<f32>, Array2<f64>)> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image_2d = Self::decode_image(dicom_object)?;
        Some((order, image_2d))
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// Stored values with the modality rescale applied; no VOI windowing so labels survive.
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f64>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]).mapv(f64::from))
    }

    fn sort_images(images_with_order: &mut [(Option<f32>, Array2<f64>)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            images_with_order.reverse();
        }
    }

    fn validate_dimensions(images: &[Array2<f64>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    /// Stack the images as Z slices of a `(rows, cols, slices)` volume.
    fn build_volume_array(images: &[Array2<f64>]) -> Array3<f64> {
        let (rows, cols) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<f64>::zeros((rows, cols, depth));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![.., .., i]).assign(image);
        }

        volume
    }

    fn get_metadata(dicom_object: &FileDicomObject<InMemDicomObject>) -> DicomMetadata {
        let text = |tag| {
            dicom_object
                .element(tag)
                .ok()?
                .to_str()
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        DicomMetadata {
            patient_name: text(tags::PATIENT_NAME),
            patient_age: text(tags::PATIENT_AGE),
            patient_sex: text(tags::PATIENT_SEX),
            patient_id: text(tags::PATIENT_ID),
            series_description: text(tags::SERIES_DESCRIPTION),
            protocol_name: text(tags::PROTOCOL_NAME),
            slices: 0,
        }
    }
}
