use std::fs;
use std::path::PathBuf;

use image::Rgba;
use ndarray::Array3;
use volume_raster::driver::SLICE_COUNT_FILE;
use volume_raster::{
    AxisPlan, Color, ColorTable, ColormapBuilder, ConfigError, ConversionJob, ConvertError,
    ImageFileWriter, IndexSelection, OutputLayout, SegmentationKind, SegmentationProfile, SortBy,
    Volume, VolumeSliceDriver, VolumeSource, enums::Axis,
};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("volume-raster-it-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn phase_table() -> ColorTable {
    ColorTable::parse("(0, 0, 0, 0)\n(1, 0, 0, 1)\n(0, 1, 0, 1)\n")
}

#[test]
fn phases_slice_is_colored_and_flipped() {
    let dir = scratch("phases");
    let volume = Volume::new(Array3::from_shape_fn((4, 4, 2), |(x, y, z)| {
        ((x + y + z) % 3) as f64
    }));
    let table = phase_table();
    let profile = SegmentationProfile::new(SegmentationKind::CategoricalPhases);
    let builder = ColormapBuilder::new(profile, Some(&table)).expect("table is present");
    let layout = OutputLayout::new(&dir, "phases", None);
    let mut driver = VolumeSliceDriver::new(builder, &layout, ImageFileWriter);

    let mut plan = AxisPlan::new(Axis::Z);
    plan.selection = IndexSelection::Index(0);
    let report = driver.convert_axis(&volume, &plan).expect("conversion should succeed");
    assert_eq!(report.written, vec![dir.join("phases-slice000.png")]);
    assert!(report.failed.is_empty());
    assert_eq!(report.slice_count, Some(1));

    let image = image::open(dir.join("phases-slice000.png")).expect("png readable").to_rgba8();
    assert_eq!(image.dimensions(), (4, 4));
    let expected = |value: usize| match value {
        0 => Rgba([0, 0, 0, 0]),
        1 => Rgba([255, 0, 0, 255]),
        _ => Rgba([0, 255, 0, 255]),
    };
    for x in 0..4u32 {
        for y in 0..4u32 {
            // slice row x lands on image row 3 - x after the vertical flip
            let value = ((x + y) % 3) as usize;
            assert_eq!(image.get_pixel(y, 3 - x), &expected(value), "sample ({x}, {y})");
        }
    }
    assert_eq!(fs::read_to_string(dir.join(SLICE_COUNT_FILE)).unwrap(), "1");
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn threshold_pores_highlight_small_values() {
    let dir = scratch("pores");
    let samples = [0.0, 1.0, 4.0, 10.0];
    let volume = Volume::new(Array3::from_shape_fn((1, 4, 1), |(_, y, _)| samples[y]));
    let profile = SegmentationProfile::classify("segmented_pore")
        .expect("known tag")
        .with_highlight_threshold(5);
    let builder = ColormapBuilder::new(profile, None).expect("no table needed");
    let layout = OutputLayout::new(&dir, "pores", Some("png"));
    let mut driver = VolumeSliceDriver::new(builder, &layout, ImageFileWriter);

    let report = driver
        .convert_axis(&volume, &AxisPlan::new(Axis::X))
        .expect("conversion should succeed");
    assert_eq!(report.written.len(), 1);
    assert!(report.degraded.is_empty());

    let image = image::open(&report.written[0]).expect("png readable").to_rgba8();
    // X slices are (y, z) = 4 rows by 1 column and are not flipped
    assert_eq!(image.dimensions(), (1, 4));
    assert_eq!(image.get_pixel(0, 0)[3], 0);
    assert_eq!(image.get_pixel(0, 1), &Color::HIGHLIGHT.to_pixel());
    assert_eq!(image.get_pixel(0, 2), &Color::HIGHLIGHT.to_pixel());
    assert_eq!(image.get_pixel(0, 3), &Rgba([255, 255, 255, 255]));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn resliced_labels_land_in_axis_directories() {
    let dir = scratch("reslice");
    let volume = Volume::new(Array3::from_shape_fn((2, 3, 4), |(x, y, z)| {
        ((x * y + z) % 4) as f64
    }));
    let table = ColorTable::parse("(0,0,0,0) (1,0,0) (0,1,0) (0,0,1)");
    let profile = SegmentationProfile::new(SegmentationKind::LabeledPores);
    let builder = ColormapBuilder::new(profile, Some(&table)).expect("palette is present");
    let layout = OutputLayout::new(&dir, "labels", Some("tif"));
    let mut driver = VolumeSliceDriver::new(builder, &layout, ImageFileWriter);

    for axis in Axis::ALL {
        let mut plan = AxisPlan::new(axis);
        plan.subdirectory = true;
        let report = driver.convert_axis(&volume, &plan).expect("conversion should succeed");
        assert_eq!(report.written.len(), volume.extent(axis));
        assert_eq!(report.slice_count, Some(volume.extent(axis)));
        let occupancy = report.occupancy.expect("labels are tracked");
        assert!(occupancy.labels().any(|label| label == 3));
        assert!(dir.join(axis.as_str()).join("labels-slice000.tif").is_file());
    }
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn jpeg_output_drops_alpha() {
    let dir = scratch("jpeg");
    let volume = Volume::new(Array3::from_shape_fn((8, 8, 1), |(x, y, _)| (x * 8 + y) as f64));
    let profile = SegmentationProfile::new(SegmentationKind::Intensity);
    let builder = ColormapBuilder::new(profile, None).expect("no table needed");
    let layout = OutputLayout::new(&dir, "scan.jpg", None);
    let mut driver = VolumeSliceDriver::new(builder, &layout, ImageFileWriter);

    let report = driver
        .convert_axis(&volume, &AxisPlan::new(Axis::Z))
        .expect("conversion should succeed");
    assert_eq!(report.written, vec![dir.join("scan-slice000.jpg")]);
    let image = image::open(&report.written[0]).expect("jpeg readable");
    assert!(!image.color().has_alpha());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn job_rejects_unknown_inputs_and_missing_files() {
    assert!(matches!(
        VolumeSource::from_path("scan.raw", SortBy::None),
        Err(ConfigError::UnsupportedInput(_))
    ));

    let dir = scratch("job");
    let source = VolumeSource::from_path(dir.join("absent.nii.gz"), SortBy::None)
        .expect("nifti by extension");
    let job = ConversionJob::new(source, OutputLayout::new(&dir, "absent", None));
    assert!(matches!(job.run(), Err(ConvertError::Load(_))));
    assert!(!dir.exists());
}
