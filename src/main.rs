//! Commandline utility to convert a DICOM or NIfTI volume into colored 2D slices.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use volume_raster::{ConversionJob, IndexSelection, OutputLayout, SortBy, VolumeSource};

#[derive(Parser, Debug)]
#[command(author, about, version)]
struct Args {
    /// input volume: a .nii / .nii.gz file, a DICOM directory or one of its .dcm files
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short = 'd', long, default_value = ".")]
    output_dir: PathBuf,

    /// stem of the slice file names, defaults to the input name;
    /// `%PatientID%inputFile` style stems are filled from the DICOM header
    #[arg(short = 'o', long)]
    output_stem: Option<String>,

    /// image format extension (png, jpg, tif, ...)
    #[arg(short = 't', long)]
    output_type: Option<String>,

    /// slice index, `m` for the middle slice, empty for all
    #[arg(short, long, default_value = "")]
    slice: String,

    /// frame index of a 4D volume, `m` for the middle frame, empty for all
    #[arg(short, long, default_value = "")]
    frame: String,

    /// convert along all three axes into x/, y/ and z/
    #[arg(short, long)]
    reslice: bool,

    #[arg(long, default_value = "raw tomography")]
    segmentation_type: String,

    /// text file of (r, g, b[, a]) tuples in 0..1
    #[arg(short, long)]
    color_table: Option<PathBuf>,

    #[arg(long, default_value_t = 60)]
    highlight_threshold: i64,

    #[arg(long, default_value_t = 0)]
    min_allowed_value: i64,

    #[arg(long, value_enum, default_value_t = SortArg::None)]
    sort_by: SortArg,

    /// invert the intensities of every slice
    #[arg(long)]
    invert: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

impl From<SortArg> for SortBy {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::ImagePositionPatient => SortBy::ImagePositionPatient,
            SortArg::TablePosition => SortBy::TablePosition,
            SortArg::InstanceNumber => SortBy::InstanceNumber,
            SortArg::None => SortBy::None,
        }
    }
}

fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("Error! {message}");
    std::process::exit(-2);
}

fn default_stem(input: &std::path::Path) -> String {
    let name = input
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("volume");
    let name = name.strip_suffix(".gz").unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && !input.is_dir() => stem.to_string(),
        _ => name.to_string(),
    }
}

fn parse_selection(value: &str, what: &str) -> IndexSelection {
    IndexSelection::parse(value)
        .unwrap_or_else(|| exit_with(format!("invalid {what} selection {value:?}")))
}

fn main() {
    let cli = Args::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source =
        VolumeSource::from_path(&cli.input, cli.sort_by.into()).unwrap_or_else(|e| exit_with(e));
    let stem = cli.output_stem.clone().unwrap_or_else(|| default_stem(&cli.input));
    let output = OutputLayout::new(&cli.output_dir, &stem, cli.output_type.as_deref());

    let mut job = ConversionJob::new(source, output);
    job.segmentation_type = cli.segmentation_type;
    job.color_table = cli.color_table;
    job.highlight_threshold = cli.highlight_threshold;
    job.min_allowed_value = cli.min_allowed_value;
    job.slices = parse_selection(&cli.slice, "slice");
    job.frames = parse_selection(&cli.frame, "frame");
    job.reslice = cli.reslice;
    job.invert = cli.invert;

    match job.run() {
        Ok(report) => {
            if report.failed() > 0 {
                tracing::warn!("{} slices could not be rendered", report.failed());
            }
        }
        Err(e) => {
            tracing::error!("Conversion failed: {e}");
            exit_with(e);
        }
    }
}
