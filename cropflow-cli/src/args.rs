//! Command-line argument definitions for cropflow-cli.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Detect faces in images and export cropped, re-framed outputs.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct CropArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long, required_unless_present = "export_settings")]
    pub input: Option<PathBuf>,

    /// Path to the SeetaFace detection model (.bin).
    #[arg(short, long, default_value = "models/seeta_fd_frontal_v1.0.bin")]
    pub model: PathBuf,

    /// Optional settings JSON. Defaults to built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for exported crops.
    #[arg(long, default_value = "crops")]
    pub output_dir: PathBuf,

    /// Spreadsheet (CSV/Excel) mapping source filenames to output names.
    #[arg(long)]
    pub mapping_file: Option<PathBuf>,

    /// Source-filename column of the mapping file (`#idx` or header name).
    #[arg(long)]
    pub mapping_source_col: Option<String>,

    /// Output-name column of the mapping file (`#idx` or header name).
    #[arg(long)]
    pub mapping_output_col: Option<String>,

    /// Worksheet name for Excel mapping files (defaults to the first sheet).
    #[arg(long)]
    pub mapping_sheet: Option<String>,

    /// Delimiter for CSV mapping files (defaults to comma).
    #[arg(long)]
    pub mapping_delimiter: Option<char>,

    /// Preset name for output size (e.g., LinkedIn, Passport, Instagram).
    /// Overrides --output-width/--output-height.
    #[arg(long)]
    pub preset: Option<String>,

    /// Output width for crops (pixels).
    #[arg(long)]
    pub output_width: Option<u32>,

    /// Output height for crops (pixels).
    #[arg(long)]
    pub output_height: Option<u32>,

    /// Fraction of the output height the face should occupy (0-1].
    #[arg(long)]
    pub face_height_frac: Option<f32>,

    /// Positioning mode: center, rule-of-thirds, custom.
    #[arg(long)]
    pub positioning_mode: Option<String>,

    /// Horizontal offset fraction (-1.0..1.0).
    #[arg(long)]
    pub horizontal_offset: Option<f32>,

    /// Vertical offset fraction (-1.0..1.0), custom positioning only.
    #[arg(long)]
    pub vertical_offset: Option<f32>,

    /// Output image format: png, jpeg, webp.
    #[arg(long)]
    pub format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Filename template; placeholders: {original} {index} {width} {height}
    /// {timestamp} {ext}.
    #[arg(long)]
    pub filename_template: Option<String>,

    /// Additional detection attempts after a failure (0 = no retry).
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Base retry delay in milliseconds (backoff is linear in the attempt number).
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Per-attempt detection timeout in seconds.
    #[arg(long)]
    pub detect_timeout_secs: Option<u64>,

    /// Downscale to at most this many pixels on the longest side before
    /// detection; boxes are rescaled back afterwards.
    #[arg(long)]
    pub reduced_resolution: Option<u32>,

    /// Skip faces below this quality level: low, medium, high.
    #[arg(long)]
    pub min_quality: Option<String>,

    /// Memory-cleanup policy: manual, auto, aggressive.
    #[arg(long)]
    pub memory_policy: Option<String>,

    /// Files decoded per streaming page.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Halt the batch at the first failing item instead of continuing.
    #[arg(long, action = ArgAction::SetTrue)]
    pub stop_on_error: bool,

    /// Run detection on the background worker thread instead of in-process.
    #[arg(long, action = ArgAction::SetTrue)]
    pub worker: bool,

    /// Write the batch report as JSON to this path.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Write a named settings snapshot to this path and exit.
    #[arg(long)]
    pub export_settings: Option<PathBuf>,

    /// Name recorded in the exported settings snapshot.
    #[arg(long, default_value = "cli")]
    pub snapshot_name: String,

    /// Enable telemetry timing logs.
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,
}
