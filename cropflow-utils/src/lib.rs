//! Common helpers shared across cropflow crates.

/// Persisted settings and settings snapshots.
pub mod config;
/// Spreadsheet ingestion and output-name lookup.
pub mod mapping;
/// Image encoding and output filename rendering.
pub mod output;
/// Face sharpness analysis (Laplacian variance).
pub mod quality;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{AppSettings, SettingsSnapshot, default_settings_path};
pub use mapping::{
    ColumnSelector, MappingEntry, MappingFormat, MappingReadOptions, NameMap,
    detect_format as detect_mapping_format, load_mapping_entries,
};
pub use output::{
    EncodeSettings, ImageFormatHint, PngCompression, encode_image, render_filename, write_payload,
};
pub use quality::{Quality, estimate_sharpness, laplacian_variance};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    timing_guard, timing_guard_if,
};

/// Initialize logging once for CLI and test environments.
///
/// Respects the `RUST_LOG` environment variable when set; otherwise falls
/// back to the provided default filter level.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module("cropflow::telemetry", LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
