//! Persisted settings shared by the pipeline and the CLI front-end.
//!
//! All sections use `#[serde(default)]` so older or partial settings files
//! import cleanly, missing fields falling back to the documented defaults.

use crate::{
    output::{EncodeSettings, ImageFormatHint, PngCompression},
    quality::Quality,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Settings for crop geometry and output encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CropSettings {
    /// Crop preset name (e.g., "linkedin", "passport", "custom").
    pub preset: String,
    /// Output width in pixels.
    pub output_width: u32,
    /// Output height in pixels.
    pub output_height: u32,
    /// Fraction of the output height the face should occupy, in (0, 1].
    pub face_height_frac: f32,
    /// Positioning mode: "center", "rule-of-thirds", or "custom".
    pub positioning_mode: String,
    /// Horizontal offset fraction (-1.0 to 1.0); applies in custom and
    /// rule-of-thirds modes.
    pub horizontal_offset: f32,
    /// Vertical offset fraction (-1.0 to 1.0); custom mode only.
    pub vertical_offset: f32,
    /// Keep the output aspect ratio locked to `locked_ratio`.
    pub aspect_lock: bool,
    /// Width/height ratio applied when `aspect_lock` is set.
    pub locked_ratio: f32,
    /// Output format: "png", "jpeg", or "webp".
    pub output_format: String,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// PNG compression strategy ("fast", "default", "best") or numeric level (0-9).
    pub png_compression: String,
    /// WebP quality (0-100).
    pub webp_quality: u8,
    /// Filename template for crop results.
    pub filename_template: String,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            preset: "custom".to_string(),
            output_width: 256,
            output_height: 256,
            face_height_frac: 0.7,
            positioning_mode: "center".to_string(),
            horizontal_offset: 0.0,
            vertical_offset: 0.0,
            aspect_lock: false,
            locked_ratio: 1.0,
            output_format: "png".to_string(),
            jpeg_quality: 90,
            png_compression: "default".to_string(),
            webp_quality: 90,
            filename_template: "{original}_face_{index}.{ext}".to_string(),
        }
    }
}

impl CropSettings {
    /// Clamp values to sensible ranges.
    pub fn sanitize(&mut self) {
        if !self.face_height_frac.is_finite() || self.face_height_frac <= 0.0 {
            self.face_height_frac = CropSettings::default().face_height_frac;
        }
        self.face_height_frac = self.face_height_frac.min(1.0);
        self.horizontal_offset = self.horizontal_offset.clamp(-1.0, 1.0);
        self.vertical_offset = self.vertical_offset.clamp(-1.0, 1.0);
        if !self.locked_ratio.is_finite() || self.locked_ratio <= 0.0 {
            self.locked_ratio = 1.0;
        }
        self.output_width = self.output_width.max(1);
        if self.aspect_lock {
            self.output_height =
                ((self.output_width as f32 / self.locked_ratio).round() as u32).max(1);
        } else {
            self.output_height = self.output_height.max(1);
        }
    }

    /// Derive encoding settings from the persisted strings.
    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            format: self
                .output_format
                .parse::<ImageFormatHint>()
                .unwrap_or_default(),
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
            png_compression: PngCompression::parse(&self.png_compression),
            webp_quality: self.webp_quality.min(100),
        }
    }
}

/// Detection dispatch parameters: retry budget, backoff, timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Additional attempts after the first failure (0 = no retry).
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; the delay before attempt k+1 is
    /// k times this value.
    pub base_delay_ms: u64,
    /// Per-attempt timeout in seconds for offloaded detection.
    pub timeout_secs: u64,
    /// Downscale images so the longest side is at most this many pixels
    /// before detection; boxes are rescaled back afterwards.
    pub reduced_resolution: Option<u32>,
    /// Skip faces below this quality level during batch export.
    pub min_quality: Option<Quality>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            timeout_secs: 30,
            reduced_resolution: None,
            min_quality: None,
        }
    }
}

/// Memory-cleanup policy selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemorySettings {
    /// One of "manual", "auto", "aggressive".
    pub policy: String,
    /// Age threshold in seconds for the "auto" policy.
    pub auto_age_secs: u64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            policy: "manual".to_string(),
            auto_age_secs: 60,
        }
    }
}

/// Streaming intake parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingSettings {
    /// Number of files decoded per page.
    pub page_size: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

/// Batch execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchSettings {
    /// Keep processing remaining items after an item fails.
    pub continue_on_error: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            continue_on_error: true,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" | "warning" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Debug,
        }
    }
}

/// Persistent application settings consumed by the CLI front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppSettings {
    /// Crop geometry and output encoding.
    pub crop: CropSettings,
    /// Detection retry/backoff/timeout parameters.
    pub detection: DetectionSettings,
    /// Memory-cleanup policy.
    pub memory: MemorySettings,
    /// Streaming intake parameters.
    pub streaming: StreamingSettings,
    /// Batch execution parameters.
    pub batch: BatchSettings,
    /// Telemetry preferences.
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file, sanitizing out-of-range values.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.crop.sanitize();
        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any
    /// existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// A named, timestamped snapshot of the full settings record.
///
/// Snapshots round-trip through JSON; imports tolerate missing fields by
/// falling back to the defaults of each section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsSnapshot {
    /// Human-chosen snapshot name.
    pub name: String,
    /// Unix timestamp (seconds) at capture time.
    pub saved_at: u64,
    /// The captured settings record.
    #[serde(flatten)]
    pub settings: AppSettings,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            saved_at: 0,
            settings: AppSettings::default(),
        }
    }
}

impl SettingsSnapshot {
    /// Capture the current settings under a name, stamped with the current time.
    pub fn capture(name: impl Into<String>, settings: &AppSettings) -> Self {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: name.into(),
            saved_at,
            settings: settings.clone(),
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize settings snapshot")
    }

    /// Parse a snapshot, tolerating missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut snapshot: SettingsSnapshot =
            serde_json::from_str(json).context("failed to parse settings snapshot")?;
        snapshot.settings.crop.sanitize();
        Ok(snapshot)
    }
}

/// Returns the default path for persisted settings (`config/cropflow.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/cropflow.json"))
        .unwrap_or_else(|_| PathBuf::from("config/cropflow.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_settings_round_trip() {
        let file = NamedTempFile::new().expect("tempfile");
        let settings = AppSettings::default();
        settings.save_to_path(file.path()).expect("save");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let file = NamedTempFile::new().expect("tempfile");
        let json = r#"{
            "crop": { "output_width": 512, "output_height": 512 },
            "detection": { "max_retries": 2 }
        }"#;
        fs::write(file.path(), json).expect("write custom settings");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.crop.output_width, 512);
        assert!((loaded.crop.face_height_frac - 0.7).abs() < f32::EPSILON);
        assert_eq!(loaded.detection.max_retries, 2);
        assert_eq!(loaded.detection.timeout_secs, 30);
        assert_eq!(loaded.streaming.page_size, 20);
        assert!(loaded.batch.continue_on_error);
    }

    #[test]
    fn sanitize_clamps_fraction_and_offsets() {
        let mut crop = CropSettings {
            face_height_frac: 7.0,
            horizontal_offset: -3.0,
            vertical_offset: 2.0,
            ..CropSettings::default()
        };
        crop.sanitize();
        assert!((crop.face_height_frac - 1.0).abs() < f32::EPSILON);
        assert!((crop.horizontal_offset + 1.0).abs() < f32::EPSILON);
        assert!((crop.vertical_offset - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn aspect_lock_derives_height() {
        let mut crop = CropSettings {
            aspect_lock: true,
            locked_ratio: 2.0,
            output_width: 600,
            output_height: 999,
            ..CropSettings::default()
        };
        crop.sanitize();
        assert_eq!(crop.output_height, 300);
    }

    #[test]
    fn snapshot_round_trips_and_tolerates_missing_fields() {
        let settings = AppSettings::default();
        let snapshot = SettingsSnapshot::capture("studio defaults", &settings);
        let json = snapshot.to_json().expect("serialize");
        let restored = SettingsSnapshot::from_json(&json).expect("parse");
        assert_eq!(restored.name, "studio defaults");
        assert_eq!(restored.settings, settings);

        let sparse = SettingsSnapshot::from_json(r#"{ "name": "sparse" }"#).expect("parse sparse");
        assert_eq!(sparse.name, "sparse");
        assert_eq!(sparse.saved_at, 0);
        assert_eq!(sparse.settings, AppSettings::default());
    }
}
