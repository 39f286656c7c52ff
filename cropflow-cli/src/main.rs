mod args;
mod detector;
mod input;
mod report;

use std::{fs, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use cropflow_core::{
    BatchJobConfig, BatchProcessor, DetectOptions, DetectionDispatcher, FsDecoder,
    ImageRecordStore, Progress, RetryPolicy, StreamingLoader, preset_by_name, policy_from_name,
    spawn_worker,
};
use cropflow_utils::{
    SettingsSnapshot, config::AppSettings, configure_telemetry, init_logging, normalize_path,
    output::write_payload, quality::Quality,
};

use crate::args::CropArgs;
use crate::detector::SeetaDetector;
use crate::input::{collect_targets, load_name_map};
use crate::report::build_summary;

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = CropArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    settings.crop.sanitize();
    configure_telemetry(
        args.telemetry || settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    if let Some(path) = args.export_settings.as_ref() {
        let snapshot = SettingsSnapshot::capture(&args.snapshot_name, &settings);
        fs::write(path, snapshot.to_json()?)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        info!("wrote settings snapshot '{}' to {}", snapshot.name, path.display());
        return Ok(());
    }

    let input_arg = args
        .input
        .as_ref()
        .context("--input is required unless exporting settings")?;
    let input = normalize_path(input_arg)?;
    let model_path = normalize_path(&args.model)?;

    let name_map = load_name_map(&args)?;
    let targets = collect_targets(&input, name_map.as_ref())?;
    info!("processing {} file(s) from {}", targets.len(), input.display());

    let detector = SeetaDetector::from_path(&model_path)?;
    let retry = RetryPolicy {
        max_retries: settings.detection.max_retries,
        base_delay: Duration::from_millis(settings.detection.base_delay_ms),
    };
    let mut dispatcher = if args.worker {
        DetectionDispatcher::with_worker(spawn_worker(Box::new(detector)), retry)
    } else {
        DetectionDispatcher::in_process(Box::new(detector), retry)
    };
    dispatcher.set_timeout(Duration::from_secs(settings.detection.timeout_secs));

    let decoder = FsDecoder::default();
    let mut store = ImageRecordStore::new(policy_from_name(
        &settings.memory.policy,
        Duration::from_secs(settings.memory.auto_age_secs),
    ));
    let mut loader = StreamingLoader::new(settings.streaming.page_size);

    let outcome = loader.enqueue(targets, &decoder);
    for (name, reason) in &outcome.rejected {
        warn!("rejected {name}: {reason}");
    }
    for record in outcome.immediate {
        store.upsert(record);
    }
    let queued = loader.drain_pending();

    let config = build_job_config(&settings);
    let report = BatchProcessor::new(&mut dispatcher, &decoder).run(
        &mut store,
        queued,
        &config,
        &mut |p: Progress| {
            info!(
                "progress {}/{} ({:.0}%)",
                p.completed,
                p.total,
                p.fraction() * 100.0
            );
        },
    );

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let mut written = 0usize;
    for record in store.iter() {
        for result in &record.results {
            write_payload(&args.output_dir.join(&result.filename), &result.payload)?;
            written += 1;
        }
    }
    for streamed in &report.streamed {
        for result in &streamed.results {
            write_payload(&args.output_dir.join(&result.filename), &result.payload)?;
            written += 1;
        }
    }

    for failure in &report.failures {
        warn!("{} ({}): {}", failure.name, failure.id, failure.error);
    }
    info!(
        "done: {} item(s) succeeded, {} failed, {} face(s) found ({} total this session), {} crop(s) written to {}",
        report.succeeded,
        report.failed,
        report.faces_found,
        dispatcher.faces_detected(),
        written,
        args.output_dir.display()
    );

    if let Some(json_path) = args.json.as_ref() {
        let summary = build_summary(&store, &report);
        if let Some(dir) = json_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let payload = serde_json::to_string_pretty(&summary)
            .context("failed to serialize run summary")?;
        fs::write(json_path, payload)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        info!("wrote run summary to {}", json_path.display());
    }

    if report.succeeded == 0 && report.failed > 0 {
        anyhow::bail!("every item failed; see the log for per-file errors");
    }
    Ok(())
}

fn load_settings(config_path: Option<&std::path::PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        AppSettings::load_from_path(&resolved)
    } else {
        Ok(AppSettings::default())
    }
}

fn apply_cli_overrides(settings: &mut AppSettings, args: &CropArgs) {
    if let Some(preset) = args.preset.as_deref() {
        settings.crop.preset = preset.to_string();
    }
    if let Some(width) = args.output_width {
        settings.crop.output_width = width;
    }
    if let Some(height) = args.output_height {
        settings.crop.output_height = height;
    }
    if let Some(frac) = args.face_height_frac {
        settings.crop.face_height_frac = frac;
    }
    if let Some(mode) = args.positioning_mode.as_deref() {
        settings.crop.positioning_mode = mode.to_string();
    }
    if let Some(offset) = args.horizontal_offset {
        settings.crop.horizontal_offset = offset;
    }
    if let Some(offset) = args.vertical_offset {
        settings.crop.vertical_offset = offset;
    }
    if let Some(format) = args.format.as_deref() {
        settings.crop.output_format = format.to_string();
    }
    if let Some(quality) = args.jpeg_quality {
        settings.crop.jpeg_quality = quality;
    }
    if let Some(template) = args.filename_template.as_deref() {
        settings.crop.filename_template = template.to_string();
    }
    if let Some(retries) = args.max_retries {
        settings.detection.max_retries = retries;
    }
    if let Some(delay) = args.retry_delay_ms {
        settings.detection.base_delay_ms = delay;
    }
    if let Some(timeout) = args.detect_timeout_secs {
        settings.detection.timeout_secs = timeout;
    }
    if let Some(target) = args.reduced_resolution {
        settings.detection.reduced_resolution = Some(target);
    }
    if let Some(min) = args.min_quality.as_deref() {
        match min.parse::<Quality>() {
            Ok(quality) => settings.detection.min_quality = Some(quality),
            Err(err) => warn!("ignoring --min-quality: {err}"),
        }
    }
    if let Some(policy) = args.memory_policy.as_deref() {
        settings.memory.policy = policy.to_string();
    }
    if let Some(page_size) = args.page_size {
        settings.streaming.page_size = page_size.max(1);
    }
    if args.stop_on_error {
        settings.batch.continue_on_error = false;
    }

    // Preset dimensions win over explicit width/height, matching the
    // persisted-settings semantics.
    if let Some(preset) = preset_by_name(&settings.crop.preset)
        && preset.width > 0
        && preset.height > 0
    {
        settings.crop.output_width = preset.width;
        settings.crop.output_height = preset.height;
    }
}

fn build_job_config(settings: &AppSettings) -> BatchJobConfig {
    let positioning_mode = settings
        .crop
        .positioning_mode
        .parse()
        .unwrap_or_else(|err| {
            warn!("{err}; falling back to center positioning");
            cropflow_core::PositioningMode::Center
        });

    BatchJobConfig {
        crop: cropflow_core::CropSettings {
            output_width: settings.crop.output_width,
            output_height: settings.crop.output_height,
            face_height_frac: settings.crop.face_height_frac,
            positioning_mode,
            horizontal_offset: settings.crop.horizontal_offset,
            vertical_offset: settings.crop.vertical_offset,
            eye_line_fraction: cropflow_core::EYE_LINE_FRACTION,
        },
        encode: settings.crop.encode_settings(),
        filename_template: settings.crop.filename_template.clone(),
        detect: DetectOptions {
            reduced_resolution: settings.detection.reduced_resolution,
        },
        min_quality: settings.detection.min_quality,
        continue_on_error: settings.batch.continue_on_error,
    }
}
