//! Batch processing over loaded records and queued file references.
//!
//! Items are processed strictly sequentially: each record's status
//! transition must be observable by progress reporting and the memory policy
//! before the next item begins, which also caps peak memory at one decoded
//! image for the streamed tail. Results are appended in input order. A run
//! may be interrupted between items, never mid-item.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use image::{DynamicImage, imageops::FilterType};
use log::{Level, debug, info, warn};

use crate::decode::ImageDecoder;
use crate::detect::{DetectOptions, DetectionDispatcher};
use crate::error::EncodeError;
use crate::geometry::{CropRect, CropSettings, compute_crop_rect};
use crate::loader::PendingFile;
use crate::records::{
    CropResult, FaceRecord, ImageRecordStore, RecordStatus, SourceRef,
};
use cropflow_utils::output::{EncodeSettings, encode_image, render_filename};
use cropflow_utils::quality::Quality;
use cropflow_utils::telemetry::timing_guard;

/// Configuration for one batch run.
#[derive(Clone)]
pub struct BatchJobConfig {
    pub crop: CropSettings,
    pub encode: EncodeSettings,
    pub filename_template: String,
    pub detect: DetectOptions,
    /// Skip faces below this quality level.
    pub min_quality: Option<Quality>,
    /// Keep processing after an item fails; when false the run halts at the
    /// first unrecovered error and the partial report is returned.
    pub continue_on_error: bool,
}

impl Default for BatchJobConfig {
    fn default() -> Self {
        Self {
            crop: CropSettings::default(),
            encode: EncodeSettings::default(),
            filename_template: "{original}_face_{index}.{ext}".to_string(),
            detect: DetectOptions::default(),
            min_quality: None,
            continue_on_error: true,
        }
    }
}

/// Monotone per-item progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// A terminal failure attributed to one item.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub id: String,
    pub name: String,
    pub error: String,
}

/// Crop results for a streamed file that was never inserted into the store.
#[derive(Debug, Clone)]
pub struct StreamedResult {
    /// Synthetic id assigned to the streamed item.
    pub id: String,
    pub name: String,
    pub results: Vec<CropResult>,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub faces_found: usize,
    pub streamed: Vec<StreamedResult>,
    pub failures: Vec<ItemFailure>,
    pub elapsed: Duration,
    /// True when `continue_on_error` was off and an error halted the run.
    pub halted_early: bool,
    /// True when the run was interrupted between items.
    pub cancelled: bool,
}

/// Sequential batch driver.
pub struct BatchProcessor<'a> {
    dispatcher: &'a mut DetectionDispatcher,
    decoder: &'a dyn ImageDecoder,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(dispatcher: &'a mut DetectionDispatcher, decoder: &'a dyn ImageDecoder) -> Self {
        Self {
            dispatcher,
            decoder,
            cancel: None,
        }
    }

    /// Install a flag checked between items; setting it interrupts the run.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Process every selected loaded record plus the queued references.
    ///
    /// Progress is reported after each item, both kinds counted in one
    /// denominator. Queued files are decoded, processed, and dropped without
    /// ever entering the store; their results are keyed by synthetic ids.
    pub fn run(
        &mut self,
        store: &mut ImageRecordStore,
        queued: Vec<PendingFile>,
        config: &BatchJobConfig,
        progress: &mut dyn FnMut(Progress),
    ) -> BatchReport {
        let started = Instant::now();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let ids: Vec<String> = store
            .iter()
            .filter(|r| r.selected && r.status == RecordStatus::Loaded)
            .map(|r| r.id.clone())
            .collect();

        let total = ids.len() + queued.len();
        let mut completed = 0usize;
        let mut report = BatchReport::default();
        info!(
            "starting batch of {total} item(s) ({} loaded, {} queued)",
            ids.len(),
            queued.len()
        );

        for id in ids {
            if self.interrupted() {
                report.cancelled = true;
                break;
            }
            let halt = !self.process_loaded(store, &id, config, timestamp, &mut report);
            completed += 1;
            progress(Progress { completed, total });
            // Opportunistic sweep so the auto policy observes each
            // completion before the next item decodes.
            store.sweep(Instant::now());
            if halt {
                report.halted_early = true;
                break;
            }
        }

        if !report.halted_early && !report.cancelled {
            for (index, pending) in queued.into_iter().enumerate() {
                if self.interrupted() {
                    report.cancelled = true;
                    break;
                }
                let halt =
                    !self.process_streamed(index, pending, config, timestamp, &mut report);
                completed += 1;
                progress(Progress { completed, total });
                if halt {
                    report.halted_early = true;
                    break;
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "batch finished: {} succeeded, {} failed, {} face(s) in {:.2?}",
            report.succeeded, report.failed, report.faces_found, report.elapsed
        );
        report
    }

    /// Returns false when the run must halt (error with continue_on_error off).
    fn process_loaded(
        &mut self,
        store: &mut ImageRecordStore,
        id: &str,
        config: &BatchJobConfig,
        timestamp: u64,
        report: &mut BatchReport,
    ) -> bool {
        let _timing = timing_guard(format!("process {id}"), Level::Debug);
        let name = match store.get_mut(id) {
            Some(record) => {
                record.status = RecordStatus::Processing;
                record.name.clone()
            }
            None => return true,
        };

        let image = match self.ensure_decoded(store, id) {
            Ok(image) => image,
            Err(reason) => {
                self.fail(store, report, id, &name, reason);
                return config.continue_on_error;
            }
        };

        // Faces from an earlier detection keep their selection state; only
        // fresh records go to the dispatcher.
        let faces: Vec<FaceRecord> = {
            let existing = store.get(id).map(|r| r.faces.clone()).unwrap_or_default();
            if existing.is_empty() {
                match self.dispatcher.detect_faces(&image, &config.detect) {
                    Ok(found) => {
                        report.faces_found += found.len();
                        if let Some(record) = store.get_mut(id) {
                            record.faces = found.clone();
                        }
                        found
                    }
                    Err(err) => {
                        self.fail(store, report, id, &name, err.to_string());
                        return config.continue_on_error;
                    }
                }
            } else {
                existing
            }
        };

        let stem = store
            .get(id)
            .map(|r| r.export_stem())
            .unwrap_or_else(|| name.clone());
        let selected: Vec<&FaceRecord> = faces.iter().filter(|f| f.selected).collect();
        if selected.is_empty() {
            // No face found (or none selected) is a valid empty outcome.
            debug!("{name}: no selected faces; completing with empty results");
            self.complete(store, report, id, Vec::new());
            return true;
        }

        let (results, errors) =
            self.crop_faces(&image, &selected, &stem, config, timestamp);

        if results.is_empty() && !errors.is_empty() {
            let reason = format!(
                "all {} selected face(s) failed to encode: {}",
                errors.len(),
                errors[0]
            );
            self.fail(store, report, id, &name, reason);
            return config.continue_on_error;
        }

        self.complete(store, report, id, results);
        true
    }

    /// Returns false when the run must halt.
    fn process_streamed(
        &mut self,
        index: usize,
        pending: PendingFile,
        config: &BatchJobConfig,
        timestamp: u64,
        report: &mut BatchReport,
    ) -> bool {
        let id = format!("stream-{:04}", index + 1);
        let name = pending.display_name();
        let _timing = timing_guard(format!("process {id}"), Level::Debug);

        let image = match self.decoder.decode(&pending.path) {
            Ok(image) => Arc::new(image),
            Err(err) => {
                report.failed += 1;
                report.failures.push(ItemFailure {
                    id,
                    name,
                    error: err.to_string(),
                });
                return config.continue_on_error;
            }
        };

        let faces = match self.dispatcher.detect_faces(&image, &config.detect) {
            Ok(found) => found,
            Err(err) => {
                report.failed += 1;
                report.failures.push(ItemFailure {
                    id,
                    name,
                    error: err.to_string(),
                });
                return config.continue_on_error;
            }
        };
        report.faces_found += faces.len();

        let stem = pending.output_name.clone().unwrap_or_else(|| {
            pending
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone())
        });
        let selected: Vec<&FaceRecord> = faces.iter().filter(|f| f.selected).collect();
        let (results, errors) =
            self.crop_faces(&image, &selected, &stem, config, timestamp);

        if results.is_empty() && !errors.is_empty() {
            report.failed += 1;
            report.failures.push(ItemFailure {
                id,
                name,
                error: format!("all selected face(s) failed to encode: {}", errors[0]),
            });
            return config.continue_on_error;
        }

        report.succeeded += 1;
        report.streamed.push(StreamedResult { id, name, results });
        // The decoded buffer drops here; only the encoded results survive.
        true
    }

    /// Crop and encode each selected face. An encoding failure skips that
    /// face only; the remaining faces still attempt encoding.
    fn crop_faces(
        &self,
        image: &DynamicImage,
        faces: &[&FaceRecord],
        stem: &str,
        config: &BatchJobConfig,
        timestamp: u64,
    ) -> (Vec<CropResult>, Vec<EncodeError>) {
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for face in faces {
            if let Some(min) = config.min_quality
                && face.quality < min
            {
                info!(
                    "skipping face {} ({:?} below the {:?} threshold)",
                    face.id + 1,
                    face.quality,
                    min
                );
                continue;
            }

            let rect = compute_crop_rect(face.bbox, &config.crop, image.width(), image.height());
            let rendered = render_crop(image, &rect, &config.crop);
            match encode_image(&rendered, &config.encode) {
                Ok(payload) => {
                    let filename = render_filename(
                        &config.filename_template,
                        stem,
                        face.id as usize + 1,
                        config.crop.output_width,
                        config.crop.output_height,
                        timestamp,
                        config.encode.format.extension(),
                    );
                    results.push(CropResult {
                        face_id: face.id,
                        payload,
                        filename,
                        format: config.encode.format,
                        quality: config.encode.quality_for_format(),
                    });
                }
                Err(err) => {
                    warn!("failed to encode face {}: {err:#}", face.id + 1);
                    errors.push(EncodeError {
                        face_id: face.id,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        (results, errors)
    }

    /// Re-decode a record whose pixels were released by the memory policy.
    fn ensure_decoded(
        &self,
        store: &mut ImageRecordStore,
        id: &str,
    ) -> Result<Arc<DynamicImage>, String> {
        let record = store.get_mut(id).ok_or_else(|| "record vanished".to_string())?;
        if let Some(image) = record.image.clone() {
            return Ok(image);
        }

        let decoded = match &record.source {
            SourceRef::Path(path) => self
                .decoder
                .decode(path)
                .map_err(|err| err.to_string())?,
            SourceRef::Bytes(bytes) => image::load_from_memory(bytes)
                .map_err(|err| format!("failed to decode in-memory source: {err}"))?,
        };
        let image = Arc::new(decoded);
        record.image = Some(image.clone());
        record.memory_cleaned = false;
        Ok(image)
    }

    fn complete(
        &self,
        store: &mut ImageRecordStore,
        report: &mut BatchReport,
        id: &str,
        results: Vec<CropResult>,
    ) {
        if let Some(record) = store.get_mut(id) {
            record.results = results;
            record.status = RecordStatus::Completed;
            record.completed_at = Some(Instant::now());
        }
        store.apply_policy_on_complete(id);
        report.succeeded += 1;
    }

    fn fail(
        &self,
        store: &mut ImageRecordStore,
        report: &mut BatchReport,
        id: &str,
        name: &str,
        reason: String,
    ) {
        warn!("{name}: {reason}");
        if let Some(record) = store.get_mut(id) {
            record.status = RecordStatus::Error(reason.clone());
        }
        report.failed += 1;
        report.failures.push(ItemFailure {
            id: id.to_string(),
            name: name.to_string(),
            error: reason,
        });
    }

    fn interrupted(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Rasterize a crop rectangle to the output dimensions. The sample rectangle
/// is clamped into the source, so a crop larger than the image edge-clamps
/// rather than reading out of bounds.
fn render_crop(image: &DynamicImage, rect: &CropRect, crop: &CropSettings) -> DynamicImage {
    let (x, y, w, h) = rect.sample_rect(image.width(), image.height());
    image.crop_imm(x, y, w, h).resize_exact(
        crop.output_width.max(1),
        crop.output_height.max(1),
        FilterType::Lanczos3,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_fraction_is_monotone_over_counts() {
        let total = 7;
        let mut last = 0.0f32;
        for completed in 1..=total {
            let p = Progress { completed, total };
            assert!(p.fraction() > last);
            last = p.fraction();
        }
        assert!((last - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_batch_reports_complete() {
        let p = Progress {
            completed: 0,
            total: 0,
        };
        assert!((p.fraction() - 1.0).abs() < f32::EPSILON);
    }
}
