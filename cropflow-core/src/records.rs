//! Image records and the authoritative record store.
//!
//! The store owns every [`ImageRecord`] the pipeline knows about, in intake
//! order, and is the single place where selection and memory-cleanup
//! decisions are made. All mutation happens on the control thread: the batch
//! processor drives status transitions, the history manager replaces the
//! whole collection on restore, and explicit user actions toggle selection.

use std::{
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use image::DynamicImage;
use log::debug;

use crate::geometry::FaceBox;
use crate::memory::MemoryPolicy;
use cropflow_utils::output::ImageFormatHint;
use cropflow_utils::quality::Quality;

/// Where a record's pixels came from.
#[derive(Debug, Clone)]
pub enum SourceRef {
    /// A file on disk, re-decodable after cleanup.
    Path(PathBuf),
    /// An in-memory upload. Shared so snapshots never copy the bytes.
    Bytes(Arc<Vec<u8>>),
}

impl SourceRef {
    /// A short, user-facing name for error attribution.
    pub fn display_name(&self) -> String {
        match self {
            SourceRef::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            SourceRef::Bytes(_) => "<memory>".to_string(),
        }
    }
}

/// Lifecycle state of an image record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// Decoded and waiting for processing.
    Loaded,
    /// Known but not yet decoded (streaming tail).
    Queued,
    /// Currently mid-pipeline.
    Processing,
    /// Finished; crop results (possibly empty, when no face was found) are final.
    Completed,
    /// Failed terminally, with an operator-readable reason.
    Error(String),
}

/// A detected face within an image.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    /// Identifier scoped to the owning image.
    pub id: u32,
    /// Bounding box, clamped into the owning image's pixel bounds.
    pub bbox: FaceBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    /// Raw Laplacian-variance sharpness score.
    pub quality_score: f64,
    /// Bucketed sharpness level.
    pub quality: Quality,
    /// Whether this face participates in cropping.
    pub selected: bool,
}

/// An encoded crop produced from one face. Immutable once created.
#[derive(Debug, Clone)]
pub struct CropResult {
    pub face_id: u32,
    pub payload: Vec<u8>,
    pub filename: String,
    pub format: ImageFormatHint,
    pub quality: u8,
}

/// One image known to the pipeline.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Opaque identity.
    pub id: String,
    /// User-facing name (typically the file name).
    pub name: String,
    /// Pixel source, kept for re-decode after cleanup.
    pub source: SourceRef,
    /// Decoded pixels; `None` once memory-cleaned. Shared so deep-copying
    /// the collection for undo snapshots never duplicates pixel buffers.
    pub image: Option<Arc<DynamicImage>>,
    /// Detected faces, in detector order.
    pub faces: Vec<FaceRecord>,
    /// Crop results, in face order.
    pub results: Vec<CropResult>,
    /// Whether the image participates in batch runs.
    pub selected: bool,
    pub status: RecordStatus,
    /// Output-name override from the spreadsheet mapping.
    pub output_name: Option<String>,
    pub memory_cleaned: bool,
    /// Set when the record transitions to `Completed`; drives the auto
    /// memory policy.
    pub completed_at: Option<Instant>,
}

impl ImageRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: SourceRef,
        image: Option<Arc<DynamicImage>>,
    ) -> Self {
        let status = if image.is_some() {
            RecordStatus::Loaded
        } else {
            RecordStatus::Queued
        };
        Self {
            id: id.into(),
            name: name.into(),
            source,
            image,
            faces: Vec::new(),
            results: Vec::new(),
            selected: true,
            status,
            output_name: None,
            memory_cleaned: false,
            completed_at: None,
        }
    }

    /// Faces currently selected for cropping.
    pub fn selected_faces(&self) -> impl Iterator<Item = &FaceRecord> {
        self.faces.iter().filter(|f| f.selected)
    }

    /// The name used when rendering output filenames: the mapping override
    /// when present, otherwise the file stem.
    pub fn export_stem(&self) -> String {
        if let Some(output) = &self.output_name {
            return output.clone();
        }
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => self.name[..idx].to_string(),
            _ => self.name.clone(),
        }
    }
}

/// Authoritative, ordered mapping of image identity to current state.
pub struct ImageRecordStore {
    records: Vec<ImageRecord>,
    policy: Box<dyn MemoryPolicy>,
}

impl ImageRecordStore {
    pub fn new(policy: Box<dyn MemoryPolicy>) -> Self {
        Self {
            records: Vec::new(),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Insert a record, replacing any existing record with the same id
    /// in place (order preserved).
    pub fn upsert(&mut self, record: ImageRecord) {
        match self.position(&record.id) {
            Some(idx) => self.records[idx] = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.position(id).map(|idx| &self.records[idx])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ImageRecord> {
        self.position(id).map(move |idx| &mut self.records[idx])
    }

    pub fn remove(&mut self, id: &str) -> Option<ImageRecord> {
        self.position(id).map(|idx| self.records.remove(idx))
    }

    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Toggle selection of a single face within an image.
    pub fn set_face_selected(&mut self, id: &str, face_id: u32, selected: bool) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        match record.faces.iter_mut().find(|f| f.id == face_id) {
            Some(face) => {
                face.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn select_all(&mut self) {
        for record in &mut self.records {
            record.selected = true;
        }
    }

    pub fn select_none(&mut self) {
        for record in &mut self.records {
            record.selected = false;
        }
    }

    /// Release the decoded pixel handle for a record. Idempotent; faces and
    /// results are never dropped.
    pub fn cleanup(&mut self, id: &str) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        if record.image.take().is_some() {
            debug!("released decoded pixels for {}", record.id);
        }
        record.memory_cleaned = true;
        true
    }

    /// Apply the configured policy to a record that just completed.
    pub fn apply_policy_on_complete(&mut self, id: &str) {
        if self.policy.cleanup_on_complete() {
            self.cleanup(id);
        }
    }

    /// Sweep completed records past the policy's age threshold. Returns the
    /// number of records cleaned.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let due: Vec<String> = self
            .records
            .iter()
            .filter(|r| {
                r.status == RecordStatus::Completed
                    && !r.memory_cleaned
                    && r.completed_at
                        .is_some_and(|at| self.policy.should_sweep(at, now))
            })
            .map(|r| r.id.clone())
            .collect();
        let cleaned = due.len();
        for id in due {
            self.cleanup(&id);
        }
        cleaned
    }

    /// A deep copy of the collection, for undo snapshots.
    pub fn records(&self) -> Vec<ImageRecord> {
        self.records.clone()
    }

    /// Replace the whole collection, used by undo/redo restore.
    pub fn restore(&mut self, records: Vec<ImageRecord>) {
        self.records = records;
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}
