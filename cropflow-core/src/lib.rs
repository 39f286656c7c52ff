//! Core batch face-cropping pipeline.
//!
//! This crate owns the pipeline primitives: pure crop geometry, the image
//! record store with its memory policies, the detection dispatcher with
//! retry/backoff/timeout, the background worker protocol, the sequential
//! batch processor, the streaming loader, and bounded undo/redo history.
//! Detection itself is an external capability behind the [`FaceDetector`]
//! trait.

/// Batch orchestration over loaded records and queued references.
pub mod batch;
/// Image decoding seam with dimension guards.
pub mod decode;
/// Detection dispatch: retry, backoff, box clamping, statistics.
pub mod detect;
/// Pipeline error taxonomy.
pub mod error;
/// Pure crop-rectangle computation.
pub mod geometry;
/// Bounded undo/redo over the record collection.
pub mod history;
/// Streaming intake bounding the resident working set.
pub mod loader;
/// Memory-cleanup policies.
pub mod memory;
/// Standard output-size presets.
pub mod presets;
/// Image records and the authoritative store.
pub mod records;
/// Background detection worker protocol.
pub mod worker;

pub use batch::{
    BatchJobConfig, BatchProcessor, BatchReport, ItemFailure, Progress, StreamedResult,
};
pub use decode::{FsDecoder, ImageDecoder, MAX_DIMENSION, MIN_DIMENSION};
pub use detect::{
    DetectOptions, DetectionDispatcher, DetectionExecutor, FaceDetector, RawDetection,
    RequestState, RetryPolicy, detect_with_options,
};
pub use error::{DecodeError, DetectError, EncodeError, HistoryError, RequestTimeout};
pub use geometry::{
    CropRect, CropSettings, EYE_LINE_FRACTION, FaceBox, PositioningMode, compute_crop_rect,
};
pub use history::{EditHistory, HISTORY_CAPACITY, Snapshot};
pub use loader::{DEFAULT_PAGE_SIZE, FileBatch, IntakeOutcome, PendingFile, StreamingLoader};
pub use memory::{AggressivePolicy, AutoPolicy, ManualPolicy, MemoryPolicy, policy_from_name};
pub use presets::{CropPreset, preset_by_name, standard_presets};
pub use records::{
    CropResult, FaceRecord, ImageRecord, ImageRecordStore, RecordStatus, SourceRef,
};
pub use worker::{WorkerError, WorkerHandle, spawn_worker};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
