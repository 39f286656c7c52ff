//! Pipeline error taxonomy.
//!
//! Every variant carries enough context to attribute the failure to a
//! specific image or file. A zero-face detection outcome is not represented
//! here: it is a valid result, not an error.

use std::time::Duration;

use thiserror::Error;

/// A file was rejected before entering the pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("{name} is {width}x{height}, above the maximum dimension of {max}px")]
    Oversized {
        name: String,
        width: u32,
        height: u32,
        max: u32,
    },
    #[error("{name} is {width}x{height}, below the minimum dimension of {min}px")]
    Undersized {
        name: String,
        width: u32,
        height: u32,
        min: u32,
    },
}

/// Detection failed terminally: the backend is unavailable or every attempt
/// in the retry budget failed (including timeouts).
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detection backend unavailable: {0}")]
    Unavailable(String),
    #[error("detection failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Encoding a single face crop failed. Other faces of the same image are
/// unaffected.
#[derive(Debug, Error)]
#[error("failed to encode face {face_id}: {reason}")]
pub struct EncodeError {
    pub face_id: u32,
    pub reason: String,
}

/// Undo/redo was invoked with nothing to restore.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history is empty")]
    Empty,
}

/// A detection attempt exceeded its deadline. Folded into the retry budget
/// by the dispatcher; surfaced in `DetectError::Exhausted` when terminal.
#[derive(Debug, Error)]
#[error("detection request {correlation_id} timed out after {timeout:?}")]
pub struct RequestTimeout {
    pub correlation_id: u64,
    pub timeout: Duration,
}
