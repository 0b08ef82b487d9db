//! Error taxonomy
//!
//! Extraction errors never reach callers of the pipeline: they are converted
//! into per-field empty outcomes where they happen. Layout errors surface from
//! the zone/schema loaders.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures that can occur while extracting a single side or field
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input bytes could not be decoded into a non-empty image
    #[error("failed to decode input image: {0}")]
    Decode(String),
    /// The document outline could not be located (non-fatal, triggers fallback)
    #[error("document boundary not detected: {0}")]
    DetectionFailed(String),
    /// Field has no zone in the layout
    #[error("zone '{0}' is not defined in the layout")]
    ZoneUndefined(String),
    /// Zone rectangle has zero area after clamping to the frame
    #[error("zone '{field}' produced an empty crop ({width}x{height})")]
    CropEmpty {
        field: String,
        width: u32,
        height: u32,
    },
    /// Recognition engine is not installed or not configured
    #[error("text recognition engine unavailable: {0}")]
    EngineUnavailable(String),
    /// Recognition engine failed at runtime
    #[error("text recognition failed: {0}")]
    Recognition(String),
    /// Recognition exceeded its deadline
    #[error("text recognition timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while loading zone layouts or field schemas
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read layout {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse layout {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("zone '{field}' is invalid: {reason}")]
    InvalidZone { field: String, reason: String },
    #[error("fields declared on both sides: {}", .0.join(", "))]
    FieldCollision(Vec<String>),
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
}
