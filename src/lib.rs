//! idcard-ocr - Zone-based field extraction for identity cards
//!
//! Photographs of both sides of a card are geometrically normalized to a
//! canonical frame, each field's zone is cropped and recognized with
//! Tesseract, and the cleaned results are combined into one record with an
//! extraction rate.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod storage;
pub mod vision;

#[cfg(test)]
mod test_util;

pub use analysis::{CombinedResult, FieldOutcome, SideReport, SideResult};
pub use app::{Collaborators, DocumentReport, IdCardProcessor};
pub use config::AppConfig;
pub use error::{ExtractionError, LayoutError};
pub use storage::{FieldSchema, Side};
