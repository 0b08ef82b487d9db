//! Vision/OCR Layer
//!
//! Geometry correction of the photographed document and text recognition
//! of zone crops:
//! - document outline detection with perspective correction
//! - a resize-only fallback when no outline is found
//! - Tesseract via its command line tool

pub mod detection;
pub mod geometry;
pub mod ocr;
pub mod ocr_preprocess;
pub mod tesseract;

pub use detection::DocumentDetector;
pub use geometry::{DocumentNormalizer, GeometryCorrector, ResizeNormalizer};
pub use ocr::{InstallationStatus, TextRecognitionEngine};
pub use ocr_preprocess::prepare_crop;
pub use tesseract::TesseractOcr;
