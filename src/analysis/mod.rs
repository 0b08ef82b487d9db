//! Analysis Layer
//!
//! Turns a canonical frame into field text:
//! - zone extraction (crop, preprocess, recognize, clean) per field
//! - field-specific validation
//! - aggregation of both sides into one combined result

pub mod aggregate;
pub mod validation;

pub use aggregate::{CombinedResult, ResultAggregator};
pub use validation::{FieldRule, IdCardValidator, TextValidator};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::capture::{CanonicalFrame, GeometryStatus};
use crate::config::OcrPreprocessing;
use crate::error::ExtractionError;
use crate::storage::ZoneLayout;
use crate::vision::{prepare_crop, TextRecognitionEngine};

/// Field name to extracted text for one side; empty string means "not extracted"
pub type SideResult = BTreeMap<String, String>;

/// Why a field came back empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum EmptyReason {
    DecodeFailed,
    /// Document outline not found and no fallback applied
    DetectionFailed,
    LayoutUnavailable,
    ZoneUndefined,
    CropEmpty,
    EngineUnavailable,
    RecognitionFailed(String),
    TimedOut,
    NoText,
    /// Validation rejected the recognized text
    Discarded,
}

impl From<&ExtractionError> for EmptyReason {
    fn from(error: &ExtractionError) -> Self {
        match error {
            ExtractionError::Decode(_) => EmptyReason::DecodeFailed,
            ExtractionError::ZoneUndefined(_) => EmptyReason::ZoneUndefined,
            ExtractionError::CropEmpty { .. } => EmptyReason::CropEmpty,
            ExtractionError::EngineUnavailable(_) => EmptyReason::EngineUnavailable,
            ExtractionError::Timeout(_) => EmptyReason::TimedOut,
            ExtractionError::Recognition(message) => EmptyReason::RecognitionFailed(message.clone()),
            ExtractionError::DetectionFailed(_) => EmptyReason::DetectionFailed,
        }
    }
}

/// Outcome of extracting one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    Text(String),
    Empty(EmptyReason),
}

impl FieldOutcome {
    /// Text value, "" for empty outcomes
    pub fn text(&self) -> &str {
        match self {
            FieldOutcome::Text(text) => text,
            FieldOutcome::Empty(_) => "",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldOutcome::Text(_))
    }
}

/// Per-field outcomes of one side, with how its frame was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideReport {
    pub geometry: GeometryStatus,
    pub outcomes: BTreeMap<String, FieldOutcome>,
}

impl SideReport {
    /// Every field empty for the same reason
    pub fn empty(fields: &[String], geometry: GeometryStatus, reason: EmptyReason) -> Self {
        Self {
            geometry,
            outcomes: fields
                .iter()
                .map(|field| (field.clone(), FieldOutcome::Empty(reason.clone())))
                .collect(),
        }
    }

    /// Flatten into the plain field-to-text mapping
    pub fn to_result(&self) -> SideResult {
        self.outcomes
            .iter()
            .map(|(field, outcome)| (field.clone(), outcome.text().to_string()))
            .collect()
    }

    /// Fields with text
    pub fn extracted(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_text()).count()
    }
}

/// Crops each field zone out of a canonical frame and recognizes it
pub struct ZoneExtractionEngine {
    engine: Arc<dyn TextRecognitionEngine>,
    validator: Arc<dyn TextValidator>,
    preprocessing: OcrPreprocessing,
    parallel: bool,
}

impl ZoneExtractionEngine {
    pub fn new(
        engine: Arc<dyn TextRecognitionEngine>,
        validator: Arc<dyn TextValidator>,
        preprocessing: OcrPreprocessing,
        parallel: bool,
    ) -> Self {
        Self {
            engine,
            validator,
            preprocessing,
            parallel,
        }
    }

    /// Extract every field in `fields`; the result has exactly those keys
    pub fn extract(&self, frame: &CanonicalFrame, layout: &ZoneLayout, fields: &[String]) -> SideResult {
        self.extract_report(frame, layout, fields).to_result()
    }

    /// Like [`extract`](Self::extract), keeping the reason behind each empty field
    pub fn extract_report(
        &self,
        frame: &CanonicalFrame,
        layout: &ZoneLayout,
        fields: &[String],
    ) -> SideReport {
        let available = self.engine.is_available();
        if !available {
            warn!("Text recognition engine unavailable, fields will be empty");
        }

        let raw: BTreeMap<String, FieldOutcome> = if self.parallel && fields.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = fields
                    .iter()
                    .map(|field| {
                        let handle =
                            scope.spawn(move || self.extract_field(frame, layout, field, available));
                        (field, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(field, handle)| {
                        let outcome = handle.join().unwrap_or_else(|_| {
                            warn!("Extraction worker for {} panicked", field);
                            FieldOutcome::Empty(EmptyReason::RecognitionFailed(
                                "extraction worker panicked".to_string(),
                            ))
                        });
                        (field.clone(), outcome)
                    })
                    .collect()
            })
        } else {
            fields
                .iter()
                .map(|field| (field.clone(), self.extract_field(frame, layout, field, available)))
                .collect()
        };

        self.validate(frame.geometry(), raw)
    }

    fn extract_field(
        &self,
        frame: &CanonicalFrame,
        layout: &ZoneLayout,
        field: &str,
        available: bool,
    ) -> FieldOutcome {
        match self.read_zone(frame, layout, field, available) {
            Ok(text) if text.is_empty() => FieldOutcome::Empty(EmptyReason::NoText),
            Ok(text) => {
                trace!("{}: {:?}", field, text);
                FieldOutcome::Text(text)
            }
            Err(e) => {
                debug!("{}: {}", field, e);
                FieldOutcome::Empty(EmptyReason::from(&e))
            }
        }
    }

    fn read_zone(
        &self,
        frame: &CanonicalFrame,
        layout: &ZoneLayout,
        field: &str,
        available: bool,
    ) -> Result<String, ExtractionError> {
        let zone = layout
            .get(field)
            .ok_or_else(|| ExtractionError::ZoneUndefined(field.to_string()))?;
        let rect = frame.zone_rect(zone);
        let crop = frame.crop(rect).ok_or_else(|| ExtractionError::CropEmpty {
            field: field.to_string(),
            width: rect.width,
            height: rect.height,
        })?;
        if !available {
            return Err(ExtractionError::EngineUnavailable(
                "engine reported unavailable".to_string(),
            ));
        }

        let prepared = prepare_crop(crop, &self.preprocessing);
        let raw = self.engine.recognize_line(&prepared)?;
        Ok(self.validator.clean_text(&raw))
    }

    /// Run side-level validation, keeping the key set
    fn validate(&self, geometry: GeometryStatus, raw: BTreeMap<String, FieldOutcome>) -> SideReport {
        let texts: SideResult = raw
            .iter()
            .map(|(field, outcome)| (field.clone(), outcome.text().to_string()))
            .collect();
        let mut validated = self.validator.validate_all(texts);

        let outcomes = raw
            .into_iter()
            .map(|(field, outcome)| {
                let value = validated.remove(&field).unwrap_or_default();
                let outcome = match outcome {
                    FieldOutcome::Text(_) if value.is_empty() => {
                        debug!("{}: discarded by validation", field);
                        FieldOutcome::Empty(EmptyReason::Discarded)
                    }
                    FieldOutcome::Empty(reason) if value.is_empty() => FieldOutcome::Empty(reason),
                    _ => FieldOutcome::Text(value),
                };
                (field, outcome)
            })
            .collect();

        SideReport { geometry, outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ZoneRect;
    use crate::test_util::{MockEngine, PassthroughValidator};
    use image::{Rgb, RgbImage};

    fn frame() -> CanonicalFrame {
        CanonicalFrame::new(
            RgbImage::from_pixel(1000, 630, Rgb([255, 255, 255])),
            GeometryStatus::Detected,
        )
    }

    fn layout() -> ZoneLayout {
        let mut layout = ZoneLayout::default();
        layout.insert("name", ZoneRect::new(0.1, 0.1, 0.2, 0.05));
        layout.insert("number", ZoneRect::new(0.5, 0.5, 0.3, 0.1));
        layout.insert("edge", ZoneRect::new(1.0, 1.0, 0.0, 0.0));
        layout
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn extraction(engine: Arc<MockEngine>, parallel: bool) -> ZoneExtractionEngine {
        let preprocessing = OcrPreprocessing {
            enabled: false,
            ..Default::default()
        };
        ZoneExtractionEngine::new(engine, Arc::new(PassthroughValidator), preprocessing, parallel)
    }

    #[test]
    fn test_extract_key_set_matches_fields() {
        let engine = Arc::new(MockEngine::replying("text"));
        let extraction = extraction(engine, false);
        let wanted = fields(&["name", "number", "missing", "edge"]);

        let report = extraction.extract_report(&frame(), &layout(), &wanted);
        let keys: Vec<_> = report.outcomes.keys().cloned().collect();
        assert_eq!(keys, fields(&["edge", "missing", "name", "number"]));

        assert_eq!(report.outcomes["name"], FieldOutcome::Text("text".to_string()));
        assert_eq!(report.outcomes["missing"], FieldOutcome::Empty(EmptyReason::ZoneUndefined));
        assert_eq!(report.outcomes["edge"], FieldOutcome::Empty(EmptyReason::CropEmpty));
        assert_eq!(report.extracted(), 2);
        assert_eq!(report.geometry, GeometryStatus::Detected);
    }

    #[test]
    fn test_crop_uses_rounded_zone_pixels() {
        let engine = Arc::new(MockEngine::replying("x"));
        let extraction = extraction(engine.clone(), false);
        extraction.extract(&frame(), &layout(), &fields(&["name"]));

        // 200x32 is below the OCR minimum height and gets upscaled 3x
        assert_eq!(engine.crop_sizes(), vec![(600, 96)]);
    }

    #[test]
    fn test_empty_field_list() {
        let engine = Arc::new(MockEngine::replying("text"));
        let extraction = extraction(engine.clone(), true);
        assert!(extraction.extract(&frame(), &layout(), &[]).is_empty());
        assert!(engine.crop_sizes().is_empty());
    }

    #[test]
    fn test_unavailable_engine_yields_empty_fields() {
        let engine = Arc::new(MockEngine::unavailable());
        let extraction = extraction(engine.clone(), false);

        let report = extraction.extract_report(&frame(), &layout(), &fields(&["name", "number"]));
        assert!(report
            .outcomes
            .values()
            .all(|o| *o == FieldOutcome::Empty(EmptyReason::EngineUnavailable)));
        assert!(engine.crop_sizes().is_empty());
    }

    #[test]
    fn test_recognition_failure_is_isolated() {
        let engine = Arc::new(MockEngine::failing_above(100));
        let extraction = extraction(engine, false);

        // "number" reaches the engine as 600x126 and is rejected by height
        let report = extraction.extract_report(&frame(), &layout(), &fields(&["name", "number"]));
        assert!(report.outcomes["name"].is_text());
        assert!(matches!(
            report.outcomes["number"],
            FieldOutcome::Empty(EmptyReason::RecognitionFailed(_))
        ));
    }

    #[test]
    fn test_blank_recognition_is_no_text() {
        let engine = Arc::new(MockEngine::replying(""));
        let extraction = extraction(engine, false);
        let report = extraction.extract_report(&frame(), &layout(), &fields(&["name"]));
        assert_eq!(report.outcomes["name"], FieldOutcome::Empty(EmptyReason::NoText));
    }

    #[test]
    fn test_validation_can_discard() {
        let engine = Arc::new(MockEngine::replying("123"));
        let preprocessing = OcrPreprocessing::default();
        let extraction = ZoneExtractionEngine::new(
            engine,
            Arc::new(IdCardValidator::default()),
            preprocessing,
            false,
        );
        let mut layout = ZoneLayout::default();
        layout.insert("b_seria_id", ZoneRect::new(0.1, 0.1, 0.2, 0.1));

        // Series keeps letters only; "123" maps to "IZE"
        let result = extraction.extract(&frame(), &layout, &fields(&["b_seria_id"]));
        assert_eq!(result["b_seria_id"], "IZE");

        let engine = Arc::new(MockEngine::replying("???"));
        let extraction = ZoneExtractionEngine::new(
            engine,
            Arc::new(IdCardValidator::default()),
            OcrPreprocessing::default(),
            false,
        );
        let report = extraction.extract_report(&frame(), &layout, &fields(&["b_seria_id"]));
        assert_eq!(report.outcomes["b_seria_id"], FieldOutcome::Empty(EmptyReason::Discarded));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let wanted = fields(&["name", "number", "missing", "edge"]);
        let sequential = extraction(Arc::new(MockEngine::replying("abc")), false)
            .extract_report(&frame(), &layout(), &wanted);
        let parallel = extraction(Arc::new(MockEngine::replying("abc")), true)
            .extract_report(&frame(), &layout(), &wanted);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_side_report_empty() {
        let report = SideReport::empty(
            &fields(&["a", "b"]),
            GeometryStatus::Skipped,
            EmptyReason::DecodeFailed,
        );
        assert_eq!(report.extracted(), 0);
        let result = report.to_result();
        assert_eq!(result.len(), 2);
        assert!(result.values().all(String::is_empty));
    }

    #[test]
    fn test_error_to_reason() {
        use std::time::Duration;

        let cases = [
            (ExtractionError::Decode("x".into()), EmptyReason::DecodeFailed),
            (ExtractionError::DetectionFailed("x".into()), EmptyReason::DetectionFailed),
            (ExtractionError::ZoneUndefined("f".into()), EmptyReason::ZoneUndefined),
            (
                ExtractionError::CropEmpty {
                    field: "f".into(),
                    width: 0,
                    height: 3,
                },
                EmptyReason::CropEmpty,
            ),
            (ExtractionError::EngineUnavailable("x".into()), EmptyReason::EngineUnavailable),
            (ExtractionError::Timeout(Duration::from_secs(1)), EmptyReason::TimedOut),
            (
                ExtractionError::Recognition("boom".into()),
                EmptyReason::RecognitionFailed("boom".into()),
            ),
        ];
        for (error, reason) in cases {
            assert_eq!(EmptyReason::from(&error), reason);
        }
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(FieldOutcome::Empty(EmptyReason::RecognitionFailed(
            "boom".to_string(),
        )))
        .unwrap();
        assert_eq!(json["empty"]["reason"], "recognition_failed");
        assert_eq!(json["empty"]["detail"], "boom");

        let json = serde_json::to_value(FieldOutcome::Text("JAN".to_string())).unwrap();
        assert_eq!(json["text"], "JAN");
    }
}
