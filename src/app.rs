//! Application Coordinator
//!
//! Wires the pipeline collaborators together and runs one or both sides of a
//! document through decode, geometry correction, zone extraction and
//! aggregation. Nothing here fails for bad input: every problem ends up as an
//! empty field.

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::analysis::{
    CombinedResult, EmptyReason, IdCardValidator, ResultAggregator, SideReport, SideResult,
    TextValidator, ZoneExtractionEngine,
};
use crate::capture::{decode_image, CanonicalFrame, GeometryStatus};
use crate::config::{AppConfig, FrameSettings};
use crate::storage::{default_zones_dir, FieldSchema, JsonZoneLayoutProvider, Side, ZoneLayoutProvider};
use crate::vision::geometry::fit_exact;
use crate::vision::{
    DocumentDetector, DocumentNormalizer, GeometryCorrector, InstallationStatus, ResizeNormalizer,
    TesseractOcr, TextRecognitionEngine,
};

/// The replaceable parts of the pipeline
pub struct Collaborators {
    pub layouts: Arc<dyn ZoneLayoutProvider>,
    pub corrector: Arc<dyn GeometryCorrector>,
    pub normalizer: Arc<dyn DocumentNormalizer>,
    pub engine: Arc<dyn TextRecognitionEngine>,
    pub validator: Arc<dyn TextValidator>,
}

impl Collaborators {
    /// Production collaborators described by `config`
    pub fn from_config(config: &AppConfig) -> Self {
        let FrameSettings {
            target_width,
            target_height,
        } = config.frame;

        Self {
            layouts: layout_provider(config.zones.dir.clone(), default_zones_dir().ok()),
            corrector: Arc::new(DocumentDetector::new(
                config.detection.clone(),
                target_width,
                target_height,
            )),
            normalizer: Arc::new(ResizeNormalizer::new(target_width, target_height)),
            engine: Arc::new(TesseractOcr::new(&config.ocr)),
            validator: Arc::new(IdCardValidator::new(&config.validation)),
        }
    }
}

/// Explicit directory, then a complete user layout directory, then built-in
pub fn layout_provider(
    explicit: Option<PathBuf>,
    user_dir: Option<PathBuf>,
) -> Arc<dyn ZoneLayoutProvider> {
    let user_dir = user_dir.filter(|dir| {
        let complete = has_all_layouts(dir);
        if !complete && dir.exists() {
            warn!("Ignoring incomplete zone layouts in {:?}", dir);
        }
        complete
    });
    match explicit.or(user_dir) {
        Some(dir) => {
            info!("Using zone layouts from {:?}", dir);
            Arc::new(JsonZoneLayoutProvider::from_dir(dir))
        }
        None => Arc::new(JsonZoneLayoutProvider::builtin()),
    }
}

/// Whether `dir` holds a layout file for every side
pub fn has_all_layouts(dir: &Path) -> bool {
    Side::ALL
        .iter()
        .all(|side| dir.join(JsonZoneLayoutProvider::file_name(*side)).is_file())
}

/// Combined result plus the per-field outcomes of each side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub result: CombinedResult,
    pub front: SideReport,
    pub back: SideReport,
}

/// Runs identity card images through the extraction pipeline
pub struct IdCardProcessor {
    frame: FrameSettings,
    schema: FieldSchema,
    parallel_sides: bool,
    layouts: Arc<dyn ZoneLayoutProvider>,
    corrector: Arc<dyn GeometryCorrector>,
    normalizer: Arc<dyn DocumentNormalizer>,
    engine: Arc<dyn TextRecognitionEngine>,
    extraction: ZoneExtractionEngine,
    aggregator: ResultAggregator,
}

impl IdCardProcessor {
    /// Build the production pipeline
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config, Collaborators::from_config(config))
    }

    /// Build with explicit collaborators
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Result<Self> {
        config
            .schema
            .validate()
            .context("Invalid field schema")?;

        let Collaborators {
            layouts,
            corrector,
            normalizer,
            engine,
            validator,
        } = collaborators;

        let extraction = ZoneExtractionEngine::new(
            engine.clone(),
            validator,
            config.ocr.preprocessing.clone(),
            config.extraction.parallel_fields,
        );

        Ok(Self {
            frame: config.frame,
            schema: config.schema.clone(),
            parallel_sides: config.extraction.parallel_sides,
            layouts,
            corrector,
            normalizer,
            engine,
            extraction,
            aggregator: ResultAggregator::new(),
        })
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Extract the front side fields
    pub fn process_front(&self, image: &[u8]) -> SideResult {
        self.process_side(Side::Front, image).to_result()
    }

    /// Extract the back side fields, MRZ included
    pub fn process_back(&self, image: &[u8]) -> SideResult {
        self.process_side(Side::Back, image).to_result()
    }

    /// Extract both sides and combine them
    pub fn process_both(&self, front: &[u8], back: &[u8]) -> CombinedResult {
        self.process_both_detailed(front, back).result
    }

    /// Like [`process_both`](Self::process_both), keeping per-field outcomes
    pub fn process_both_detailed(&self, front: &[u8], back: &[u8]) -> DocumentReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("document", run = %run_id);
        let _guard = span.enter();

        let (front_report, back_report) = if self.parallel_sides {
            std::thread::scope(|scope| {
                let back_worker = scope.spawn(|| {
                    let _guard = span.enter();
                    self.process_side(Side::Back, back)
                });
                let front_report = self.process_side(Side::Front, front);
                let back_report = back_worker.join().unwrap_or_else(|_| {
                    warn!("Back side worker panicked");
                    SideReport::empty(
                        self.schema.fields(Side::Back),
                        GeometryStatus::Skipped,
                        EmptyReason::RecognitionFailed("side worker panicked".to_string()),
                    )
                });
                (front_report, back_report)
            })
        } else {
            (
                self.process_side(Side::Front, front),
                self.process_side(Side::Back, back),
            )
        };

        let result = self
            .aggregator
            .combine(&front_report.to_result(), &back_report.to_result());
        info!(
            "Document processed: {}/{} fields ({:.1}%)",
            result.extracted_fields,
            result.total_fields,
            result.extraction_rate * 100.0
        );

        DocumentReport {
            result,
            front: front_report,
            back: back_report,
        }
    }

    /// Status of the text recognition engine
    pub fn check_ocr_status(&self) -> InstallationStatus {
        self.engine.verify_installation()
    }

    /// Run one side; the report always has exactly the side's fields
    pub fn process_side(&self, side: Side, image: &[u8]) -> SideReport {
        let span = info_span!("side", side = %side);
        let _guard = span.enter();
        let fields = self.schema.fields(side);

        let decoded = match decode_image(image) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Skipping {} side: {}", side, e);
                return SideReport::empty(fields, GeometryStatus::Skipped, EmptyReason::DecodeFailed);
            }
        };

        let frame = self.canonical_frame(&decoded);

        let layout = match self.layouts.load_zones(side) {
            Ok(layout) => layout,
            Err(e) => {
                warn!("No zone layout for {} side: {}", side, e);
                return SideReport::empty(fields, frame.geometry(), EmptyReason::LayoutUnavailable);
            }
        };

        let report = self.extraction.extract_report(&frame, &layout, fields);
        info!(
            "{} side: {}/{} fields extracted",
            side,
            report.extracted(),
            fields.len()
        );
        report
    }

    fn canonical_frame(&self, image: &DynamicImage) -> CanonicalFrame {
        let (width, height) = (self.frame.target_width, self.frame.target_height);
        match self.corrector.correct(image) {
            Ok(corrected) => {
                CanonicalFrame::new(fit_exact(corrected, width, height), GeometryStatus::Detected)
            }
            Err(e) => {
                info!("{}, normalizing the whole image instead", e);
                let normalized = self.normalizer.normalize(image);
                CanonicalFrame::new(fit_exact(normalized, width, height), GeometryStatus::Fallback)
            }
        }
    }
}
