//! Shared test doubles

use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;

use crate::analysis::{SideResult, TextValidator};
use crate::error::{ExtractionError, LayoutError};
use crate::storage::{Side, ZoneLayout, ZoneLayoutProvider};
use crate::vision::{GeometryCorrector, InstallationStatus, TextRecognitionEngine};

pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Recognition engine that returns a fixed reply and records crop sizes
pub struct MockEngine {
    reply: String,
    available: bool,
    fail_above_height: Option<u32>,
    crops: Mutex<Vec<(u32, u32)>>,
}

impl MockEngine {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            available: true,
            fail_above_height: None,
            crops: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::replying("")
        }
    }

    /// Replies "text" but fails on crops taller than `height`
    pub fn failing_above(height: u32) -> Self {
        Self {
            fail_above_height: Some(height),
            ..Self::replying("text")
        }
    }

    pub fn crop_sizes(&self) -> Vec<(u32, u32)> {
        self.crops.lock().clone()
    }
}

impl TextRecognitionEngine for MockEngine {
    fn recognize_line(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        self.crops.lock().push((image.width(), image.height()));
        match self.fail_above_height {
            Some(limit) if image.height() > limit => {
                Err(ExtractionError::Recognition("mock failure".to_string()))
            }
            _ => Ok(self.reply.clone()),
        }
    }

    fn recognize_block(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        self.recognize_line(image)
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn verify_installation(&self) -> InstallationStatus {
        if self.available {
            InstallationStatus::ready("mock", vec!["eng".to_string()])
        } else {
            InstallationStatus::missing("mock engine disabled", "enable it")
        }
    }
}

/// Trims only
pub struct PassthroughValidator;

impl TextValidator for PassthroughValidator {
    fn clean_text(&self, text: &str) -> String {
        text.trim().to_string()
    }

    fn validate_all(&self, fields: SideResult) -> SideResult {
        fields
    }
}

/// Never finds the document
pub struct FailingCorrector;

impl GeometryCorrector for FailingCorrector {
    fn correct(&self, _image: &DynamicImage) -> Result<RgbImage, ExtractionError> {
        Err(ExtractionError::DetectionFailed("no outline".to_string()))
    }
}

/// Returns the input unchanged, as if it were already the card
pub struct IdentityCorrector;

impl GeometryCorrector for IdentityCorrector {
    fn correct(&self, image: &DynamicImage) -> Result<RgbImage, ExtractionError> {
        Ok(image.to_rgb8())
    }
}

/// Serves a fixed layout for one side and fails for the other
pub struct OneSidedLayouts {
    pub side: Side,
    pub layout: Arc<ZoneLayout>,
}

impl ZoneLayoutProvider for OneSidedLayouts {
    fn load_zones(&self, side: Side) -> Result<Arc<ZoneLayout>, LayoutError> {
        if side == self.side {
            Ok(self.layout.clone())
        } else {
            Err(LayoutError::InvalidZone {
                field: side.to_string(),
                reason: "no layout for this side".to_string(),
            })
        }
    }
}
