//! Application Configuration
//!
//! Pipeline settings stored in TOML format. Every section falls back to its
//! defaults, so a config file only needs the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::validation::FieldRule;
use crate::storage::FieldSchema;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Canonical frame settings
    pub frame: FrameSettings,
    /// Zone layout settings
    pub zones: ZoneSettings,
    /// Field lists per side
    pub schema: FieldSchema,
    /// Text recognition settings
    pub ocr: OcrSettings,
    /// Document boundary detection settings
    pub detection: DetectionSettings,
    /// Extraction scheduling
    pub extraction: ExtractionSettings,
    /// Field validation settings
    pub validation: ValidationSettings,
}

/// Canonical frame size all zone coordinates are relative to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub target_width: u32,
    pub target_height: u32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        // ID-1 card aspect ratio (85.60 x 53.98 mm)
        Self {
            target_width: 1000,
            target_height: 630,
        }
    }
}

/// Zone layout location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    /// Directory with `zones_front.json` / `zones_back.json`; built-in layouts when unset
    pub dir: Option<PathBuf>,
}

/// Tesseract settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Path to the tesseract executable (looked up on PATH when unset)
    pub tesseract_path: Option<PathBuf>,
    /// Tesseract language string
    pub languages: String,
    /// Page segmentation mode for zone crops (7 = single line)
    pub line_psm: u32,
    /// Page segmentation mode for general text (6 = uniform block)
    pub block_psm: u32,
    /// Deadline for one recognition call, including the wait for a permit
    pub timeout_ms: u64,
    /// Maximum concurrent recognition calls
    pub max_concurrent: usize,
    /// Crop preprocessing before recognition
    pub preprocessing: OcrPreprocessing,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            languages: "pol+eng".to_string(),
            line_psm: 7,
            block_psm: 6,
            timeout_ms: 15_000,
            max_concurrent: 2,
            preprocessing: OcrPreprocessing::default(),
        }
    }
}

/// Image filters applied to zone crops before recognition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrPreprocessing {
    /// Master switch for the filters below (auto-upscaling always applies)
    pub enabled: bool,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Invert colors (light text on dark background)
    pub invert: bool,
    /// Contrast adjustment in percent (0 = unchanged)
    pub contrast: f32,
    /// Unsharp mask sigma (0 = off)
    pub sharpen: f32,
    /// Integer upscale factor
    pub scale: u32,
}

impl Default for OcrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: true,
            grayscale: true,
            invert: false,
            contrast: 0.0,
            sharpen: 0.0,
            scale: 1,
        }
    }
}

/// Document boundary detection tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Longest side of the working copy used for edge detection
    pub working_size: u32,
    /// Gaussian blur sigma before edge detection
    pub blur_sigma: f32,
    /// Canny hysteresis thresholds
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum share of the image the document outline must cover
    pub min_area_ratio: f64,
    /// Polygon approximation tolerance as a fraction of the contour perimeter
    pub approx_epsilon: f64,
    /// Accepted long/short side ratio range of the outline
    pub min_aspect: f64,
    pub max_aspect: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            working_size: 800,
            blur_sigma: 1.5,
            canny_low: 30.0,
            canny_high: 90.0,
            min_area_ratio: 0.2,
            approx_epsilon: 0.02,
            min_aspect: 1.2,
            max_aspect: 2.1,
        }
    }
}

/// Extraction scheduling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Recognize the zones of one side concurrently
    pub parallel_fields: bool,
    /// Process front and back concurrently in `process_both`
    pub parallel_sides: bool,
}

/// Field validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Known nationality spellings OCR output is snapped to
    pub nationalities: Vec<String>,
    /// Minimum normalized Levenshtein similarity for snapping
    pub similarity_threshold: f64,
    /// Rule per field name; fields not listed are treated as free text
    pub rules: BTreeMap<String, FieldRule>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            nationalities: vec!["POLSKIE".to_string()],
            similarity_threshold: 0.7,
            rules: FieldRule::polish_id_card(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default config file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join("config.toml"))
}

/// Load the given file, or the default location if it exists, or defaults
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Ok(path) if path.exists() => {
            info!("Loading config from {:?}", path);
            load_config(&path)
        }
        _ => Ok(AppConfig::default()),
    }
}
