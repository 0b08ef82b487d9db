//! Input Layer
//!
//! Turns the caller's encoded image (raw file bytes or base64 text) into a
//! decoded image, and defines the canonical frame the extraction runs on.

pub mod frame;

pub use frame::{CanonicalFrame, GeometryStatus, PixelRect};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::DynamicImage;
use tracing::debug;

use crate::error::ExtractionError;

/// Decode an encoded image.
///
/// Accepts encoded image bytes (PNG, JPEG, ...) directly, or base64 text of
/// them with an optional `data:image/...;base64,` prefix.
pub fn decode_image(input: &[u8]) -> Result<DynamicImage, ExtractionError> {
    if input.is_empty() {
        return Err(ExtractionError::Decode("input is empty".to_string()));
    }

    let image = if image::guess_format(input).is_ok() {
        image::load_from_memory(input).map_err(|e| ExtractionError::Decode(e.to_string()))?
    } else {
        let bytes = decode_base64(input)?;
        debug!("Decoded {} bytes of base64 image data", bytes.len());
        image::load_from_memory(&bytes).map_err(|e| ExtractionError::Decode(e.to_string()))?
    };

    if image.width() == 0 || image.height() == 0 {
        return Err(ExtractionError::Decode("image has no pixels".to_string()));
    }

    Ok(image)
}

fn decode_base64(input: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let text = std::str::from_utf8(input)
        .map_err(|_| ExtractionError::Decode("input is neither an image nor base64 text".to_string()))?;

    // Strip a data URL header such as "data:image/png;base64,"
    let payload = match text.find(";base64,") {
        Some(idx) if text.trim_start().starts_with("data:") => &text[idx + ";base64,".len()..],
        _ => text,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ExtractionError::Decode("base64 payload is empty".to_string()));
    }

    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| ExtractionError::Decode(format!("invalid base64: {}", e)))
}
