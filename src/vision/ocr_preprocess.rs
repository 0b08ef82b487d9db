//! Image preprocessing filters for OCR optimization
//!
//! Zone crops are small and printed on a patterned background; upscaling
//! and grayscale conversion noticeably help tesseract on them.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::config::OcrPreprocessing;

/// Tesseract needs roughly 20+ pixel glyphs for reliable recognition
const MIN_OCR_DIMENSION: u32 = 80;

/// Upscale factor for small crops (2x-4x), 1 when large enough
pub fn auto_scale(width: u32, height: u32) -> u32 {
    if width == 0 || height == 0 {
        return 1;
    }
    if height >= MIN_OCR_DIMENSION && width >= MIN_OCR_DIMENSION {
        return 1;
    }
    let height_scale = MIN_OCR_DIMENSION.div_ceil(height);
    let width_scale = MIN_OCR_DIMENSION.div_ceil(width);
    height_scale.max(width_scale).clamp(2, 4)
}

/// Apply preprocessing to a zone crop before recognition
pub fn prepare_crop(crop: RgbImage, settings: &OcrPreprocessing) -> DynamicImage {
    let (width, height) = crop.dimensions();
    let auto = auto_scale(width, height);
    let scale = if settings.enabled {
        settings.scale.max(auto)
    } else {
        auto
    };

    // Upscale first so the other filters work on the final resolution
    let mut image = if scale > 1 {
        debug!("Upscaling {}x{} crop by {}x", width, height, scale);
        imageops::resize(&crop, width * scale, height * scale, FilterType::CatmullRom)
    } else {
        crop
    };

    if !settings.enabled {
        return DynamicImage::ImageRgb8(image);
    }

    if settings.contrast.abs() > 0.01 {
        image = imageops::contrast(&image, settings.contrast);
    }

    if settings.sharpen > 0.01 {
        image = imageops::unsharpen(&image, settings.sharpen, 1);
    }

    let mut processed = if settings.grayscale {
        DynamicImage::ImageLuma8(imageops::grayscale(&image))
    } else {
        DynamicImage::ImageRgb8(image)
    };

    // Invert last
    if settings.invert {
        processed.invert();
    }

    processed
}
