//! Geometry correction contracts and the fallback normalizer

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::error::ExtractionError;

/// Produces a canonical-size, perspective-corrected image of the document.
///
/// Returns `ExtractionError::DetectionFailed` when the document outline
/// cannot be located; callers then fall back to a [`DocumentNormalizer`].
pub trait GeometryCorrector: Send + Sync {
    fn correct(&self, image: &DynamicImage) -> Result<RgbImage, ExtractionError>;
}

/// Brings an arbitrary image to the canonical size without locating the document
pub trait DocumentNormalizer: Send + Sync {
    fn normalize(&self, image: &DynamicImage) -> RgbImage;
}

/// Stretches the whole image to the canonical size
#[derive(Debug, Clone, Copy)]
pub struct ResizeNormalizer {
    width: u32,
    height: u32,
}

impl ResizeNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl DocumentNormalizer for ResizeNormalizer {
    fn normalize(&self, image: &DynamicImage) -> RgbImage {
        debug!(
            "Normalizing {}x{} image to {}x{}",
            image.width(),
            image.height(),
            self.width,
            self.height
        );
        fit_exact(image.to_rgb8(), self.width, self.height)
    }
}

/// Resize unless the image already has the requested size
pub fn fit_exact(image: RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_normalizer_output_size() {
        let normalizer = ResizeNormalizer::new(1000, 630);
        let image = DynamicImage::ImageRgb8(RgbImage::new(320, 240));
        assert_eq!(normalizer.normalize(&image).dimensions(), (1000, 630));
    }

    #[test]
    fn test_fit_exact_keeps_matching_image() {
        let mut image = RgbImage::new(4, 3);
        image.put_pixel(1, 1, image::Rgb([9, 8, 7]));
        let fitted = fit_exact(image.clone(), 4, 3);
        assert_eq!(fitted, image);
    }
}
