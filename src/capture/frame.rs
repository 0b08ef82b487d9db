//! Canonical frame: the normalized image of one document side

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

use crate::storage::ZoneRect;

/// How the canonical frame of a side was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryStatus {
    /// Document outline found and perspective corrected
    Detected,
    /// Outline not found; the whole image was normalized instead
    Fallback,
    /// Input could not be decoded, no frame exists
    Skipped,
}

/// Absolute pixel rectangle inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Map a fractional zone onto a `frame_width x frame_height` frame
    pub fn from_zone(zone: &ZoneRect, frame_width: u32, frame_height: u32) -> Self {
        let w = f64::from(frame_width);
        let h = f64::from(frame_height);
        Self {
            x: to_pixels(zone.x * w),
            y: to_pixels(zone.y * h),
            width: to_pixels(zone.width * w),
            height: to_pixels(zone.height * h),
        }
    }

    /// Intersect with a `width x height` image anchored at the origin
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Round half away from zero and saturate into `u32`
fn to_pixels(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.round().min(f64::from(u32::MAX)) as u32
}

/// A fixed-size, geometrically normalized image of one document side
#[derive(Debug, Clone)]
pub struct CanonicalFrame {
    image: RgbImage,
    geometry: GeometryStatus,
}

impl CanonicalFrame {
    pub fn new(image: RgbImage, geometry: GeometryStatus) -> Self {
        Self { image, geometry }
    }

    pub fn geometry(&self) -> GeometryStatus {
        self.geometry
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Absolute rectangle for a zone in this frame
    pub fn zone_rect(&self, zone: &ZoneRect) -> PixelRect {
        let (width, height) = self.dimensions();
        PixelRect::from_zone(zone, width, height)
    }

    /// Copy out a region, clamped to the frame bounds.
    ///
    /// Returns `None` when nothing is left after clamping.
    pub fn crop(&self, rect: PixelRect) -> Option<RgbImage> {
        let (width, height) = self.dimensions();
        let clamped = rect.clamp_to(width, height);
        if clamped.is_empty() {
            return None;
        }
        Some(
            imageops::crop_imm(&self.image, clamped.x, clamped.y, clamped.width, clamped.height)
                .to_image(),
        )
    }
}
