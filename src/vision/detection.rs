//! Document boundary detection
//!
//! Finds the outline of the card in a photograph and warps it onto the
//! canonical frame. Edges are found on a downscaled grayscale copy; the
//! largest plausible quadrilateral wins.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use imageproc::morphology::dilate;
use imageproc::point::Point;
use std::time::Instant;
use tracing::debug;

use crate::config::DetectionSettings;
use crate::error::ExtractionError;
use crate::vision::geometry::GeometryCorrector;

/// Corner coordinates in image space: top-left, top-right, bottom-right, bottom-left
pub type Quad = [(f32, f32); 4];

/// Edge/contour based document detector with perspective correction
#[derive(Debug, Clone)]
pub struct DocumentDetector {
    settings: DetectionSettings,
    target_width: u32,
    target_height: u32,
}

impl DocumentDetector {
    pub fn new(settings: DetectionSettings, target_width: u32, target_height: u32) -> Self {
        Self {
            settings,
            target_width,
            target_height,
        }
    }

    /// Locate the document outline in a grayscale image
    pub fn find_outline(&self, gray: &GrayImage) -> Option<Quad> {
        let (width, height) = gray.dimensions();
        if width < 8 || height < 8 {
            return None;
        }

        let blurred = gaussian_blur_f32(gray, self.settings.blur_sigma);
        let edges = canny(&blurred, self.settings.canny_low, self.settings.canny_high);
        // Close small gaps so the outline forms one contour
        let edges = dilate(&edges, Norm::LInf, 2);

        let image_area = f64::from(width) * f64::from(height);
        let mut best: Option<(f64, Quad)> = None;

        for contour in find_contours::<i32>(&edges) {
            if contour.border_type != BorderType::Outer || contour.points.len() < 4 {
                continue;
            }

            let hull = convex_hull(contour.points.as_slice());
            if hull.len() < 4 {
                continue;
            }
            let perimeter = arc_length(&hull, true);
            if perimeter <= 0.0 {
                continue;
            }
            // Closed approximation wraps around on its own
            let approx = approximate_polygon_dp(&hull, perimeter * self.settings.approx_epsilon, true);
            if approx.len() != 4 {
                continue;
            }

            let quad = order_corners(to_quad(&approx));
            let area = quad_area(&quad);
            if area < image_area * self.settings.min_area_ratio {
                continue;
            }
            let aspect = aspect_ratio(&quad);
            if aspect < self.settings.min_aspect || aspect > self.settings.max_aspect {
                debug!("Rejected outline with aspect ratio {:.2}", aspect);
                continue;
            }

            if best.map_or(true, |(best_area, _)| area > best_area) {
                best = Some((area, quad));
            }
        }

        best.map(|(_, quad)| quad)
    }

    /// Warp the region inside `quad` onto the canonical frame
    pub fn warp(&self, image: &RgbImage, quad: &Quad) -> Option<RgbImage> {
        let w = self.target_width as f32;
        let h = self.target_height as f32;
        let projection =
            Projection::from_control_points(*quad, [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])?;

        let mut out = RgbImage::new(self.target_width, self.target_height);
        warp_into(image, &projection, Interpolation::Bilinear, Rgb([255, 255, 255]), &mut out);
        Some(out)
    }
}

impl GeometryCorrector for DocumentDetector {
    fn correct(&self, image: &DynamicImage) -> Result<RgbImage, ExtractionError> {
        let start = Instant::now();
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let longest = width.max(height) as f32;
        let scale = (self.settings.working_size as f32 / longest).min(1.0);
        let gray = imageops::grayscale(&rgb);
        let working = if scale < 1.0 {
            let w = ((width as f32 * scale).round() as u32).max(1);
            let h = ((height as f32 * scale).round() as u32).max(1);
            imageops::resize(&gray, w, h, FilterType::Triangle)
        } else {
            gray
        };

        let quad = self.find_outline(&working).ok_or_else(|| {
            ExtractionError::DetectionFailed("no document outline found".to_string())
        })?;
        let quad = quad.map(|(x, y)| (x / scale, y / scale));

        let corrected = self
            .warp(&rgb, &quad)
            .ok_or_else(|| ExtractionError::DetectionFailed("degenerate outline".to_string()))?;

        debug!(
            "Document detected in {:?}: corners {:?}",
            start.elapsed(),
            quad
        );
        Ok(corrected)
    }
}

fn to_quad(points: &[Point<i32>]) -> Quad {
    let p = |i: usize| (points[i].x as f32, points[i].y as f32);
    [p(0), p(1), p(2), p(3)]
}

/// Order corners clockwise starting at top-left, with the long side on top
pub fn order_corners(quad: Quad) -> Quad {
    let cx = quad.iter().map(|p| p.0).sum::<f32>() / 4.0;
    let cy = quad.iter().map(|p| p.1).sum::<f32>() / 4.0;

    // Image y grows downwards, so ascending angle runs clockwise on screen
    let mut sorted = quad;
    sorted.sort_by(|a, b| {
        let ta = (a.1 - cy).atan2(a.0 - cx);
        let tb = (b.1 - cy).atan2(b.0 - cx);
        ta.total_cmp(&tb)
    });

    let start = (0..4)
        .min_by(|&a, &b| {
            let sa = sorted[a].0 + sorted[a].1;
            let sb = sorted[b].0 + sorted[b].1;
            sa.total_cmp(&sb)
        })
        .unwrap_or(0);
    let mut ordered = [sorted[start], sorted[(start + 1) % 4], sorted[(start + 2) % 4], sorted[(start + 3) % 4]];

    // Portrait outline: treat the left edge as the top
    let top = distance(ordered[0], ordered[1]) + distance(ordered[3], ordered[2]);
    let side = distance(ordered[0], ordered[3]) + distance(ordered[1], ordered[2]);
    if side > top {
        ordered = [ordered[3], ordered[0], ordered[1], ordered[2]];
    }

    ordered
}

/// Shoelace area
fn quad_area(quad: &Quad) -> f64 {
    let mut twice = 0.0f64;
    for i in 0..4 {
        let (x1, y1) = quad[i];
        let (x2, y2) = quad[(i + 1) % 4];
        twice += f64::from(x1) * f64::from(y2) - f64::from(x2) * f64::from(y1);
    }
    twice.abs() / 2.0
}

/// Long side over short side, averaged over opposite edges
fn aspect_ratio(quad: &Quad) -> f64 {
    let horizontal = (distance(quad[0], quad[1]) + distance(quad[3], quad[2])) / 2.0;
    let vertical = (distance(quad[0], quad[3]) + distance(quad[1], quad[2])) / 2.0;
    let (long, short) = if horizontal >= vertical {
        (horizontal, vertical)
    } else {
        (vertical, horizontal)
    };
    if short <= f32::EPSILON {
        return f64::INFINITY;
    }
    f64::from(long / short)
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
