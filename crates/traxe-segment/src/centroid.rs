use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use log::trace;
use serde::{Deserialize, Serialize};
use traxe_core::{Mask, PixelPoint};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Area-weighted spatial moments of a closed contour polygon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// `(M10/M00, M01/M00)`, or `None` for a zero-area polygon.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() < f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// The selected foreground region of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub centroid: PixelPoint,
    /// Polygon area enclosed by the outer contour, in square pixels.
    pub area_px: f64,
}

/// Polygon moments via Green's theorem over the contour vertices.
///
/// The result does not depend on the traversal direction.
pub fn contour_moments(points: &[Point<i32>]) -> Moments {
    let n = points.len();
    if n < 3 {
        return Moments::default();
    }

    let (mut a00, mut a10, mut a01) = (0.0f64, 0.0f64, 0.0f64);
    let mut prev = points[n - 1];
    for &cur in points {
        let (xi, yi) = (prev.x as f64, prev.y as f64);
        let (xj, yj) = (cur.x as f64, cur.y as f64);
        let cross = xi * yj - xj * yi;
        a00 += cross;
        a10 += cross * (xi + xj);
        a01 += cross * (yi + yj);
        prev = cur;
    }

    let sign = if a00 < 0.0 { -1.0 } else { 1.0 };
    Moments {
        m00: sign * a00 / 2.0,
        m10: sign * a10 / 6.0,
        m01: sign * a01 / 6.0,
    }
}

/// Pick the largest external region of `mask` and return its centroid.
///
/// Regions are compared by the area of their outer contour polygon; the
/// largest one wins even if a smaller one would pass, and it is rejected
/// outright when its area is below `min_area_px`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(mask), fields(width = mask.width, height = mask.height))
)]
pub fn extract_centroid(mask: &Mask, min_area_px: f64) -> Option<Blob> {
    if mask.is_empty() {
        return None;
    }
    let img = GrayImage::from_raw(mask.width as u32, mask.height as u32, mask.data.clone())?;

    let mut best: Option<Moments> = None;
    for contour in find_contours::<i32>(&img) {
        if matches!(contour.border_type, BorderType::Hole) || contour.parent.is_some() {
            continue;
        }
        let m = contour_moments(&contour.points);
        if best.map_or(true, |b| m.m00 > b.m00) {
            best = Some(m);
        }
    }

    let best = best?;
    if best.m00 < min_area_px {
        trace!("largest region {:.1}px² below minimum {min_area_px}", best.m00);
        return None;
    }
    let (cx, cy) = best.centroid()?;
    // whole pixels, truncated toward zero
    Some(Blob {
        centroid: PixelPoint::new(cx as i32, cy as i32),
        area_px: best.m00,
    })
}
