use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::CalibrationStep;

/// Target-plane (projector / display) bounds in pixels.
///
/// `x`, `y` locate the display on the host desktop and only matter to a
/// renderer; all target-plane coordinates are relative to the display origin.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }
}

/// The five target-plane points the operator calibrates against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTargets {
    pub top_left: Point2<f32>,
    pub bottom_left: Point2<f32>,
    pub bottom_right: Point2<f32>,
    pub top_right: Point2<f32>,
    pub center: Point2<f32>,
}

impl CalibrationTargets {
    pub fn point(&self, step: CalibrationStep) -> Point2<f32> {
        match step {
            CalibrationStep::TopLeft => self.top_left,
            CalibrationStep::BottomLeft => self.bottom_left,
            CalibrationStep::BottomRight => self.bottom_right,
            CalibrationStep::TopRight => self.top_right,
            CalibrationStep::Center => self.center,
        }
    }
}

/// Square target centered on the display.
///
/// The polygon is stored as `[TL, BL, BR, TR]`; it is immutable for a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetRegion {
    polygon: [Point2<f32>; 4],
    center: Point2<f32>,
    side: f32,
}

impl TargetRegion {
    /// Derive the target square from display bounds.
    ///
    /// The side is `floor(min(width, height) * size_ratio)`; corners sit at
    /// integer pixels `center ± side / 2` (integer division).
    pub fn from_geometry(geometry: &DisplayGeometry, size_ratio: f32) -> Self {
        let side = (geometry.width.min(geometry.height) as f32 * size_ratio).floor() as i32;
        let cx = (geometry.width / 2) as i32;
        let cy = (geometry.height / 2) as i32;
        let half = side / 2;

        let p = |x: i32, y: i32| Point2::new(x as f32, y as f32);
        Self {
            polygon: [
                p(cx - half, cy - half),
                p(cx - half, cy + half),
                p(cx + half, cy + half),
                p(cx + half, cy - half),
            ],
            center: p(cx, cy),
            side: (2 * half) as f32,
        }
    }

    pub fn polygon(&self) -> &[Point2<f32>; 4] {
        &self.polygon
    }

    pub fn center(&self) -> Point2<f32> {
        self.center
    }

    /// Side length in target-plane pixels.
    pub fn side(&self) -> f32 {
        self.side
    }

    pub fn calibration_targets(&self) -> CalibrationTargets {
        let [tl, bl, br, tr] = self.polygon;
        CalibrationTargets {
            top_left: tl,
            bottom_left: bl,
            bottom_right: br,
            top_right: tr,
            center: self.center,
        }
    }

    /// Point-in-polygon test; points on the boundary count as inside.
    pub fn contains(&self, p: Point2<f32>) -> bool {
        point_in_polygon(&self.polygon, p)
    }

    /// Position within the square scaled to `0..=1` from the top-left corner.
    ///
    /// Values outside `0..=1` mean the point lies outside the square.
    pub fn normalize(&self, p: Point2<f32>) -> Point2<f32> {
        let tl = self.polygon[0];
        if self.side <= 0.0 {
            return Point2::new(0.0, 0.0);
        }
        Point2::new((p.x - tl.x) / self.side, (p.y - tl.y) / self.side)
    }
}

/// Even-odd ray casting with an explicit boundary check.
fn point_in_polygon(poly: &[Point2<f32>], p: Point2<f32>) -> bool {
    const EDGE_EPS: f32 = 1e-3;
    let n = poly.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (poly[j], poly[i]);
        if on_segment(a, b, p, EDGE_EPS) {
            return true;
        }
        if (b.y > p.y) != (a.y > p.y) {
            let x_cross = b.x + (p.y - b.y) * (a.x - b.x) / (a.y - b.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point2<f32>, b: Point2<f32>, p: Point2<f32>, eps: f32) -> bool {
    let ab = b - a;
    let ap = p - a;
    let len = ab.norm();
    if len <= f32::EPSILON {
        return ap.norm() <= eps;
    }
    let cross = ab.x * ap.y - ab.y * ap.x;
    if (cross / len).abs() > eps {
        return false;
    }
    let t = ab.dot(&ap) / (len * len);
    (-eps / len..=1.0 + eps / len).contains(&t)
}
