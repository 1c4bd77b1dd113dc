use nalgebra::Point2;
use traxe_core::{Homography, PixelPoint};

use crate::TargetRegion;

/// Sensor-to-target-plane mapping bound to one calibration.
///
/// Holds only borrowed, read-only state; it is rebuilt for every cycle.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper<'a> {
    homography: Option<&'a Homography>,
    region: &'a TargetRegion,
}

impl<'a> CoordinateMapper<'a> {
    pub fn new(homography: Option<&'a Homography>, region: &'a TargetRegion) -> Self {
        Self { homography, region }
    }

    pub fn is_calibrated(&self) -> bool {
        self.homography.is_some()
    }

    pub fn region(&self) -> &'a TargetRegion {
        self.region
    }

    /// Map a sensor pixel into target-plane pixels; `None` when uncalibrated.
    pub fn to_target_plane(&self, sensor: PixelPoint) -> Option<Point2<f32>> {
        let h = self.homography?;
        h.try_apply(Point2::new(sensor.x as f32, sensor.y as f32))
    }

    /// Boundary points count as inside.
    pub fn is_inside_target(&self, p: Point2<f32>) -> bool {
        self.region.contains(p)
    }
}
