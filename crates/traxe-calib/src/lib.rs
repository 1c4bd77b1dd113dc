//! Sensor-to-target-plane calibration for the TRAXE tracker.
//!
//! The operator places the object at five known target-plane positions in a
//! fixed order (four corners of the target square, then its center) and
//! confirms each one. After the fifth sample a least-squares homography maps
//! sensor pixels to target-plane pixels, and `CoordinateMapper` classifies
//! mapped points against the target square.

mod calibration;
mod mapper;
mod target;

pub use calibration::{
    CalibrationEngine, CalibrationError, CalibrationSample, CalibrationState, CalibrationStep,
    CaptureOutcome,
};
pub use mapper::CoordinateMapper;
pub use target::{CalibrationTargets, DisplayGeometry, TargetRegion};
