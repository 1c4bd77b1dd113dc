use log::{info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use traxe_core::{estimate_homography, Homography, PixelPoint};

use crate::{CalibrationTargets, CoordinateMapper, TargetRegion};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One of the five calibration positions, in capture order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStep {
    TopLeft,
    BottomLeft,
    BottomRight,
    TopRight,
    Center,
}

impl CalibrationStep {
    pub const ALL: [CalibrationStep; 5] = [
        CalibrationStep::TopLeft,
        CalibrationStep::BottomLeft,
        CalibrationStep::BottomRight,
        CalibrationStep::TopRight,
        CalibrationStep::Center,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The step after this one, or `None` after the center.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            CalibrationStep::TopLeft => "Top Left",
            CalibrationStep::BottomLeft => "Bottom Left",
            CalibrationStep::BottomRight => "Bottom Right",
            CalibrationStep::TopRight => "Top Right",
            CalibrationStep::Center => "Centre",
        }
    }
}

/// A confirmed sensor-to-target correspondence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub step: CalibrationStep,
    pub sensor: PixelPoint,
    pub target: Point2<f32>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("no detection for step {}; place the object and retry", .step.label())]
    NoDetection { step: CalibrationStep },
    #[error("calibration points are degenerate; reset and capture all five again")]
    Degenerate,
    #[error("already calibrated; reset to recalibrate")]
    AlreadyCalibrated,
    #[error("last calibration failed; reset before capturing again")]
    ResetRequired,
}

/// Calibration progress.
///
/// `reset` is the only way back from `Calibrated` or `Degenerate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationState {
    AwaitingStep(CalibrationStep),
    Calibrated(Homography),
    Degenerate,
}

/// Result of a successful `capture_step`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureOutcome {
    /// Sample stored; the operator should move on to this step.
    Next(CalibrationStep),
    /// Fifth sample stored and the homography fitted.
    Calibrated(Homography),
}

#[derive(Clone, Debug)]
pub struct CalibrationEngine {
    targets: CalibrationTargets,
    samples: Vec<CalibrationSample>,
    state: CalibrationState,
}

impl CalibrationEngine {
    pub fn new(targets: CalibrationTargets) -> Self {
        Self {
            targets,
            samples: Vec::with_capacity(CalibrationStep::ALL.len()),
            state: CalibrationState::AwaitingStep(CalibrationStep::TopLeft),
        }
    }

    pub fn for_region(region: &TargetRegion) -> Self {
        Self::new(region.calibration_targets())
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated(_))
    }

    /// Step awaiting confirmation, if calibration is in progress.
    pub fn current_step(&self) -> Option<CalibrationStep> {
        match self.state {
            CalibrationState::AwaitingStep(step) => Some(step),
            _ => None,
        }
    }

    pub fn homography(&self) -> Option<&Homography> {
        match &self.state {
            CalibrationState::Calibrated(h) => Some(h),
            _ => None,
        }
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn targets(&self) -> &CalibrationTargets {
        &self.targets
    }

    /// Mapper bound to the current homography (uncalibrated maps to nothing).
    pub fn mapper<'a>(&'a self, region: &'a TargetRegion) -> CoordinateMapper<'a> {
        CoordinateMapper::new(self.homography(), region)
    }

    /// Record the current centroid for the awaited step.
    ///
    /// The instantaneous centroid is accepted; it does not have to be settled.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn capture_step(
        &mut self,
        centroid: Option<PixelPoint>,
    ) -> Result<CaptureOutcome, CalibrationError> {
        let step = match self.state {
            CalibrationState::AwaitingStep(step) => step,
            CalibrationState::Calibrated(_) => return Err(CalibrationError::AlreadyCalibrated),
            CalibrationState::Degenerate => return Err(CalibrationError::ResetRequired),
        };
        let sensor = centroid.ok_or(CalibrationError::NoDetection { step })?;

        let target = self.targets.point(step);
        self.samples.push(CalibrationSample {
            step,
            sensor,
            target,
        });
        info!(
            "captured {}: sensor=({}, {}) -> target=({:.0}, {:.0})",
            step.label(),
            sensor.x,
            sensor.y,
            target.x,
            target.y
        );

        if let Some(next) = step.next() {
            self.state = CalibrationState::AwaitingStep(next);
            info!("next calibration step: {}", next.label());
            return Ok(CaptureOutcome::Next(next));
        }

        match self.fit() {
            Some(h) => {
                self.state = CalibrationState::Calibrated(h);
                info!("homography computed: {:?}", h.to_array());
                Ok(CaptureOutcome::Calibrated(h))
            }
            None => {
                self.state = CalibrationState::Degenerate;
                warn!("homography fit failed on degenerate calibration points");
                Err(CalibrationError::Degenerate)
            }
        }
    }

    /// Drop all samples and any fitted transform.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.state = CalibrationState::AwaitingStep(CalibrationStep::TopLeft);
        info!("calibration reset");
    }

    fn fit(&self) -> Option<Homography> {
        let src: Vec<Point2<f32>> = self
            .samples
            .iter()
            .map(|s| Point2::new(s.sensor.x as f32, s.sensor.y as f32))
            .collect();
        let dst: Vec<Point2<f32>> = self.samples.iter().map(|s| s.target).collect();
        estimate_homography(&src, &dst)
    }
}
