//! JSON configuration for a tracker lane.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use traxe_calib::{DisplayGeometry, TargetRegion};
use traxe_segment::SegmentParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Every tunable of one tracker lane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Lane identifier attached to every emitted event.
    pub lane_id: String,
    /// Foreground segmentation thresholds and filters.
    pub segment: SegmentParams,
    /// Smallest region area (px²) treated as the tracked object.
    pub min_area_px: f64,
    /// Maximum centroid drift (px) still considered "not moving".
    pub motion_tolerance_px: f32,
    /// How long the centroid must stay put before it counts as settled.
    pub dwell_seconds: f32,
    /// How long emitted events stay in the display collection.
    pub event_lifetime_seconds: f32,
    /// How long a miss keeps the miss indicator lit.
    pub miss_flash_seconds: f32,
    /// Length of the background capture burst.
    pub background_seconds: f32,
    /// Frames discarded at startup before any frame is trusted.
    pub warmup_frames: usize,
    /// Upper bound on retained events.
    pub max_events: usize,
    /// Capacity of the queue between the detection loop and the sinks.
    pub queue_capacity: usize,
    /// Target-plane (projector) bounds.
    pub display: DisplayGeometry,
    /// Target square side relative to the smaller display dimension.
    pub target_size_ratio: f32,
    /// Meters per raw depth unit (z16 millimeters -> 0.001).
    pub depth_scale: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            lane_id: "lane1".to_string(),
            segment: SegmentParams::default(),
            min_area_px: 300.0,
            motion_tolerance_px: 8.0,
            dwell_seconds: 0.5,
            event_lifetime_seconds: 3.0,
            miss_flash_seconds: 0.6,
            background_seconds: 1.0,
            warmup_frames: 30,
            max_events: 64,
            queue_capacity: 64,
            display: DisplayGeometry::default(),
            target_size_ratio: 0.75,
            depth_scale: 0.001,
        }
    }
}

impl TrackerConfig {
    /// Load a JSON config from disk and validate it.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let seg = &self.segment;
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.lane_id.trim().is_empty() {
            return invalid("lane_id must not be empty".into());
        }
        if !(seg.min_depth_m > 0.0 && seg.min_depth_m < seg.max_depth_m) {
            return invalid(format!(
                "need 0 < min_depth_m < max_depth_m, got {} and {}",
                seg.min_depth_m, seg.max_depth_m
            ));
        }
        for (name, value) in [
            ("depth_delta_m", seg.depth_delta_m),
            ("motion_tolerance_px", self.motion_tolerance_px),
            ("dwell_seconds", self.dwell_seconds),
            ("event_lifetime_seconds", self.event_lifetime_seconds),
            ("background_seconds", self.background_seconds),
            ("depth_scale", self.depth_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        if !(self.miss_flash_seconds.is_finite() && self.miss_flash_seconds >= 0.0) {
            return invalid(format!(
                "miss_flash_seconds must be non-negative, got {}",
                self.miss_flash_seconds
            ));
        }
        for (name, secs) in [
            ("dwell_seconds", self.dwell_seconds),
            ("event_lifetime_seconds", self.event_lifetime_seconds),
            ("miss_flash_seconds", self.miss_flash_seconds),
            ("background_seconds", self.background_seconds),
        ] {
            if Duration::try_from_secs_f32(secs).is_err() {
                return invalid(format!("{name} is out of range, got {secs}"));
            }
        }
        if !(self.min_area_px.is_finite() && self.min_area_px > 0.0) {
            return invalid(format!("min_area_px must be positive, got {}", self.min_area_px));
        }
        for (name, k) in [
            ("median_kernel", seg.median_kernel),
            ("open_kernel", seg.open_kernel),
        ] {
            if k == 0 || k % 2 == 0 {
                return invalid(format!("{name} must be odd, got {k}"));
            }
        }
        if seg.open_kernel / 2 > u8::MAX as u32 {
            return invalid(format!("open_kernel {} is too large", seg.open_kernel));
        }
        if let Some(roi) = &seg.roi {
            if roi.width == 0 || roi.height == 0 {
                return invalid("roi must have a non-zero size".into());
            }
        }
        if self.max_events == 0 || self.queue_capacity == 0 {
            return invalid("max_events and queue_capacity must be at least 1".into());
        }
        if self.display.width == 0 || self.display.height == 0 {
            return invalid("display must have a non-zero size".into());
        }
        if !(self.target_size_ratio > 0.0 && self.target_size_ratio <= 1.0) {
            return invalid(format!(
                "target_size_ratio must be in (0, 1], got {}",
                self.target_size_ratio
            ));
        }
        Ok(())
    }

    pub fn dwell(&self) -> Duration {
        seconds(self.dwell_seconds)
    }

    pub fn event_lifetime(&self) -> Duration {
        seconds(self.event_lifetime_seconds)
    }

    pub fn miss_flash(&self) -> Duration {
        seconds(self.miss_flash_seconds)
    }

    pub fn background_duration(&self) -> Duration {
        seconds(self.background_seconds)
    }

    pub fn target_region(&self) -> TargetRegion {
        TargetRegion::from_geometry(&self.display, self.target_size_ratio)
    }
}

/// Negative and NaN become zero; overflow saturates.
fn seconds(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or(Duration::MAX)
}
