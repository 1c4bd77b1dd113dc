//! Core types and utilities for the TRAXE depth tracker.
//!
//! This crate is intentionally small. It owns the metric depth frame and
//! binary mask types, the `FrameSource` acquisition abstraction, and the
//! projective geometry used by calibration. It does *not* depend on any
//! concrete depth device or image processing library.

mod depth;
mod homography;
mod logger;
mod source;

pub use depth::{DepthFrame, DepthView, Mask, PixelPoint};
pub use homography::{estimate_homography, Homography};
pub use source::{warm_up, AcquisitionError, FrameSource, ReplaySource};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level};
