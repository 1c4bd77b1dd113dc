//! High-level facade for the TRAXE depth tracker.
//!
//! A depth camera looks at a physical target. The tracker learns the empty
//! scene, segments anything nearer than it, follows the largest foreground
//! region and, once that region stops moving, maps its centroid onto the
//! projected target through a five-point calibration. Each settled impact is
//! classified as a hit or a miss and handed to event sinks off the detection
//! thread.
//!
//! ## Quickstart
//!
//! ```no_run
//! use traxe::{CollectSink, EventSink, Tracker, TrackerConfig};
//! use traxe::core::ReplaySource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ReplaySource::new(Vec::new());
//! let sinks: Vec<Box<dyn EventSink>> = vec![Box::new(CollectSink::new())];
//! let tracker = Tracker::start(source, TrackerConfig::default(), sinks)?;
//! let summary = tracker.run();
//! println!("{} hits", summary.session.hits);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `traxe::core`: depth frames, masks, frame sources, homography.
//! - `traxe::segment`: background model, foreground mask, centroid.
//! - `traxe::calib`: five-point calibration, target square, mapper.
//! - [`StabilityDebouncer`], [`DetectorSession`], [`Tracker`]: the pipeline.
//! - [`EventSink`], [`EventDispatcher`]: event delivery.
//! - [`PngSequenceSource`] (feature `image`): replay recorded depth PNGs.

pub use traxe_calib as calib;
pub use traxe_core as core;
pub use traxe_segment as segment;

mod config;
mod debounce;
mod events;
mod session;
mod sink;
mod tracker;
pub mod wire;

#[cfg(feature = "image")]
mod png_source;

pub use config::{ConfigError, TrackerConfig};
pub use debounce::{DebounceState, StabilityDebouncer};
pub use events::{Event, EventKind, EventLog};
pub use session::{CycleReport, DetectorSession, SessionStats};
pub use sink::{
    CollectSink, DeliveryStats, EventDispatcher, EventSink, JsonLinesSink, SinkError,
};
pub use tracker::{Command, RunSummary, Tracker, TrackerError};

#[cfg(feature = "image")]
pub use png_source::PngSequenceSource;

pub use traxe_calib::{CalibrationError, CalibrationStep, CaptureOutcome, TargetRegion};
pub use traxe_core::{AcquisitionError, DepthFrame, FrameSource, PixelPoint};
