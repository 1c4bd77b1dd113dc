//! Depth foreground segmentation for the TRAXE tracker.
//!
//! Pipeline, per frame:
//! 1. Compare the live frame against a temporal-median background model.
//! 2. Keep pixels inside the sensor range that are at least `depth_delta_m`
//!    nearer than the background.
//! 3. Median-filter and morphologically open the mask to drop speckle.
//! 4. Trace external contours, keep the largest one above `min_area_px`
//!    and report its moment centroid.
//!
//! Only one foreground candidate per frame is ever reported.

mod background;
mod centroid;
mod foreground;
mod params;

pub use background::BackgroundModel;
pub use centroid::{contour_moments, extract_centroid, Blob, Moments};
pub use foreground::{segment, SegmentError};
pub use params::{Roi, SegmentParams};
