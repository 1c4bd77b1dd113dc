//! JSON message shape consumed by the game server.
//!
//! ```json
//! {"type":"rawHit","laneId":"lane1","x":0.5,"y":0.5,"t":1700000000000,
//!  "meta":{"source":"realsense","confidence":1.0}}
//! ```
//!
//! Misses use `"type":"rawMiss"` and carry `"miss":true` in `meta`.

use serde::{Deserialize, Serialize};

use crate::{Event, EventKind};

pub const EVENT_SOURCE: &str = "realsense";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WireKind {
    #[serde(rename = "rawHit")]
    RawHit,
    #[serde(rename = "rawMiss")]
    RawMiss,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMeta {
    pub source: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miss: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: WireKind,
    pub lane_id: String,
    /// Normalized position within the target square.
    pub x: f64,
    pub y: f64,
    /// Milliseconds since the UNIX epoch.
    pub t: u64,
    pub meta: WireMeta,
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        let miss = event.kind == EventKind::Miss;
        Self {
            kind: if miss {
                WireKind::RawMiss
            } else {
                WireKind::RawHit
            },
            lane_id: event.lane_id.clone(),
            x: event.normalized.x as f64,
            y: event.normalized.y as f64,
            t: event.timestamp_ms(),
            meta: WireMeta {
                source: EVENT_SOURCE.to_string(),
                confidence: 1.0,
                miss: miss.then_some(true),
            },
        }
    }
}
