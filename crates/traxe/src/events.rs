//! Hit/miss events and their time-bounded display collection.

use std::{collections::VecDeque, time::Duration};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use traxe_calib::CoordinateMapper;
use traxe_core::PixelPoint;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Hit,
    Miss,
}

/// A settled impact mapped onto the target plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Target-plane position in pixels.
    pub position: Point2<f32>,
    /// Position within the target square, `0..=1` when inside.
    pub normalized: Point2<f32>,
    /// Sensor centroid the event was mapped from.
    pub sensor: PixelPoint,
    /// Capture time of the triggering frame, since the UNIX epoch.
    pub timestamp: Duration,
    pub lane_id: String,
}

impl Event {
    /// Map a settled centroid and classify it against the target square.
    ///
    /// The mapped point is truncated toward zero to whole target-plane pixels
    /// before the containment test. Returns `None` when the mapper is
    /// uncalibrated or the point maps to infinity.
    pub fn classify(
        mapper: &CoordinateMapper<'_>,
        sensor: PixelPoint,
        timestamp: Duration,
        lane_id: &str,
    ) -> Option<Self> {
        let position = mapper.to_target_plane(sensor)?.map(f32::trunc);
        let kind = if mapper.is_inside_target(position) {
            EventKind::Hit
        } else {
            EventKind::Miss
        };
        Some(Self {
            kind,
            position,
            normalized: mapper.region().normalize(position),
            sensor,
            timestamp,
            lane_id: lane_id.to_string(),
        })
    }

    pub fn is_hit(&self) -> bool {
        self.kind == EventKind::Hit
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp.as_millis() as u64
    }
}

/// Recent events kept for display, oldest first.
///
/// Events expire `lifetime` after their timestamp; at most `max_events`
/// are retained, oldest dropped first.
#[derive(Clone, Debug)]
pub struct EventLog {
    events: VecDeque<Event>,
    lifetime: Duration,
    miss_flash: Duration,
    max_events: usize,
    last_miss: Option<Duration>,
}

impl EventLog {
    pub fn new(lifetime: Duration, miss_flash: Duration, max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            lifetime,
            miss_flash,
            max_events: max_events.max(1),
            last_miss: None,
        }
    }

    pub fn record(&mut self, event: Event) {
        if event.kind == EventKind::Miss {
            self.last_miss = Some(event.timestamp);
        }
        while self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Keep only events younger than the lifetime as seen at `now`.
    pub fn prune(&mut self, now: Duration) {
        let lifetime = self.lifetime;
        self.events
            .retain(|e| now.saturating_sub(e.timestamp) < lifetime);
    }

    /// Unexpired events paired with their age at `now`.
    pub fn active(&self, now: Duration) -> impl Iterator<Item = (&Event, Duration)> + '_ {
        let lifetime = self.lifetime;
        self.events.iter().filter_map(move |e| {
            let age = now.saturating_sub(e.timestamp);
            (age < lifetime).then_some((e, age))
        })
    }

    /// Whether a miss happened within the flash window before `now`.
    pub fn miss_flash_active(&self, now: Duration) -> bool {
        self.last_miss
            .is_some_and(|t| now.saturating_sub(t) < self.miss_flash)
    }

    pub fn latest(&self) -> Option<&Event> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.last_miss = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;
    use traxe_calib::{DisplayGeometry, TargetRegion};
    use traxe_core::Homography;

    fn event(kind: EventKind, t_ms: u64) -> Event {
        Event {
            kind,
            position: Point2::new(0.0, 0.0),
            normalized: Point2::new(0.0, 0.0),
            sensor: PixelPoint::new(0, 0),
            timestamp: Duration::from_millis(t_ms),
            lane_id: "lane1".into(),
        }
    }

    fn log() -> EventLog {
        EventLog::new(Duration::from_secs(3), Duration::from_millis(600), 4)
    }

    #[test]
    fn events_expire_after_lifetime() {
        let mut log = log();
        log.record(event(EventKind::Hit, 1_000));
        log.record(event(EventKind::Hit, 2_500));
        log.prune(Duration::from_millis(3_999));
        assert_eq!(log.len(), 2);
        // an event exactly one lifetime old is gone
        log.prune(Duration::from_millis(4_000));
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().map(|e| e.timestamp_ms()), Some(2_500));
    }

    #[test]
    fn active_reports_age() {
        let mut log = log();
        log.record(event(EventKind::Hit, 1_000));
        let ages: Vec<_> = log
            .active(Duration::from_millis(1_750))
            .map(|(_, age)| age)
            .collect();
        assert_eq!(ages, vec![Duration::from_millis(750)]);
        assert_eq!(log.active(Duration::from_millis(3_999)).count(), 1);
        assert_eq!(log.active(Duration::from_millis(4_000)).count(), 0);
    }

    #[test]
    fn collection_is_bounded() {
        let mut log = log();
        for i in 0..10 {
            log.record(event(EventKind::Hit, i * 10));
        }
        assert_eq!(log.len(), 4);
        assert_eq!(log.active(Duration::from_millis(100)).next().map(|(e, _)| e.timestamp_ms()), Some(60));
    }

    #[test]
    fn miss_flash_window() {
        let mut log = log();
        assert!(!log.miss_flash_active(Duration::from_secs(1)));
        log.record(event(EventKind::Miss, 1_000));
        assert!(log.miss_flash_active(Duration::from_millis(1_500)));
        assert!(!log.miss_flash_active(Duration::from_millis(1_600)));
        log.clear();
        assert!(!log.miss_flash_active(Duration::from_millis(1_100)));
    }

    #[test]
    fn classify_hit_and_miss() {
        let region = TargetRegion::from_geometry(&DisplayGeometry::default(), 0.75);
        let h = Homography::new(Matrix3::new(
            3.0, 0.0, 0.0, //
            0.0, 2.25, 0.0, //
            0.0, 0.0, 1.0,
        ));
        let mapper = CoordinateMapper::new(Some(&h), &region);

        let hit = Event::classify(&mapper, PixelPoint::new(320, 240), Duration::ZERO, "lane1")
            .expect("mapped");
        assert_eq!(hit.kind, EventKind::Hit);
        assert_eq!(hit.normalized, Point2::new(0.5, 0.5));

        let miss = Event::classify(&mapper, PixelPoint::new(10, 10), Duration::ZERO, "lane1")
            .expect("mapped");
        assert_eq!(miss.kind, EventKind::Miss);

        let uncalibrated = CoordinateMapper::new(None, &region);
        assert!(Event::classify(&uncalibrated, PixelPoint::new(1, 1), Duration::ZERO, "l").is_none());
    }

    #[test]
    fn fractional_overshoot_of_right_edge_is_a_hit() {
        // square spans x 555..=1365; shift every point half a pixel right
        let region = TargetRegion::from_geometry(&DisplayGeometry::default(), 0.75);
        let h = Homography::new(Matrix3::new(
            1.0, 0.0, 0.5, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ));
        let mapper = CoordinateMapper::new(Some(&h), &region);

        let edge = Event::classify(&mapper, PixelPoint::new(1365, 540), Duration::ZERO, "lane1")
            .expect("mapped");
        assert_eq!(edge.position, Point2::new(1365.0, 540.0));
        assert_eq!(edge.kind, EventKind::Hit);
        assert_eq!(edge.normalized.x, 1.0);

        let past = Event::classify(&mapper, PixelPoint::new(1366, 540), Duration::ZERO, "lane1")
            .expect("mapped");
        assert_eq!(past.position.x, 1366.0);
        assert_eq!(past.kind, EventKind::Miss);
    }
}
