//! Per-lane detection state and the per-frame pipeline.

use std::time::Duration;

use log::{debug, info, warn};
use traxe_calib::{CalibrationEngine, CalibrationError, CaptureOutcome, TargetRegion};
use traxe_core::{AcquisitionError, DepthFrame, FrameSource, PixelPoint};
use traxe_segment::{extract_centroid, segment, BackgroundModel, Blob};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    debounce::{DebounceState, StabilityDebouncer},
    sink::{DeliveryStats, EventDispatcher},
    Event, EventLog, TrackerConfig,
};

/// What one processing cycle observed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub timestamp: Duration,
    pub blob: Option<Blob>,
    /// The debouncer fired on this cycle.
    pub settled: bool,
    /// Event emitted on this cycle, if the session is calibrated.
    pub event: Option<Event>,
}

/// Running counters for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub detections: u64,
    pub settles: u64,
    pub hits: u64,
    pub misses: u64,
    pub segment_errors: u64,
}

/// All mutable state of one tracker lane.
///
/// Owns the background, the debouncer, calibration, and the display event
/// log. Events are forwarded to the dispatcher when one is attached.
pub struct DetectorSession {
    config: TrackerConfig,
    background: BackgroundModel,
    region: TargetRegion,
    calibration: CalibrationEngine,
    debouncer: StabilityDebouncer,
    events: EventLog,
    dispatcher: Option<EventDispatcher>,
    last_centroid: Option<PixelPoint>,
    stats: SessionStats,
}

impl DetectorSession {
    pub fn new(config: TrackerConfig, background: BackgroundModel) -> Self {
        let region = config.target_region();
        Self {
            calibration: CalibrationEngine::for_region(&region),
            debouncer: StabilityDebouncer::new(config.motion_tolerance_px, config.dwell()),
            events: EventLog::new(
                config.event_lifetime(),
                config.miss_flash(),
                config.max_events,
            ),
            region,
            background,
            config,
            dispatcher: None,
            last_centroid: None,
            stats: SessionStats::default(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn region(&self) -> &TargetRegion {
        &self.region
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn debounce_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    /// Centroid seen on the most recent cycle.
    pub fn last_centroid(&self) -> Option<PixelPoint> {
        self.last_centroid
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run segmentation, centroid extraction, settle detection and, when
    /// calibrated, hit/miss classification for one frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(t_ms = frame.timestamp.as_millis() as u64))
    )]
    pub fn process_frame(&mut self, frame: &DepthFrame) -> CycleReport {
        let now = frame.timestamp;
        self.stats.frames += 1;
        self.events.prune(now);

        let blob = match segment(frame, &self.background, &self.config.segment) {
            Ok(mask) => extract_centroid(&mask, self.config.min_area_px),
            Err(err) => {
                self.stats.segment_errors += 1;
                warn!("skipping frame: {err}");
                None
            }
        };
        let centroid = blob.map(|b| b.centroid);
        if centroid.is_some() {
            self.stats.detections += 1;
        }
        self.last_centroid = centroid;

        let settled = self.debouncer.update(centroid, now);
        let event = match (settled, centroid) {
            (true, Some(c)) => {
                self.stats.settles += 1;
                self.emit(c, now)
            }
            _ => None,
        };

        CycleReport {
            timestamp: now,
            blob,
            settled,
            event,
        }
    }

    fn emit(&mut self, centroid: PixelPoint, now: Duration) -> Option<Event> {
        let mapper = self.calibration.mapper(&self.region);
        if !mapper.is_calibrated() {
            debug!(
                "object settled at ({}, {}) while uncalibrated",
                centroid.x, centroid.y
            );
            return None;
        }
        let Some(event) = Event::classify(&mapper, centroid, now, &self.config.lane_id) else {
            debug!(
                "settled centroid ({}, {}) maps to infinity",
                centroid.x, centroid.y
            );
            return None;
        };

        if event.is_hit() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        info!(
            "{:?} at ({:.0}, {:.0}) from sensor ({}, {})",
            event.kind, event.position.x, event.position.y, centroid.x, centroid.y
        );

        self.events.record(event.clone());
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.dispatch(event.clone());
        }
        Some(event)
    }

    /// Record the latest centroid for the awaited calibration step.
    pub fn confirm_calibration(&mut self) -> Result<CaptureOutcome, CalibrationError> {
        let outcome = self.calibration.capture_step(self.last_centroid);
        if let Err(err) = &outcome {
            warn!("calibration: {err}");
        }
        outcome
    }

    /// Forget calibration, debounce progress and displayed events.
    pub fn reset_calibration(&mut self) {
        self.calibration.reset();
        self.debouncer.reset();
        self.events.clear();
    }

    /// Replace the background with a fresh capture from `source`.
    ///
    /// Calibration, debounce state and events are left untouched. On failure
    /// the previous background stays in place.
    pub fn recapture_background<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<(), AcquisitionError> {
        let model = BackgroundModel::capture(source, self.config.background_duration())?;
        self.set_background(model);
        Ok(())
    }

    pub fn set_background(&mut self, model: BackgroundModel) {
        if model.width() != self.background.width() || model.height() != self.background.height()
        {
            warn!(
                "background resolution changed from {}x{} to {}x{}",
                self.background.width(),
                self.background.height(),
                model.width(),
                model.height()
            );
        }
        self.background = model;
    }

    /// Detach and drain the dispatcher, if any.
    pub fn shutdown(&mut self) -> Option<DeliveryStats> {
        self.dispatcher.take().map(EventDispatcher::shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traxe_calib::CalibrationStep;

    const W: usize = 160;
    const H: usize = 120;

    fn config() -> TrackerConfig {
        TrackerConfig {
            min_area_px: 100.0,
            ..TrackerConfig::default()
        }
    }

    fn frame_with_square(center: Option<(usize, usize)>, t_ms: u64) -> DepthFrame {
        let mut f = DepthFrame::filled(W, H, 2.0, Duration::from_millis(t_ms));
        if let Some((cx, cy)) = center {
            for y in cy - 8..=cy + 8 {
                for x in cx - 8..=cx + 8 {
                    f.set(x, y, 1.5);
                }
            }
        }
        f
    }

    fn session() -> DetectorSession {
        DetectorSession::new(config(), BackgroundModel::uniform(W, H, 2.0))
    }

    #[test]
    fn detects_centroid_and_settles_without_event_when_uncalibrated() {
        let mut s = session();
        let mut settled = 0;
        for i in 0..30u64 {
            let r = s.process_frame(&frame_with_square(Some((80, 60)), i * 33));
            let blob = r.blob.expect("blob");
            assert!(blob.centroid.distance(PixelPoint::new(80, 60)) <= 1.0);
            assert!(r.event.is_none());
            settled += r.settled as u32;
        }
        assert_eq!(settled, 1);
        assert_eq!(s.stats().settles, 1);
        assert!(s.events().is_empty());
    }

    #[test]
    fn calibration_uses_latest_centroid() {
        let mut s = session();
        s.process_frame(&frame_with_square(None, 0));
        assert!(matches!(
            s.confirm_calibration(),
            Err(CalibrationError::NoDetection {
                step: CalibrationStep::TopLeft
            })
        ));
        s.process_frame(&frame_with_square(Some((30, 30)), 33));
        assert_eq!(
            s.confirm_calibration(),
            Ok(CaptureOutcome::Next(CalibrationStep::BottomLeft))
        );
        assert_eq!(s.calibration().samples()[0].sensor, s.last_centroid().expect("seen"));
    }

    #[test]
    fn reset_clears_calibration_debounce_and_events() {
        let mut s = session();
        for (i, c) in [(20, 20), (20, 100), (140, 100), (140, 20), (80, 60)]
            .into_iter()
            .enumerate()
        {
            s.process_frame(&frame_with_square(Some(c), i as u64 * 33));
            s.confirm_calibration().expect("capture");
        }
        assert!(s.calibration().is_calibrated());
        s.process_frame(&frame_with_square(None, 900));
        s.process_frame(&frame_with_square(Some((80, 60)), 1_000));
        assert!(s.process_frame(&frame_with_square(Some((80, 60)), 1_600)).settled);
        assert_eq!(s.events().len(), 1);

        s.process_frame(&frame_with_square(Some((50, 50)), 1_700));
        s.reset_calibration();
        assert!(!s.calibration().is_calibrated());
        assert_eq!(s.debounce_state(), DebounceState::Unarmed);
        assert!(s.events().is_empty());
    }

    #[test]
    fn out_of_range_durations_do_not_panic() {
        let cfg = TrackerConfig {
            dwell_seconds: 1e20,
            event_lifetime_seconds: 1e20,
            ..config()
        };
        let mut s = DetectorSession::new(cfg, BackgroundModel::uniform(W, H, 2.0));
        for i in 0..10u64 {
            assert!(!s.process_frame(&frame_with_square(Some((80, 60)), i * 1_000)).settled);
        }
        assert_eq!(s.stats().detections, 10);
    }

    #[test]
    fn resolution_mismatch_is_skipped() {
        let mut s = session();
        let odd = DepthFrame::filled(W / 2, H / 2, 1.0, Duration::ZERO);
        let r = s.process_frame(&odd);
        assert!(r.blob.is_none());
        assert_eq!(s.stats().segment_errors, 1);
    }

    #[test]
    fn settled_centroid_at_square_center_is_a_hit() {
        let mut s = session();
        let mut engine = CalibrationEngine::for_region(s.region());
        for c in [(20, 20), (20, 100), (140, 100), (140, 20), (80, 60)] {
            engine
                .capture_step(Some(PixelPoint::new(c.0, c.1)))
                .expect("capture");
        }
        s.calibration = engine;

        let mut hits = Vec::new();
        for i in 0..20u64 {
            if let Some(ev) = s.process_frame(&frame_with_square(Some((80, 60)), i * 33)).event {
                hits.push(ev);
            }
        }
        assert_eq!(hits.len(), 1);
        assert!(hits[0].is_hit());
        approx::assert_abs_diff_eq!(hits[0].normalized.x, 0.5, epsilon = 0.02);
        approx::assert_abs_diff_eq!(hits[0].normalized.y, 0.5, epsilon = 0.02);
        assert_eq!(s.stats().hits, 1);
    }

    #[test]
    fn settled_centroid_outside_square_is_a_miss() {
        let mut s = session();
        let mut engine = CalibrationEngine::for_region(s.region());
        for c in [(40, 30), (40, 90), (120, 90), (120, 30), (80, 60)] {
            engine
                .capture_step(Some(PixelPoint::new(c.0, c.1)))
                .expect("capture");
        }
        s.calibration = engine;

        let mut events = Vec::new();
        for i in 0..20u64 {
            if let Some(ev) = s.process_frame(&frame_with_square(Some((14, 12)), i * 33)).event {
                events.push(ev);
            }
        }
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_hit());
        assert!(s.events().miss_flash_active(Duration::from_millis(20 * 33)));
    }
}
