//! Settle detection.
//!
//! An object counts as settled once its centroid stays within a pixel
//! tolerance of the position where it first appeared for a dwell time. The
//! debouncer fires once per stable period and re-arms only after the object
//! moves beyond the tolerance or disappears.

use std::time::Duration;

use traxe_core::PixelPoint;

/// Observable debouncer state, mostly for diagnostics and overlays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceState {
    /// Nothing tracked.
    Unarmed,
    /// A candidate position is being timed since `since`.
    Tracking { anchor: PixelPoint, since: Duration },
    /// The candidate already fired; waiting for motion or disappearance.
    Fired { anchor: PixelPoint },
}

#[derive(Clone, Debug)]
pub struct StabilityDebouncer {
    tolerance_px: f32,
    dwell: Duration,
    anchor: Option<PixelPoint>,
    since: Option<Duration>,
}

impl StabilityDebouncer {
    pub fn new(tolerance_px: f32, dwell: Duration) -> Self {
        Self {
            tolerance_px,
            dwell,
            anchor: None,
            since: None,
        }
    }

    /// Feed one cycle's centroid (if any) observed at `now`.
    ///
    /// Returns `true` exactly on the cycle where the object becomes settled.
    pub fn update(&mut self, centroid: Option<PixelPoint>, now: Duration) -> bool {
        let Some(c) = centroid else {
            self.reset();
            return false;
        };

        match self.anchor {
            Some(anchor) if c.distance(anchor) <= self.tolerance_px => {
                let Some(since) = self.since else {
                    return false;
                };
                if now.saturating_sub(since) >= self.dwell {
                    self.since = None;
                    return true;
                }
                false
            }
            _ => {
                self.anchor = Some(c);
                self.since = Some(now);
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.since = None;
    }

    pub fn state(&self) -> DebounceState {
        match (self.anchor, self.since) {
            (None, _) => DebounceState::Unarmed,
            (Some(anchor), Some(since)) => DebounceState::Tracking { anchor, since },
            (Some(anchor), None) => DebounceState::Fired { anchor },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn debouncer() -> StabilityDebouncer {
        StabilityDebouncer::new(8.0, ms(500))
    }

    #[test]
    fn steady_object_fires_once() {
        let mut d = debouncer();
        let p = Some(PixelPoint::new(100, 100));
        assert!(!d.update(p, ms(0)));
        assert!(!d.update(p, ms(400)));
        assert!(d.update(p, ms(520)));
        assert_eq!(
            d.state(),
            DebounceState::Fired {
                anchor: PixelPoint::new(100, 100)
            }
        );
        for t in (600..3000).step_by(33) {
            assert!(!d.update(p, ms(t)));
        }
    }

    #[test]
    fn jitter_within_tolerance_keeps_timing_from_first_sighting() {
        let mut d = debouncer();
        assert!(!d.update(Some(PixelPoint::new(100, 100)), ms(0)));
        assert!(!d.update(Some(PixelPoint::new(105, 103)), ms(200)));
        assert!(!d.update(Some(PixelPoint::new(96, 99)), ms(400)));
        assert!(d.update(Some(PixelPoint::new(104, 98)), ms(500)));
    }

    #[test]
    fn oscillating_object_never_fires() {
        let mut d = debouncer();
        for i in 0..120u64 {
            let x = if i % 2 == 0 { 100 } else { 110 };
            assert!(!d.update(Some(PixelPoint::new(x, 100)), ms(i * 33)));
        }
    }

    #[test]
    fn motion_restarts_the_timer() {
        let mut d = debouncer();
        d.update(Some(PixelPoint::new(100, 100)), ms(0));
        assert!(!d.update(Some(PixelPoint::new(130, 100)), ms(450)));
        assert!(!d.update(Some(PixelPoint::new(130, 100)), ms(600)));
        assert!(d.update(Some(PixelPoint::new(130, 100)), ms(950)));
    }

    #[test]
    fn disappearance_resets_and_rearms() {
        let mut d = debouncer();
        let p = Some(PixelPoint::new(50, 60));
        d.update(p, ms(0));
        assert!(d.update(p, ms(500)));
        assert!(!d.update(None, ms(533)));
        assert_eq!(d.state(), DebounceState::Unarmed);
        assert!(!d.update(p, ms(566)));
        assert!(d.update(p, ms(1066)));
    }

    #[test]
    fn moving_after_fire_rearms() {
        let mut d = debouncer();
        d.update(Some(PixelPoint::new(10, 10)), ms(0));
        assert!(d.update(Some(PixelPoint::new(10, 10)), ms(500)));
        assert!(!d.update(Some(PixelPoint::new(60, 10)), ms(600)));
        assert!(d.update(Some(PixelPoint::new(62, 11)), ms(1100)));
    }

    #[test]
    fn tolerance_boundary_counts_as_stable() {
        let mut d = debouncer();
        d.update(Some(PixelPoint::new(0, 0)), ms(0));
        // exactly 8 px away
        assert!(d.update(Some(PixelPoint::new(8, 0)), ms(500)));
    }
}
