use std::time::Duration;

use log::{debug, info, warn};
use traxe_core::{AcquisitionError, DepthFrame, DepthView, FrameSource};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-pixel reference depth of the empty scene.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundModel {
    width: usize,
    height: usize,
    depth: Vec<f32>,
    frames_used: usize,
}

impl BackgroundModel {
    /// Pull frames from `source` for `duration` (measured on frame timestamps)
    /// and build the temporal-median background.
    ///
    /// A source error ends the burst early; only an empty burst is an error.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(source)))]
    pub fn capture<S: FrameSource + ?Sized>(
        source: &mut S,
        duration: Duration,
    ) -> Result<Self, AcquisitionError> {
        info!(
            "capturing background for {:.2}s, keep the target empty",
            duration.as_secs_f64()
        );
        let mut stack: Vec<DepthFrame> = Vec::new();
        loop {
            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("background capture interrupted: {err}");
                    break;
                }
            };
            let Some(first) = stack.first() else {
                stack.push(frame);
                continue;
            };
            if frame.timestamp.saturating_sub(first.timestamp) >= duration {
                break;
            }
            if !frame.same_shape(&first.view()) {
                warn!(
                    "skipping {}x{} frame during background capture (expected {}x{})",
                    frame.width, frame.height, first.width, first.height
                );
                continue;
            }
            stack.push(frame);
        }

        let model = Self::from_frames(&stack).ok_or(AcquisitionError::NoFrames)?;
        info!(
            "background captured from {} frames ({}x{})",
            model.frames_used, model.width, model.height
        );
        Ok(model)
    }

    /// Temporal median over an explicit frame stack.
    ///
    /// Returns `None` for an empty stack or frames of differing size.
    pub fn from_frames(frames: &[DepthFrame]) -> Option<Self> {
        let first = frames.first()?;
        let (width, height) = (first.width, first.height);
        if frames
            .iter()
            .any(|f| f.width != width || f.height != height)
        {
            return None;
        }

        let n = width * height;
        let mut depth = Vec::with_capacity(n);
        let mut samples = vec![0.0f32; frames.len()];
        for i in 0..n {
            for (slot, frame) in samples.iter_mut().zip(frames) {
                *slot = frame.data[i];
            }
            depth.push(median_in_place(&mut samples));
        }
        debug!("median background over {} frames", frames.len());

        Some(Self {
            width,
            height,
            depth,
            frames_used: frames.len(),
        })
    }

    /// Background at a constant depth; useful for synthetic scenes.
    pub fn uniform(width: usize, height: usize, depth_m: f32) -> Self {
        Self {
            width,
            height,
            depth: vec![depth_m; width * height],
            frames_used: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of frames the median was computed from.
    pub fn frames_used(&self) -> usize {
        self.frames_used
    }

    pub fn view(&self) -> DepthView<'_> {
        DepthView {
            width: self.width,
            height: self.height,
            data: &self.depth,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.depth[y * self.width + x]
    }
}

/// Median of `samples`, averaging the two middle values for even counts.
fn median_in_place(samples: &mut [f32]) -> f32 {
    let n = samples.len();
    let mid = n / 2;
    let (_, upper, _) = samples.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        return upper;
    }
    let lower = samples[..mid]
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    0.5 * (lower + upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use traxe_core::ReplaySource;

    fn frame_at(depth: f32, ms: u64) -> DepthFrame {
        DepthFrame::filled(3, 2, depth, Duration::from_millis(ms))
    }

    #[test]
    fn median_handles_odd_and_even_counts() {
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median_in_place(&mut [7.0]), 7.0);
    }

    #[test]
    fn median_rejects_outlier_frames() {
        let frames = vec![
            frame_at(2.0, 0),
            frame_at(2.0, 33),
            frame_at(0.0, 66), // dropout
            frame_at(2.0, 99),
            frame_at(9.0, 132), // spike
        ];
        let bg = BackgroundModel::from_frames(&frames).expect("model");
        assert_eq!(bg.frames_used(), 5);
        assert!(bg.view().data.iter().all(|&d| d == 2.0));
    }

    #[test]
    fn from_frames_rejects_mixed_shapes() {
        let frames = vec![
            frame_at(2.0, 0),
            DepthFrame::filled(4, 4, 2.0, Duration::ZERO),
        ];
        assert!(BackgroundModel::from_frames(&frames).is_none());
        assert!(BackgroundModel::from_frames(&[]).is_none());
    }

    #[test]
    fn capture_stops_after_duration() {
        let frames: Vec<DepthFrame> = (0..60).map(|i| frame_at(2.0, i * 33)).collect();
        let mut src = ReplaySource::new(frames);
        let bg = BackgroundModel::capture(&mut src, Duration::from_secs(1)).expect("capture");
        // frames at 0..=990 ms are inside the window, the one at 1023 ms ends it
        assert_eq!(bg.frames_used(), 31);
        assert_eq!(src.remaining(), 60 - 32);
    }

    #[test]
    fn capture_uses_partial_burst_when_stream_ends() {
        let mut src = ReplaySource::new(vec![frame_at(1.0, 0), frame_at(3.0, 33)]);
        let bg = BackgroundModel::capture(&mut src, Duration::from_secs(1)).expect("capture");
        assert_eq!(bg.frames_used(), 2);
        assert_eq!(bg.get(0, 0), 2.0);
    }

    #[test]
    fn capture_without_frames_fails() {
        let mut src = ReplaySource::default();
        let err = BackgroundModel::capture(&mut src, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, AcquisitionError::NoFrames));
    }
}
