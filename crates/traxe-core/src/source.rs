//! Depth frame acquisition.
//!
//! A `FrameSource` is pulled synchronously, one frame per processing cycle.
//! Device-backed implementations live outside this workspace; `ReplaySource`
//! plays back an in-memory sequence and is what tests and offline runs use.

use std::collections::VecDeque;

use log::{debug, info};

use crate::DepthFrame;

/// Errors produced while pulling depth frames.
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error("no depth frames could be captured")]
    NoFrames,
    #[error("timed out waiting for a depth frame")]
    Timeout,
    #[error("depth device disconnected")]
    Disconnected,
    #[error("frame stream ended")]
    EndOfStream,
    #[error("frame {index}: expected {expected_width}x{expected_height}, got {width}x{height}")]
    Resolution {
        index: usize,
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },
    #[error("failed to decode depth frame: {0}")]
    Decode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AcquisitionError {
    /// True when the stream can never produce another frame.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Disconnected)
    }
}

/// A synchronous supplier of fixed-resolution metric depth frames.
pub trait FrameSource {
    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<DepthFrame, AcquisitionError>;

    /// Release the underlying device. Called once when the tracker shuts down.
    fn stop(&mut self) {}

    /// Fixed `(width, height)` of the produced frames, if known up front.
    fn resolution(&self) -> Option<(usize, usize)> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<DepthFrame, AcquisitionError> {
        (**self).next_frame()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn resolution(&self) -> Option<(usize, usize)> {
        (**self).resolution()
    }
}

/// Discard the first `frames` frames so auto-exposure and the depth
/// pipeline settle. Any acquisition failure here is returned to the caller.
pub fn warm_up<S: FrameSource + ?Sized>(
    source: &mut S,
    frames: usize,
) -> Result<(), AcquisitionError> {
    for i in 0..frames {
        source.next_frame()?;
        debug!("warm-up frame {}/{}", i + 1, frames);
    }
    if frames > 0 {
        info!("depth source warmed up ({frames} frames)");
    }
    Ok(())
}

/// Plays back a fixed sequence of frames, then reports `EndOfStream`.
#[derive(Clone, Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<DepthFrame>,
    delivered: usize,
    stopped: bool,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = DepthFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            delivered: 0,
            stopped: false,
        }
    }

    pub fn push(&mut self, frame: DepthFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<DepthFrame, AcquisitionError> {
        if self.stopped {
            return Err(AcquisitionError::Disconnected);
        }
        let frame = self.frames.pop_front().ok_or(AcquisitionError::EndOfStream)?;
        self.delivered += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.frames.clear();
    }

    fn resolution(&self) -> Option<(usize, usize)> {
        self.frames.front().map(|f| (f.width, f.height))
    }
}
