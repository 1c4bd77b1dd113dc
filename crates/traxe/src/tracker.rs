//! The capture loop: warm-up, background, then one cycle per frame.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use log::{info, warn};
use traxe_calib::CaptureOutcome;
use traxe_core::{warm_up, AcquisitionError, FrameSource};
use traxe_segment::BackgroundModel;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    session::{CycleReport, DetectorSession, SessionStats},
    sink::{DeliveryStats, EventDispatcher, EventSink},
    ConfigError, TrackerConfig,
};

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("tracker startup failed: {0}")]
    Startup(#[source] AcquisitionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start event delivery: {0}")]
    Delivery(#[source] std::io::Error),
}

/// Operator commands, applied between cycles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Capture the current centroid for the awaited calibration step.
    ConfirmCalibration,
    /// Drop calibration, debounce progress and displayed events.
    ResetCalibration,
    /// Re-learn the empty scene.
    RecaptureBackground,
    Shutdown,
}

/// Totals returned by [`Tracker::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub session: SessionStats,
    pub delivery: DeliveryStats,
    /// Cycles skipped because the source failed transiently.
    pub acquisition_errors: u64,
}

/// Drives a [`DetectorSession`] from a [`FrameSource`].
///
/// The source is stopped exactly once: on `run` completion or on drop.
pub struct Tracker<S: FrameSource> {
    source: S,
    session: DetectorSession,
    commands: Receiver<Command>,
    command_tx: Sender<Command>,
    acquisition_errors: u64,
    finished: bool,
    stopped: bool,
}

impl<S: FrameSource> Tracker<S> {
    /// Validate the config, warm the source up, capture the initial
    /// background and start event delivery.
    ///
    /// Any failure here is fatal; the source is stopped before returning.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn start(
        mut source: S,
        config: TrackerConfig,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;

        let background = match warm_up(&mut source, config.warmup_frames)
            .and_then(|()| BackgroundModel::capture(&mut source, config.background_duration()))
        {
            Ok(bg) => bg,
            Err(err) => {
                source.stop();
                return Err(TrackerError::Startup(err));
            }
        };

        let dispatcher = match EventDispatcher::spawn(sinks, config.queue_capacity) {
            Ok(d) => d,
            Err(err) => {
                source.stop();
                return Err(TrackerError::Delivery(err));
            }
        };
        info!(
            "tracker ready on lane '{}' ({}x{})",
            config.lane_id,
            background.width(),
            background.height()
        );

        let session = DetectorSession::new(config, background).with_dispatcher(dispatcher);
        let (command_tx, commands) = mpsc::channel();
        Ok(Self {
            source,
            session,
            commands,
            command_tx,
            acquisition_errors: 0,
            finished: false,
            stopped: false,
        })
    }

    /// Sender for operator commands; may be cloned and moved to other threads.
    pub fn commands(&self) -> Sender<Command> {
        self.command_tx.clone()
    }

    pub fn session(&self) -> &DetectorSession {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply a command immediately.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::ConfirmCalibration => match self.session.confirm_calibration() {
                Ok(CaptureOutcome::Next(step)) => info!("place object at {}", step.label()),
                Ok(CaptureOutcome::Calibrated(_)) => info!("calibration complete"),
                Err(_) => {}
            },
            Command::ResetCalibration => self.session.reset_calibration(),
            Command::RecaptureBackground => {
                if let Err(err) = self.session.recapture_background(&mut self.source) {
                    warn!("background recapture failed, keeping previous model: {err}");
                }
            }
            Command::Shutdown => {
                info!("shutdown requested");
                self.finished = true;
            }
        }
    }

    /// Apply pending commands, then process one frame.
    ///
    /// Returns `None` once the run is over (shutdown or end of stream) and
    /// a default report for a cycle skipped on a transient source error.
    pub fn step(&mut self) -> Option<CycleReport> {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => self.handle(cmd),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if self.finished {
            return None;
        }

        match self.source.next_frame() {
            Ok(frame) => Some(self.session.process_frame(&frame)),
            Err(err) if err.is_terminal() => {
                info!("frame source finished: {err}");
                self.finished = true;
                None
            }
            Err(err) => {
                self.acquisition_errors += 1;
                warn!("skipping cycle: {err}");
                Some(CycleReport::default())
            }
        }
    }

    /// Run until shutdown or end of stream, then release the source and
    /// drain event delivery.
    pub fn run(mut self) -> RunSummary {
        while self.step().is_some() {}
        self.finish()
    }

    /// Stop the source and drain event delivery.
    pub fn finish(mut self) -> RunSummary {
        self.stop_source();
        let delivery = self.session.shutdown().unwrap_or_default();
        let summary = RunSummary {
            session: self.session.stats(),
            delivery,
            acquisition_errors: self.acquisition_errors,
        };
        info!(
            "run finished: {} frames, {} hits, {} misses",
            summary.session.frames, summary.session.hits, summary.session.misses
        );
        summary
    }

    fn stop_source(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.source.stop();
        }
    }
}

impl<S: FrameSource> Drop for Tracker<S> {
    fn drop(&mut self) {
        self.stop_source();
    }
}
