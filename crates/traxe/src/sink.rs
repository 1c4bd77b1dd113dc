//! Event delivery off the detection thread.
//!
//! The detection loop hands events to an [`EventDispatcher`], which pushes
//! them into a bounded queue drained by a delivery thread. The thread fans
//! each event out to every [`EventSink`]. A full queue drops the event with
//! a warning and a failing sink is logged and skipped, so delivery never
//! stalls detection.

use std::{
    io::Write,
    sync::{
        mpsc::{self, Receiver, SyncSender, TrySendError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};

use crate::{wire::WireEvent, Event};

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error("sink disconnected: {0}")]
    Disconnected(String),
}

/// A consumer of hit/miss events.
pub trait EventSink: Send {
    fn name(&self) -> &str;

    fn deliver(&mut self, event: &Event) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver(&mut self, event: &Event) -> Result<(), SinkError> {
        (**self).deliver(event)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Writes one wire-format JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    name: String,
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, event: &Event) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &WireEvent::from(event))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects delivered events in shared memory; handy for renderers and tests.
#[derive(Clone, Default)]
pub struct CollectSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for CollectSink {
    fn name(&self) -> &str {
        "collect"
    }

    fn deliver(&mut self, event: &Event) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Disconnected("collector lock poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

/// Counters reported when the delivery thread exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events accepted into the queue.
    pub queued: u64,
    /// Events dropped because the queue was full or closed.
    pub dropped: u64,
    /// Successful per-sink deliveries.
    pub delivered: u64,
    /// Failed per-sink deliveries.
    pub failed: u64,
}

/// Handle to the delivery thread.
pub struct EventDispatcher {
    tx: Option<SyncSender<Event>>,
    worker: Option<JoinHandle<DeliveryStats>>,
    queued: u64,
    dropped: u64,
}

impl EventDispatcher {
    /// Start the delivery thread with a queue of `capacity` events.
    pub fn spawn(
        sinks: Vec<Box<dyn EventSink>>,
        capacity: usize,
    ) -> Result<Self, std::io::Error> {
        let (tx, rx) = mpsc::sync_channel::<Event>(capacity.max(1));
        let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
        info!("event delivery to [{}] (queue {capacity})", names.join(", "));
        let worker = thread::Builder::new()
            .name("traxe-delivery".into())
            .spawn(move || deliver_loop(rx, sinks))?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            queued: 0,
            dropped: 0,
        })
    }

    /// Queue an event without blocking. Returns `false` if it was dropped.
    pub fn dispatch(&mut self, event: Event) -> bool {
        let Some(tx) = &self.tx else {
            self.dropped += 1;
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => {
                self.queued += 1;
                true
            }
            Err(TrySendError::Full(event)) => {
                self.dropped += 1;
                warn!(
                    "delivery queue full, dropping {:?} at t={}ms",
                    event.kind,
                    event.timestamp_ms()
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                warn!("delivery thread gone, dropping event");
                self.tx = None;
                false
            }
        }
    }

    /// Close the queue, wait for pending events to drain and report counters.
    pub fn shutdown(mut self) -> DeliveryStats {
        self.finish()
    }

    fn finish(&mut self) -> DeliveryStats {
        self.tx = None;
        let mut stats = match self.worker.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("delivery thread panicked");
                DeliveryStats::default()
            }
            None => DeliveryStats::default(),
        };
        stats.queued = self.queued;
        stats.dropped = self.dropped;
        stats
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.finish();
        }
    }
}

fn deliver_loop(rx: Receiver<Event>, mut sinks: Vec<Box<dyn EventSink>>) -> DeliveryStats {
    let mut stats = DeliveryStats::default();
    for event in rx {
        for sink in sinks.iter_mut() {
            match sink.deliver(&event) {
                Ok(()) => stats.delivered += 1,
                Err(err) => {
                    stats.failed += 1;
                    warn!("sink '{}' failed: {err}", sink.name());
                }
            }
        }
    }
    for sink in sinks.iter_mut() {
        if let Err(err) = sink.flush() {
            warn!("sink '{}' flush failed: {err}", sink.name());
        }
    }
    debug!(
        "delivery thread done: {} delivered, {} failed",
        stats.delivered, stats.failed
    );
    stats
}
