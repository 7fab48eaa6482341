//! # Caller-side handles.
//!
//! Two handles connect an application to a running engine:
//! - [`IntakeHandle`] feeds messages in. It is cheap to clone; dropping every
//!   clone closes the intake queue and starts the shutdown cascade.
//! - [`LoopHandle`] represents the running pipeline. [`LoopHandle::wait`]
//!   resolves once every stage has exited and the reporter's retry queue is
//!   drained.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::SubmitError;
use crate::events::{Bus, Event, EventKind};
use crate::messages::ControlMessage;

/// Creates an intake queue of the given capacity (clamped to at least 1).
///
/// Returns the sending handle and the receiver to pass to
/// [`ControlLoop::spawn`](crate::ControlLoop::spawn). Splitting the two lets
/// callers pre-fill the queue before the engine starts, or feed the engine
/// from a source they already own.
pub fn intake<K, P>(
    capacity: usize,
) -> (IntakeHandle<K, P>, mpsc::Receiver<ControlMessage<K, P>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IntakeHandle { tx }, rx)
}

/// # Sending side of the intake queue.
///
/// ## Rules
/// - [`submit`](IntakeHandle::submit) waits for queue space; it only fails
///   once the engine stopped reading.
/// - [`try_submit`](IntakeHandle::try_submit) never waits and reports a full
///   queue as [`SubmitError::Full`].
/// - The queue closes when every clone of the handle is dropped.
#[derive(Debug)]
pub struct IntakeHandle<K, P> {
    tx: mpsc::Sender<ControlMessage<K, P>>,
}

impl<K, P> IntakeHandle<K, P> {
    /// Queues a message, waiting for space if the queue is full.
    pub async fn submit(&self, m: ControlMessage<K, P>) -> Result<(), SubmitError> {
        self.tx.send(m).await.map_err(|_| SubmitError::Closed)
    }

    /// Queues a message without waiting.
    pub fn try_submit(&self, m: ControlMessage<K, P>) -> Result<(), SubmitError> {
        self.tx.try_send(m).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Returns `true` once the engine stopped reading from the queue.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// Derived Clone would demand K: Clone and P: Clone; the sender clones without
// either.
impl<K, P> Clone for IntakeHandle<K, P> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// # Handle to a running pipeline.
///
/// Holds the stage tasks in shutdown-cascade order. The pipeline keeps
/// running if the handle is dropped; [`wait`](LoopHandle::wait) is the way to
/// observe completion.
#[derive(Debug)]
pub struct LoopHandle {
    stages: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl LoopHandle {
    pub(crate) fn new(stages: Vec<JoinHandle<()>>, bus: Bus) -> Self {
        Self { stages, bus }
    }

    /// Waits until every stage has exited.
    ///
    /// The stages shut down in pipeline order once the intake queue closes,
    /// so this resolves only after in-flight work finished and the reporter
    /// drained its retry queue. Publishes [`EventKind::PipelineDrained`] as
    /// the final event.
    pub async fn wait(self) {
        for stage in self.stages {
            // A panicked stage must not wedge shutdown for the rest.
            let _ = stage.await;
        }
        self.bus.publish(Event::new(EventKind::PipelineDrained));
    }

    /// Returns `true` once every stage has exited.
    ///
    /// Useful for polling from synchronous code; [`wait`](LoopHandle::wait)
    /// is the async equivalent.
    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(JoinHandle::is_finished)
    }
}
