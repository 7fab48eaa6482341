//! # Subscriber fan-out.
//!
//! [`SubscriberSet`] hands every pipeline [`Event`] to each registered
//! subscriber through that subscriber's own bounded queue ("lane") and worker
//! task, so one slow or broken subscriber never stalls the stages or its
//! peers.
//!
//! ## Rules
//! - [`emit`](SubscriberSet::emit) never awaits. A lane that cannot take the
//!   event right now (queue full, worker gone) drops it **for that subscriber
//!   only** and bumps the lane's drop counter.
//! - A subscriber sees its events in publish order; there is no ordering
//!   across subscribers.
//! - A panicking subscriber is caught and logged; its lane keeps running.
//! - [`shutdown`](SubscriberSet::shutdown) closes the lanes and waits for the
//!   workers to finish what is already queued. The engine drives this through
//!   [`ControlLoop::close`](crate::ControlLoop::close).
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per lane)
//!        ├────────────────► [lane S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [lane S2] ─► worker S2 ─► on_event()
//!        └────────────────► [lane SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::Event;

use super::Subscribe;

/// One subscriber's intake: its queue plus drop bookkeeping.
struct Lane {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Fan-out over the registered subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber, each with the queue capacity that
    /// subscriber declared. Must run inside a tokio runtime.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut lanes = Vec::with_capacity(subscribers.len());
        let mut workers = Vec::with_capacity(subscribers.len());
        for sub in subscribers {
            let (queue, rx) = mpsc::channel(sub.queue_capacity().max(1));
            lanes.push(Lane {
                name: sub.name(),
                queue,
                dropped: AtomicU64::new(0),
            });
            workers.push(tokio::spawn(drive(sub, rx)));
        }
        Self { lanes, workers }
    }

    /// Hands one event to every lane without awaiting.
    ///
    /// A lane that refuses the event (full queue or exited worker) loses it:
    /// the loss is counted per lane and logged, and the other lanes still get
    /// the event.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for lane in &self.lanes {
            if lane.queue.try_send(Arc::clone(&ev)).is_err() {
                let total = lane.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                eprintln!(
                    "[loopvisor] subscriber '{}' dropped an event (total {total})",
                    lane.name
                );
            }
        }
    }

    /// Closes every lane and waits for the workers to drain their queues.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    /// Per-subscriber totals of events lost on a refused lane.
    #[must_use]
    pub fn dropped(&self) -> Vec<(&'static str, u64)> {
        self.lanes
            .iter()
            .map(|lane| (lane.name, lane.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

/// Worker loop for one subscriber: drains its lane, fencing off panics so a
/// misbehaving handler cannot take the worker down with it.
async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let call = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()));
        if let Err(panic) = call.catch_unwind().await {
            eprintln!("[loopvisor] subscriber '{}' panicked: {panic:?}", sub.name());
        }
    }
}
