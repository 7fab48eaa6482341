//! # Event bus for broadcasting lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (the scheduler, the
//! dedup gates, caller workers, the repeater, and the reporter).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   Scheduler  ──┐
//!   Dedup-In   ──┤
//!   Callers    ──┼──────► Bus ───────► subscriber listener ────► SubscriberSet
//!   Dedup-Out  ──┤  (broadcast chan)    (in ControlLoop)
//!   Repeater   ──┤
//!   Reporter   ──┘
//! ```
//!
//! The engine runs a single internal listener that fans events out to
//! user-defined subscribers via [`SubscriberSet`](crate::SubscriberSet);
//! additional raw receivers can be created with [`Bus::subscribe`].
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for lifecycle events.
///
/// Thin wrapper over [`tokio::sync::broadcast`] that provides a
/// `publish`/`subscribe` API. Multiple publishers can publish concurrently;
/// subscribers receive clones of each event.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// ### Notes
    /// - Capacity is **shared** across all receivers (not per-subscriber).
    /// - When receivers lag, they will observe `RecvError::Lagged`.
    /// - The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// - Takes ownership of the event; the broadcast channel clones it for each receiver.
    /// - If there are no receivers, the event is dropped (this function still returns immediately).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// - Each call creates an **independent** receiver.
    /// - A receiver only gets events **sent after** it subscribes.
    /// - Slow receivers get `RecvError::Lagged(n)` and skip over missed items.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::IntakeClosed));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, EventKind::IntakeClosed);
    }

    #[tokio::test]
    async fn publish_without_receivers_is_a_noop() {
        let bus = Bus::new(1);
        bus.publish(Event::new(EventKind::PipelineDrained));
        // A receiver created afterwards only sees later events.
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::IntakeClosed));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::IntakeClosed);
    }
}
