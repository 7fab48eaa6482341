//! # In-flight lock tracker with sequence-based ordering.
//!
//! [`InFlightTracker`] maintains authoritative state of which keys currently
//! hold the dedup gate's in-flight lock, using event sequence numbers to
//! handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! Dedup-In / Dedup-Out ──► Bus ──► subscriber listener ──► InFlightTracker
//!                                                                │
//!                                                                ▼
//!                                                 HashMap<String, KeyState>
//!                                                   (key text → {seq, held})
//! ```
//!
//! ## Rules
//! - Only `AdmissionGranted` / `AdmissionReleased` change the held state
//! - Read operations (`snapshot`, `is_in_flight`) are **eventually consistent**
//! - Other keyed events **update seq** but don't affect held status
//! - Events with `seq <= last_seq` for a key are **rejected** (stale)
//! - Keys are tracked by their `Debug` rendering (the [`Event::key`] field)
//!
//! ## Example
//! ```no_run
//! # use std::sync::Arc;
//! # use loopvisor::InFlightTracker;
//! # async fn demo() {
//! let tracker = Arc::new(InFlightTracker::new());
//! // ... hand a clone to ControlLoop::builder(...).with_subscribers(vec![tracker.clone()]) ...
//! let held = tracker.snapshot().await;
//! println!("currently in flight: {held:?}");
//! # }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Per-key state for ordering validation.
#[derive(Debug, Clone)]
struct KeyState {
    /// Last seen sequence number for this key; `None` until the first event.
    /// The process's very first event carries `seq == 0`, so a plain zero
    /// sentinel would reject it as stale.
    last_seq: Option<u64>,
    /// Whether the key currently holds the in-flight lock.
    held: bool,
}

/// Thread-safe tracker of in-flight keys.
///
/// ### Responsibilities
/// - Maintains authoritative state of which keys hold the dedup lock
/// - Rejects stale events using sequence numbers
/// - Provides snapshots for diagnostics and tests
///
/// ### Rules
/// - **Ordering**: events with `seq <= last_seq` for a key are rejected
/// - **State changes**: only grant/release events flip the held flag
pub struct InFlightTracker {
    state: RwLock<HashMap<String, KeyState>>,
}

impl InFlightTracker {
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Updates key state if the event is newer than the last seen one.
    ///
    /// ### Ordering guarantees
    /// Events are applied only if `ev.seq > last_seq` for this key. This
    /// prevents out-of-order events from corrupting state: a late-arriving
    /// `AdmissionGranted` cannot resurrect a key that was already released.
    pub async fn update(&self, ev: &Event) {
        let Some(key) = ev.key.as_deref() else {
            return;
        };

        let mut state = self.state.write().await;
        let entry = state.entry(key.to_string()).or_insert(KeyState {
            last_seq: None,
            held: false,
        });
        if entry.last_seq.is_some_and(|last| ev.seq <= last) {
            return;
        }
        entry.last_seq = Some(ev.seq);

        match ev.kind {
            EventKind::AdmissionGranted => entry.held = true,
            EventKind::AdmissionReleased => entry.held = false,
            _ => {}
        }
    }

    /// Returns the Debug-rendered keys currently holding the lock.
    pub async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .iter()
            .filter(|(_, s)| s.held)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// True if the given Debug-rendered key currently holds the lock.
    pub async fn is_in_flight(&self, key: &str) -> bool {
        let state = self.state.read().await;
        state.get(key).is_some_and(|s| s.held)
    }

    /// Number of keys currently holding the lock.
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.values().filter(|s| s.held).count()
    }

    /// True if no key currently holds the lock.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for InFlightTracker {
    async fn on_event(&self, event: &Event) {
        self.update(event).await;
    }

    fn name(&self) -> &'static str {
        "in-flight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(key: &str) -> Event {
        Event::new(EventKind::AdmissionGranted).with_key(key.to_string())
    }

    fn released(key: &str) -> Event {
        Event::new(EventKind::AdmissionReleased).with_key(key.to_string())
    }

    #[tokio::test]
    async fn grant_then_release_round_trip() {
        let t = InFlightTracker::new();
        t.update(&granted("\"a\"")).await;
        assert!(t.is_in_flight("\"a\"").await);
        assert_eq!(t.len().await, 1);

        t.update(&released("\"a\"")).await;
        assert!(!t.is_in_flight("\"a\"").await);
        assert!(t.is_empty().await);
    }

    #[tokio::test]
    async fn the_very_first_event_applies() {
        // The global counter starts at zero, so the first event a process
        // ever publishes has seq 0 and must still flip the held flag.
        let t = InFlightTracker::new();
        let mut grant = granted("\"a\"");
        grant.seq = 0;

        t.update(&grant).await;
        assert!(t.is_in_flight("\"a\"").await);
    }

    #[tokio::test]
    async fn stale_events_are_rejected() {
        let t = InFlightTracker::new();
        let grant = granted("\"a\"");
        let release = released("\"a\"");
        // Apply in order, then replay the (older) grant.
        t.update(&grant).await;
        t.update(&release).await;
        t.update(&grant).await;
        assert!(!t.is_in_flight("\"a\"").await);
    }

    #[tokio::test]
    async fn keyless_events_are_ignored() {
        let t = InFlightTracker::new();
        t.update(&Event::new(EventKind::IntakeClosed)).await;
        assert!(t.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn other_keyed_events_only_advance_seq() {
        let t = InFlightTracker::new();
        t.update(&granted("\"a\"")).await;
        t.update(&Event::new(EventKind::ControllerDone).with_key("\"a\"")).await;
        assert!(t.is_in_flight("\"a\"").await);
    }
}
