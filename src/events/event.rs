//! # Lifecycle events emitted by the pipeline stages.
//!
//! The [`EventKind`] enum classifies event types across the stage boundaries:
//! - **Scheduling events**: intake and pending-set changes (accepted, scheduled, superseded)
//! - **Admission events**: the dedup gate's decisions (granted, deferred, released)
//! - **Delivery events**: reporter outcomes (delivered, retried, dropped)
//! - **Shutdown events**: cascade progress (intake closed, pipeline drained)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! Debug-rendered key, serial numbers, attempt counts, and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use loopvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ReportRetried)
//!     .with_key("\"sensor-7\"")
//!     .with_attempt(2)
//!     .with_reason("sink unavailable")
//!     .with_delay(Duration::from_millis(10));
//!
//! assert_eq!(ev.kind, EventKind::ReportRetried);
//! assert_eq!(ev.key.as_deref(), Some("\"sensor-7\""));
//! assert_eq!(ev.attempt, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Scheduling events ===
    /// The scheduler stamped an arriving message with a serial number.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: assigned serial number
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    MessageAccepted,

    /// An entry was inserted into the pending set (arrival, repeat, or
    /// deferral re-entry).
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: entry serial number
    /// - `delay_ms`: time until the entry is due (0 when already overdue)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ItemScheduled,

    /// A pending entry was replaced by a newer serial for the same key.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: serial of the replaced (older) entry
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ItemSuperseded,

    /// An incoming entry was discarded because the pending set already holds
    /// the same key with an equal or newer serial.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: serial of the discarded entry
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    StaleItemDropped,

    /// The admission channel was full on a timer tick; the due entry stays at
    /// the front and the timer re-arms shortly.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: entry serial number
    /// - `delay_ms`: re-arm delay
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    HandoffDeferred,

    // === Admission events ===
    /// The key was free; the message holds the in-flight lock and is on its
    /// way to the caller pool.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: message serial number
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    AdmissionGranted,

    /// The key was already in flight; the message was rescheduled instead of
    /// dropped.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: message serial number
    /// - `delay_ms`: deferral delay (the configured dedup interval)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    AdmissionDeferred,

    /// The in-flight lock for the key was released after its answer passed
    /// the dedup gate.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: answer serial number
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    AdmissionReleased,

    // === Caller events ===
    /// The controller returned for this key; the answer is en route.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: message serial number
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ControllerDone,

    /// An answer requested a next run; the item went back to the scheduler.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `serial`: answer serial number
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    RepeatScheduled,

    // === Delivery events ===
    /// The sink accepted a value.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `attempt`: the call number that succeeded (1 = first delivery)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReportDelivered,

    /// The sink failed; the value was queued for another attempt.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `attempt`: the call number that failed
    /// - `reason`: sink error message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReportRetried,

    /// The attempt bound was exhausted; the value was abandoned. This is the
    /// observable side of the reporter's silent drop.
    ///
    /// Sets:
    /// - `key`: Debug-rendered key
    /// - `attempt`: number of calls made before giving up
    /// - `reason`: drop explanation
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReportDropped,

    // === Shutdown events ===
    /// The intake queue closed; the shutdown cascade began.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    IntakeClosed,

    /// Every stage exited and the reporter's retry queue is drained.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    PipelineDrained,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::MessageAccepted => "accepted",
            EventKind::ItemScheduled => "scheduled",
            EventKind::ItemSuperseded => "superseded",
            EventKind::StaleItemDropped => "stale",
            EventKind::HandoffDeferred => "handoff-deferred",
            EventKind::AdmissionGranted => "admitted",
            EventKind::AdmissionDeferred => "deferred",
            EventKind::AdmissionReleased => "released",
            EventKind::ControllerDone => "reconciled",
            EventKind::RepeatScheduled => "repeat",
            EventKind::ReportDelivered => "report-ok",
            EventKind::ReportRetried => "report-retry",
            EventKind::ReportDropped => "report-drop",
            EventKind::IntakeClosed => "intake-closed",
            EventKind::PipelineDrained => "drained",
        }
    }
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
///
/// The `key` field is the `Debug` rendering of the message key, not the key
/// itself: events stay non-generic so one bus serves any instantiation of the
/// engine.
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Debug-rendered message key, if applicable.
    pub key: Option<Arc<str>>,
    /// Serial number of the message/entry, if applicable.
    pub serial: Option<u64>,
    /// Sink call number (starting from 1), if applicable.
    pub attempt: Option<u32>,
    /// Delay in milliseconds (compact), if applicable.
    pub delay_ms: Option<u32>,
    /// Human-readable reason (sink errors, drop explanations).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            key: None,
            serial: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a Debug-rendered key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a serial number.
    #[inline]
    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Attaches a sink call number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::MessageAccepted);
        let b = Event::new(EventKind::MessageAccepted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_set_fields() {
        let ev = Event::new(EventKind::AdmissionDeferred)
            .with_key("\"a\"")
            .with_serial(7)
            .with_delay(Duration::from_secs(10));
        assert_eq!(ev.key.as_deref(), Some("\"a\""));
        assert_eq!(ev.serial, Some(7));
        assert_eq!(ev.delay_ms, Some(10_000));
        assert!(ev.attempt.is_none());
    }

    #[test]
    fn huge_delay_saturates() {
        let ev = Event::new(EventKind::ItemScheduled).with_delay(Duration::MAX);
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(EventKind::AdmissionGranted.as_label(), "admitted");
        assert_eq!(EventKind::ReportDropped.as_label(), "report-drop");
        assert_eq!(EventKind::PipelineDrained.as_label(), "drained");
    }
}
