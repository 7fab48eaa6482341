//! # Message currency of the control loop.
//!
//! [`ControlMessage`] is the public intake unit: a key, its parameters, and a
//! cron-style schedule describing when the controller should run. Everything
//! else in this module is the crate-private currency the stages pass between
//! each other:
//!
//! ```text
//! ControlMessage ──► ScheduledItem ──► StatefulMessage ──► Answer ──► ReportInfo
//!    (intake)         (pending set)      (admission)      (caller)    (reporter)
//! ```
//!
//! ## Ordering guarantees
//! The scheduler stamps every arriving message with a monotonically increasing
//! serial number. The serial travels with the item through every stage and back
//! around the repeat path; the pending set uses it to detect stale entries, and
//! lifecycle events carry it for tracing.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use loopvisor::ControlMessage;
//!
//! let m = ControlMessage::new("sensor-7", 42u32, "*/5 * * * *")
//!     .with_tolerance(Duration::from_secs(30));
//!
//! assert_eq!(m.key, "sensor-7");
//! assert_eq!(m.schedule, "*/5 * * * *");
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::schedule::IMMEDIATE_SCHEDULE;

/// A request to run the controller for a key.
///
/// `schedule` is a five-field cron expression (`min hour dom month dow`),
/// an expression with an explicit seconds field, or the
/// [`IMMEDIATE_SCHEDULE`] sentinel (`"now"`). Malformed expressions degrade
/// to firing once, immediately.
///
/// `tolerance` shifts the reference instant for the next-occurrence lookup
/// backwards: a message submitted just *after* a cron boundary still fires
/// for that boundary if the boundary lies within the tolerance window.
#[derive(Clone, Debug)]
pub struct ControlMessage<K, P> {
    /// Identity of the control subject.
    pub key: K,
    /// Opaque parameters handed to the controller on each invocation.
    pub params: P,
    /// Cron expression or the `"now"` sentinel.
    pub schedule: String,
    /// How far behind a just-missed cron boundary may lie and still fire.
    pub tolerance: Duration,
}

impl<K, P> ControlMessage<K, P> {
    /// Creates a message with the given schedule and zero tolerance.
    pub fn new(key: K, params: P, schedule: impl Into<String>) -> Self {
        Self {
            key,
            params,
            schedule: schedule.into(),
            tolerance: Duration::ZERO,
        }
    }

    /// Creates a message that fires once, immediately.
    pub fn immediate(key: K, params: P) -> Self {
        Self::new(key, params, IMMEDIATE_SCHEDULE)
    }

    /// Sets the start-time tolerance.
    #[inline]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Entry of the scheduler's pending set.
///
/// Carries the threaded controller state when the item came back around the
/// repeat path; fresh arrivals start with `state: None`.
#[derive(Debug)]
pub(crate) struct ScheduledItem<K, P, S> {
    pub(crate) key: K,
    pub(crate) params: P,
    pub(crate) serial: u64,
    pub(crate) state: Option<S>,
    pub(crate) start_at: DateTime<Utc>,
}

/// A due item on its way into (or through) the dedup gate.
#[derive(Debug)]
pub(crate) struct StatefulMessage<K, P, S> {
    pub(crate) key: K,
    pub(crate) params: P,
    pub(crate) serial: u64,
    pub(crate) state: Option<S>,
}

/// What a caller worker produced for one invocation.
#[derive(Debug)]
pub(crate) struct Answer<K, P, S, V> {
    pub(crate) key: K,
    pub(crate) params: P,
    pub(crate) serial: u64,
    pub(crate) state: Option<S>,
    pub(crate) value: Option<V>,
    pub(crate) next_run: Option<DateTime<Utc>>,
}

/// A value bound for the reporter sink.
#[derive(Debug)]
pub(crate) struct ReportInfo<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_uses_now_sentinel() {
        let m = ControlMessage::immediate("k", 1u8);
        assert_eq!(m.schedule, IMMEDIATE_SCHEDULE);
        assert_eq!(m.tolerance, Duration::ZERO);
    }

    #[test]
    fn with_tolerance_sets_window() {
        let m = ControlMessage::new("k", (), "0 0 * * *").with_tolerance(Duration::from_secs(300));
        assert_eq!(m.tolerance, Duration::from_secs(300));
    }
}
