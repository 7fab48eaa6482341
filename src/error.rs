//! Error types used at the engine's two caller-facing seams.
//!
//! - [`SubmitError`] — returned by [`IntakeHandle`](crate::IntakeHandle) when
//!   a message cannot be queued.
//! - [`ReportError`] — what a [`Reporter`](crate::Reporter) returns to signal
//!   a failed delivery; the engine retries it under the configured bound.
//!
//! The pipeline itself surfaces no errors: malformed schedules degrade to
//! firing immediately, key collisions defer, and exhausted report retries are
//! dropped with an observable [`EventKind::ReportDropped`](crate::EventKind)
//! event.

use thiserror::Error;

/// # Errors produced when submitting to the intake queue.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SubmitError {
    /// The intake queue is at capacity (only `try_submit` returns this).
    #[error("intake queue is full")]
    Full,

    /// The engine is no longer reading from the intake queue.
    #[error("intake queue is closed")]
    Closed,
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use loopvisor::SubmitError;
    ///
    /// assert_eq!(SubmitError::Full.as_label(), "submit_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Full => "submit_full",
            SubmitError::Closed => "submit_closed",
        }
    }
}

/// # Errors a reporter sink returns to signal a failed delivery.
///
/// Both variants are retried identically: the value goes to the back of the
/// reporter's retry queue until it is delivered or the attempt bound is hit.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReportError {
    /// The sink saw the value and refused it.
    #[error("sink rejected value: {reason}")]
    Rejected {
        /// The underlying rejection message.
        reason: String,
    },

    /// The sink could not be reached.
    #[error("sink unavailable: {reason}")]
    Unavailable {
        /// The underlying transport/availability message.
        reason: String,
    },
}

impl ReportError {
    /// Shorthand for [`ReportError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        ReportError::Rejected { reason: reason.into() }
    }

    /// Shorthand for [`ReportError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ReportError::Unavailable { reason: reason.into() }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReportError::Rejected { .. } => "report_rejected",
            ReportError::Unavailable { .. } => "report_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ReportError::Rejected { reason } => format!("rejected: {reason}"),
            ReportError::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }
}
