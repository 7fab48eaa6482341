//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [accepted] key="sensor-7" serial=1
//! [scheduled] key="sensor-7" serial=1 delay=300000ms
//! [admitted] key="sensor-7" serial=1
//! [deferred] key="sensor-7" serial=2 delay=10000ms
//! [reconciled] key="sensor-7" serial=1
//! [report-ok] key="sensor-7" attempt=1
//! [report-retry] key="sensor-7" attempt=2 err="sink unavailable: down"
//! [report-drop] key="sensor-7" attempts=3 err="attempts exhausted"
//! [intake-closed]
//! [drained]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new stdout logger.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let key = e.key.as_deref().unwrap_or("?");
        match e.kind {
            EventKind::MessageAccepted
            | EventKind::AdmissionGranted
            | EventKind::AdmissionReleased
            | EventKind::ControllerDone
            | EventKind::RepeatScheduled => {
                println!("[{label}] key={key} serial={:?}", e.serial);
            }
            EventKind::ItemScheduled
            | EventKind::ItemSuperseded
            | EventKind::StaleItemDropped
            | EventKind::HandoffDeferred
            | EventKind::AdmissionDeferred => {
                if let Some(ms) = e.delay_ms {
                    println!("[{label}] key={key} serial={:?} delay={ms}ms", e.serial);
                } else {
                    println!("[{label}] key={key} serial={:?}", e.serial);
                }
            }
            EventKind::ReportDelivered => {
                println!("[{label}] key={key} attempt={:?}", e.attempt);
            }
            EventKind::ReportRetried => {
                println!(
                    "[{label}] key={key} attempt={:?} err={:?}",
                    e.attempt,
                    e.reason.as_deref().unwrap_or("")
                );
            }
            EventKind::ReportDropped => {
                println!(
                    "[{label}] key={key} attempts={:?} err={:?}",
                    e.attempt,
                    e.reason.as_deref().unwrap_or("")
                );
            }
            EventKind::IntakeClosed | EventKind::PipelineDrained => {
                println!("[{label}]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
