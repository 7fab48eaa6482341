//! # loopvisor
//!
//! **Loopvisor** is a keyed control-loop engine for Rust.
//!
//! It turns a stream of keyed messages into scheduled, deduplicated
//! controller invocations with at most one in flight per key, state threaded
//! between invocations of the same key, and bounded retry delivery of
//! produced values. The crate is designed as a building block for
//! reconcilers and background automation.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ControlMessage│   │ControlMessage│   │ControlMessage│
//!   │ (key, params)│   │ (key, params)│   │ (key, params)│
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          ▼                  ▼                  ▼
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  intake queue (bounded; closing it starts the shutdown cascade)    │
//! └───────────────────────────────┬────────────────────────────────────┘
//!                                 ▼
//!        ┌─────────────────── scheduler ────────────────────┐
//!        │  - stamps each message with a monotonic serial   │
//!        │  - resolves "now" / cron schedules to start times│◄────────┐
//!        │  - keeps at most one pending entry per key       │         │
//!        │    (newer serial replaces, older serial drops)   │         │
//!        └───────────────────────┬──────────────────────────┘         │
//!                        due, non-blocking handoff                    │
//!                                ▼                                    │
//!        ┌─────────────────── dedup-in ─────────────────────┐  repeats│
//!        │  key already in flight? → defer (re-scheduled)  ─┼─────────┤
//!        │  key free? → mark in flight, pass to the pool    │         │
//!        └───────────────────────┬──────────────────────────┘         │
//!                                ▼                                    │
//!               caller pool (num_workers tasks)                       │
//!                 controller.reconcile(key, params, state)            │
//!                                │                                    │
//!                                ▼                                    │
//!        ┌─────────────────── dedup-out ────────────────────┐         │
//!        │  releases the key's in-flight mark               │         │
//!        └───────────────────────┬──────────────────────────┘         │
//!                                ▼                                    │
//!        ┌─────────────────── repeater ─────────────────────┐         │
//!        │  next_run? → back to the scheduler (same serial) ┼─────────┘
//!        │  value?    → to the reporter                     │
//!        └───────────────────────┬──────────────────────────┘
//!                                ▼
//!                  reporter ──► Reporter sink (retries up to a bound)
//!
//! Every stage publishes Events to the Bus; a listener fans them out to
//! Subscribe implementations through per-subscriber bounded queues.
//! ```
//!
//! ### Lifecycle
//! ```text
//! handle.submit(ControlMessage) ──► intake ──► scheduler
//!
//! per message {
//!   ├─► serial = next monotonic number (stamping order = arrival order)
//!   ├─► start_at = resolve(schedule, tolerance)
//!   │       ├─ "now"          ─► immediately due
//!   │       ├─ 5/6-field cron ─► next firing after (now - tolerance)
//!   │       └─ unparseable    ─► degrades to immediately due
//!   ├─► pending set insert:
//!   │       ├─ same key, newer serial ─► replaces the pending entry
//!   │       └─ same key, older serial ─► dropped as stale
//!   └─► when due ─► admission (handoff retried while the gate is busy)
//!         ├─ key in flight ─► deferred, re-enters the pending set
//!         └─ key free      ─► reconcile(key, params, state)
//!               └─► Directive { state?, value?, next_run? }
//!                     ├─ state    ─► handed to this key's next invocation
//!                     ├─ next_run ─► loops back to the scheduler
//!                     └─ value    ─► delivered through the Reporter
//! }
//! ```
//!
//! ## Features
//! | Area               | Description                                                             | Key types / traits                         |
//! |--------------------|-------------------------------------------------------------------------|--------------------------------------------|
//! | **Messages**       | Keyed messages with cron or immediate schedules.                        | [`ControlMessage`], [`IMMEDIATE_SCHEDULE`] |
//! | **Control API**    | The reconcile function and its three-part outcome.                      | [`Controller`], [`ControllerFn`], [`Directive`] |
//! | **Delivery**       | Value sink with paced, bounded retries.                                 | [`Reporter`], [`ReporterFn`]               |
//! | **Subscriber API** | Hook into pipeline lifecycle events (logging, tracking, custom).        | [`Subscribe`], [`Event`], [`EventKind`]    |
//! | **Assembly**       | Build the engine and spawn wired pipelines.                             | [`ControlLoop`], [`Config`], [`intake`]    |
//! | **Errors**         | Typed errors at the two caller-facing seams.                            | [`SubmitError`], [`ReportError`]           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use loopvisor::{
//!     Config, ControlLoop, ControlMessage, ControllerFn, ControllerRef, Directive,
//!     ReportError, ReporterFn, ReporterRef, intake,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn loopvisor::Subscribe>> = {
//!         use loopvisor::LogWriter;
//!         vec![Arc::new(LogWriter::default())]
//!     };
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn loopvisor::Subscribe>> = Vec::new();
//!
//!     // Create the engine
//!     let engine = ControlLoop::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // Count invocations per key and report each total
//!     let controller: ControllerRef<String, u32, u32, String> =
//!         ControllerFn::arc(|key: String, step: u32, state: Option<u32>| async move {
//!             let total = state.unwrap_or(0) + step;
//!             Directive::<u32, String>::idle()
//!                 .with_state(total)
//!                 .with_value(format!("{key} -> {total}"))
//!         });
//!
//!     let sink: ReporterRef<String, String> =
//!         ReporterFn::arc(|_key: String, line: String| async move {
//!             println!("{line}");
//!             Ok::<_, ReportError>(())
//!         });
//!
//!     // Wire a pipeline with two workers
//!     let (handle, rx) = intake::<String, u32>(16);
//!     let pipeline = engine.spawn(controller, sink, 2, rx, Utc::now);
//!
//!     handle.submit(ControlMessage::immediate("hello".to_string(), 1)).await?;
//!
//!     // Closing the intake drains the pipeline; closing the engine drains
//!     // the subscribers
//!     drop(handle);
//!     pipeline.wait().await;
//!     engine.close().await;
//!     Ok(())
//! }
//! ```
mod control;
mod core;
mod error;
mod events;
mod messages;
mod schedule;
mod subscribers;

// ---- Public re-exports ----

pub use control::{Controller, ControllerFn, ControllerRef, Directive, Reporter, ReporterFn, ReporterRef};
pub use core::{Config, ControlLoop, ControlLoopBuilder, IntakeHandle, LoopHandle, intake};
pub use error::{ReportError, SubmitError};
pub use events::{Bus, Event, EventKind};
pub use messages::ControlMessage;
pub use schedule::{IMMEDIATE_SCHEDULE, NowFn};
pub use subscribers::{InFlightTracker, Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
