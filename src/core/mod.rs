//! Engine core: stages, assembly, and lifecycle.
//!
//! This module contains the embedded implementation of the pipeline. The
//! public API from this module is [`ControlLoop`] (with its builder), the
//! engine [`Config`], and the two handles returned by [`intake`] and
//! [`ControlLoop::spawn`].
//!
//! Internal modules:
//! - [`timetable`]: the pending set with serial stamping and staleness rules;
//! - [`scheduler`]: single-task intake loop around the timetable and its timer;
//! - [`dedup`]: the two halves of the per-key admission gate;
//! - [`caller`]: worker-pool stage invoking the controller;
//! - [`repeater`]: routes answers back to the scheduler and out to reports;
//! - [`reporter`]: delivery with a bounded, paced retry queue.

mod builder;
mod caller;
mod config;
mod control_loop;
mod dedup;
mod handle;
mod repeater;
mod reporter;
mod scheduler;
mod timetable;

pub use builder::ControlLoopBuilder;
pub use config::Config;
pub use control_loop::ControlLoop;
pub use handle::{IntakeHandle, LoopHandle, intake};
