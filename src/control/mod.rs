//! # Caller-supplied contracts.
//!
//! The engine is generic over two functions the caller provides:
//! - [`Controller`] - invoked on the worker pool for every due message,
//!   answers with a [`Directive`] (state to remember, value to report, next
//!   start time)
//! - [`Reporter`] - the delivery sink for produced values, retried by the
//!   engine on failure
//!
//! Both come with function-backed adapters ([`ControllerFn`], [`ReporterFn`])
//! and `Arc<dyn …>` handle aliases ([`ControllerRef`], [`ReporterRef`]).

mod controller;
mod reporter;

pub use controller::{Controller, ControllerFn, ControllerRef, Directive};
pub use reporter::{Reporter, ReporterFn, ReporterRef};
