//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the pipeline stages.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the scheduler, dedup gates, caller workers, repeater,
//!   reporter, and the loop handle (final drained event).
//! - **Consumers**: `ControlLoop`'s subscriber listener (fans out to
//!   `SubscriberSet`) and any raw `Bus::subscribe()` receiver.
//!
//! See `core/control_loop.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
