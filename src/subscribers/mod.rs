//! # Event subscribers for the control loop.
//!
//! This module provides the [`Subscribe`] trait and built-in implementations
//! for handling lifecycle events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   stages ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                                    │
//!                                                       ┌────────────┼───────────┐
//!                                                       ▼            ▼           ▼
//!                                                  LogWriter  InFlightTracker  custom
//! ```
//!
//! ## Subscriber types
//! - **Passive subscribers** - observe and react to events (logging, metrics, alerts)
//! - **Stateful subscribers** - maintain internal state based on events ([`InFlightTracker`])
//!
//! Each subscriber runs behind its own bounded queue and worker task; see
//! [`SubscriberSet`] for the delivery rules.

mod inflight;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use inflight::InFlightTracker;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
