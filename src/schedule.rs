//! # Start-time resolution.
//!
//! Turns a [`ControlMessage`](crate::ControlMessage)'s cron text into the
//! instant the scheduler should fire it.
//!
//! ## Rules
//! - The [`IMMEDIATE_SCHEDULE`] sentinel (`"now"`) resolves to `now`.
//! - Standard five-field expressions are normalized by prepending a seconds
//!   field before parsing; expressions that already carry seconds (or a year)
//!   are passed through as-is.
//! - A malformed expression **degrades** to `now`: the message fires once,
//!   immediately, and no error is surfaced.
//! - The next occurrence is looked up strictly after `now - tolerance`, so a
//!   nonzero tolerance can resolve to an instant in the past; the scheduler's
//!   timer then fires immediately (the "just missed it" catch-up).

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Duration as Delta, Utc};
use cron::Schedule;

/// Schedule sentinel that fires once, immediately.
pub const IMMEDIATE_SCHEDULE: &str = "now";

/// Injectable wall clock, `Utc::now` in production.
pub type NowFn = fn() -> DateTime<Utc>;

/// Injectable start-time resolver; the scheduler's pending set takes one so
/// tests can substitute a fixed-time variant.
pub(crate) type NextStartTime = fn(&str, Duration, DateTime<Utc>) -> DateTime<Utc>;

/// Resolves the next start time for a schedule.
pub(crate) fn next_start_time(schedule: &str, tolerance: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let expr = schedule.trim();
    if expr == IMMEDIATE_SCHEDULE {
        return now;
    }
    let Ok(parsed) = parse_cron(expr) else {
        return now;
    };
    let reference = shift_back(now, tolerance);
    parsed.after(&reference).next().unwrap_or(now)
}

/// Parses a cron expression, normalizing the common five-field form.
fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    if expr.split_whitespace().count() == 5 {
        return Schedule::from_str(&format!("0 {expr}"));
    }
    Schedule::from_str(expr)
}

/// `at - by`, saturating instead of overflowing.
pub(crate) fn shift_back(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    Delta::from_std(by)
        .ok()
        .and_then(|d| at.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `at + by`, saturating instead of overflowing.
pub(crate) fn shift_forward(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    Delta::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
