//! # Engine configuration.
//!
//! [`Config`] defines the control loop's tunables: the deferral delay on key
//! collisions, reporter retry pacing and bound, channel capacities, and the
//! event bus capacity.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use loopvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.dedup_interval = Duration::from_secs(5);
//! cfg.max_report_attempts = 5;
//!
//! assert_eq!(cfg.max_report_attempts, 5);
//! ```

use std::time::Duration;

/// Tunables for the control loop.
///
/// All fields are plain and public; helper accessors apply the documented
/// clamping where a zero would be meaningless.
#[derive(Clone, Debug)]
pub struct Config {
    /// Delay before a key-collision casualty is rescheduled.
    pub dedup_interval: Duration,
    /// Pacing of reporter retries (one queued value is retried per tick).
    pub report_interval: Duration,
    /// Total sink calls per value, initial call included (0 = treated as 1).
    pub max_report_attempts: u32,
    /// Scheduler re-arm delay after a full (non-blocking) handoff.
    pub admission_retry_interval: Duration,
    /// Capacity of the scheduler → dedup channel (min 1).
    pub admission_capacity: usize,
    /// Capacity of the remaining stage channels (min 1).
    pub queue_capacity: usize,
    /// Capacity of the lifecycle event bus (min 1).
    pub bus_capacity: usize,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `dedup_interval = 10s`
    /// - `report_interval = 10ms`
    /// - `max_report_attempts = 3`
    /// - `admission_retry_interval = 100ms`
    /// - `admission_capacity = 1`
    /// - `queue_capacity = 64`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            dedup_interval: Duration::from_secs(10),
            report_interval: Duration::from_millis(10),
            max_report_attempts: 3,
            admission_retry_interval: Duration::from_millis(100),
            admission_capacity: 1,
            queue_capacity: 64,
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// A value is always attempted at least once.
    pub fn max_report_attempts_clamped(&self) -> u32 {
        self.max_report_attempts.max(1)
    }

    /// Admission channel capacity, clamped to the channel minimum.
    pub fn admission_capacity_clamped(&self) -> usize {
        self.admission_capacity.max(1)
    }

    /// Stage channel capacity, clamped to the channel minimum.
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Bus capacity, clamped to the channel minimum.
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.dedup_interval, Duration::from_secs(10));
        assert_eq!(cfg.report_interval, Duration::from_millis(10));
        assert_eq!(cfg.max_report_attempts, 3);
        assert_eq!(cfg.admission_capacity, 1);
    }

    #[test]
    fn zero_values_are_clamped() {
        let mut cfg = Config::default();
        cfg.max_report_attempts = 0;
        cfg.admission_capacity = 0;
        cfg.queue_capacity = 0;
        cfg.bus_capacity = 0;
        assert_eq!(cfg.max_report_attempts_clamped(), 1);
        assert_eq!(cfg.admission_capacity_clamped(), 1);
        assert_eq!(cfg.queue_capacity_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
