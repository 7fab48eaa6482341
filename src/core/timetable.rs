//! # The scheduler's pending set.
//!
//! [`Timetable`] holds every item waiting for its start time, ordered by
//! `start_at` ascending. The scheduler keeps a single timer armed to the
//! front entry and pops entries as they come due.
//!
//! ## Rules
//! - Insertion places an item before the first strictly-later entry, so items
//!   with equal start times keep their insertion order.
//! - At most one entry per key: an incoming item with a **newer** serial
//!   replaces the pending entry for its key; an **older-or-equal** serial is
//!   stale and discarded.
//! - Arrivals are stamped with the next serial number and resolved to a start
//!   time through the injectable resolver; the serial counter advances even
//!   when the arrival turns out stale.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::messages::{ControlMessage, ScheduledItem};
use crate::schedule::{NextStartTime, next_start_time};

/// What [`Timetable::insert`] did with an item.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    /// Inserted; `superseded` carries the serial of a replaced older entry.
    Scheduled {
        /// Time until the entry is due (zero when already overdue).
        delay: Duration,
        /// Serial of the same-key entry this one replaced, if any.
        superseded: Option<u64>,
    },
    /// Discarded: the pending set already holds this key with an equal or
    /// newer serial.
    Stale,
}

/// Time-ordered pending set with serial staleness control.
pub(crate) struct Timetable<K, P, S> {
    entries: VecDeque<ScheduledItem<K, P, S>>,
    resolver: NextStartTime,
    last_serial: u64,
}

impl<K: Eq, P, S> Timetable<K, P, S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            resolver: next_start_time,
            last_serial: 0,
        }
    }

    /// Substitutes the start-time resolver.
    #[cfg(test)]
    pub(crate) fn with_resolver(mut self, resolver: NextStartTime) -> Self {
        self.resolver = resolver;
        self
    }

    /// Stamps an arriving message with the next serial number, resolves its
    /// start time, and inserts it. Returns the stamped serial along with the
    /// insert outcome.
    pub(crate) fn arrive(&mut self, m: ControlMessage<K, P>, now: DateTime<Utc>) -> (u64, InsertOutcome) {
        self.last_serial += 1;
        let serial = self.last_serial;
        let start_at = (self.resolver)(&m.schedule, m.tolerance, now);
        let outcome = self.insert(
            ScheduledItem {
                key: m.key,
                params: m.params,
                serial,
                state: None,
                start_at,
            },
            now,
        );
        (serial, outcome)
    }

    /// Inserts an item that already carries a serial (repeat loop-back or
    /// deferral re-entry).
    pub(crate) fn insert(&mut self, item: ScheduledItem<K, P, S>, now: DateTime<Utc>) -> InsertOutcome {
        let mut superseded = None;
        if let Some(pos) = self.entries.iter().position(|e| e.key == item.key) {
            if item.serial > self.entries[pos].serial {
                superseded = Some(self.entries[pos].serial);
                self.entries.remove(pos);
            } else {
                return InsertOutcome::Stale;
            }
        }

        let at = self
            .entries
            .iter()
            .position(|e| item.start_at < e.start_at)
            .unwrap_or(self.entries.len());
        let delay = until(item.start_at, now);
        self.entries.insert(at, item);
        InsertOutcome::Scheduled { delay, superseded }
    }

    /// Pops the front entry if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: DateTime<Utc>) -> Option<ScheduledItem<K, P, S>> {
        if self.entries.front().is_some_and(|e| e.start_at <= now) {
            return self.entries.pop_front();
        }
        None
    }

    /// Restores an entry to the front after a failed handoff.
    pub(crate) fn push_front(&mut self, item: ScheduledItem<K, P, S>) {
        self.entries.push_front(item);
    }

    /// Time until the front entry is due (zero when overdue), or `None` when
    /// the set is empty and the timer should stay disarmed.
    pub(crate) fn front_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.entries.front().map(|e| until(e.start_at, now))
    }
}

/// `start_at - now`, clamped to zero for overdue instants.
fn until(start_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (start_at - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    type TestTable = Timetable<&'static str, i32, ()>;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 20, 0, 0, 0).unwrap()
    }

    fn entry(key: &'static str, serial: u64, start_at: DateTime<Utc>) -> ScheduledItem<&'static str, i32, ()> {
        ScheduledItem {
            key,
            params: 0,
            serial,
            state: None,
            start_at,
        }
    }

    fn keys(t: &TestTable) -> Vec<&'static str> {
        t.entries.iter().map(|e| e.key).collect()
    }

    fn fixed_resolver(_: &str, _: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(7)
    }

    #[test]
    fn arrivals_are_stamped_in_order() {
        let mut t = TestTable::new();
        let now = base();

        let (s1, o1) = t.arrive(ControlMessage::immediate("a", 0), now);
        let (s2, _) = t.arrive(ControlMessage::immediate("b", 0), now);

        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
        assert_eq!(o1, InsertOutcome::Scheduled { delay: Duration::ZERO, superseded: None });
        assert_eq!(keys(&t), vec!["a", "b"]);
        assert_eq!(t.front_delay(now), Some(Duration::ZERO));
    }

    #[test]
    fn earlier_start_time_sorts_before() {
        let mut t = TestTable::new();
        let now = base();

        t.arrive(ControlMessage::new("a", 0, "0 11 * * *"), now);
        t.arrive(ControlMessage::new("b", 0, "0 10 * * *"), now);

        assert_eq!(keys(&t), vec!["b", "a"]);
        assert_eq!(t.front_delay(now), Some(Duration::from_secs(10 * 3600)));
    }

    #[test]
    fn stale_arrival_is_discarded_but_consumes_a_serial() {
        let mut t = TestTable::new();
        let now = base();
        t.insert(entry("a", 10, now), now);

        let (s1, o1) = t.arrive(ControlMessage::immediate("a", 0), now);
        let (s2, o2) = t.arrive(ControlMessage::immediate("b", 0), now);

        assert_eq!(s1, 1);
        assert_eq!(o1, InsertOutcome::Stale);
        assert_eq!(s2, 2);
        assert!(matches!(o2, InsertOutcome::Scheduled { .. }));
        assert_eq!(keys(&t), vec!["a", "b"]);
        assert_eq!(t.entries[0].serial, 10);
    }

    #[test]
    fn newer_serial_replaces_pending_entry() {
        let mut t = TestTable::new();
        let now = base();
        let later = now + chrono::Duration::seconds(5);

        assert_eq!(
            t.insert(entry("a", 1, now), now),
            InsertOutcome::Scheduled { delay: Duration::ZERO, superseded: None }
        );
        assert_eq!(
            t.insert(entry("a", 2, later), now),
            InsertOutcome::Scheduled { delay: Duration::from_secs(5), superseded: Some(1) }
        );

        assert_eq!(t.entries.len(), 1);
        assert_eq!(t.entries[0].serial, 2);
        assert_eq!(t.entries[0].start_at, later);
    }

    #[test]
    fn older_serial_is_stale() {
        let mut t = TestTable::new();
        let now = base();

        t.insert(entry("a", 2, now), now);
        let outcome = t.insert(entry("a", 1, now + chrono::Duration::seconds(5)), now);

        assert_eq!(outcome, InsertOutcome::Stale);
        assert_eq!(t.entries.len(), 1);
        assert_eq!(t.entries[0].serial, 2);
    }

    #[test]
    fn equal_start_times_keep_insert_order() {
        let mut t = TestTable::new();
        let now = base();

        t.insert(entry("a", 1, now), now);
        t.insert(entry("b", 2, now), now);
        t.insert(entry("c", 3, now), now);

        assert_eq!(keys(&t), vec!["a", "b", "c"]);
    }

    #[test]
    fn pop_due_respects_the_due_boundary() {
        let mut t = TestTable::new();
        let now = base();
        let due_at = now + chrono::Duration::seconds(3);
        t.insert(entry("a", 1, due_at), now);

        assert!(t.pop_due(now).is_none());
        let popped = t.pop_due(due_at).unwrap();
        assert_eq!(popped.key, "a");
        assert!(t.entries.is_empty());
    }

    #[test]
    fn push_front_restores_a_failed_handoff() {
        let mut t = TestTable::new();
        let now = base();
        t.insert(entry("a", 1, now + chrono::Duration::seconds(5)), now);
        t.insert(entry("b", 2, now + chrono::Duration::seconds(3)), now);

        let due = now + chrono::Duration::seconds(3);
        let popped = t.pop_due(due).unwrap();
        assert_eq!(popped.key, "b");

        t.push_front(popped);
        assert_eq!(keys(&t), vec!["b", "a"]);
        assert_eq!(t.front_delay(due), Some(Duration::ZERO));
    }

    #[test]
    fn overdue_entries_report_zero_delay() {
        let mut t = TestTable::new();
        let now = base();
        let outcome = t.insert(entry("a", 1, now - chrono::Duration::seconds(5)), now);

        assert_eq!(outcome, InsertOutcome::Scheduled { delay: Duration::ZERO, superseded: None });
        assert_eq!(t.front_delay(now), Some(Duration::ZERO));
    }

    #[test]
    fn resolver_is_injectable() {
        let mut t = TestTable::new().with_resolver(fixed_resolver);
        let now = base();

        let (_, outcome) = t.arrive(ControlMessage::new("a", 0, "whatever"), now);

        assert_eq!(outcome, InsertOutcome::Scheduled { delay: Duration::from_secs(7), superseded: None });
    }
}
