//! # Scheduler stage.
//!
//! Owns the [`Timetable`] and a single reusable timer, and multiplexes three
//! inputs:
//! - **intake** - fresh [`ControlMessage`]s; each is stamped with the next
//!   serial number and inserted
//! - **repeats** - items coming back around (repeater loop-back or dedup
//!   deferral); inserted with their existing serial and threaded state
//! - **timer** - fires when the front entry is due; the entry is handed off
//!   to the dedup gate **without blocking**
//!
//! ## Rules
//! - The timer is re-armed after every event to the front entry's delay and
//!   disarmed while the pending set is empty.
//! - A full admission channel never blocks the loop: the due entry goes back
//!   to the front and the timer re-arms to the handoff retry interval.
//! - Closing the intake channel stops the stage: remaining pending entries
//!   are abandoned and the admission sender is dropped, which starts the
//!   shutdown cascade downstream.

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, Sleep, sleep};

use crate::core::timetable::{InsertOutcome, Timetable};
use crate::events::{Bus, Event, EventKind};
use crate::messages::{ControlMessage, ScheduledItem, StatefulMessage};
use crate::schedule::NowFn;

/// Upper bound for a single timer arm; a capped fire re-arms without
/// dispatching because [`Timetable::pop_due`] re-checks due-ness.
const MAX_ARM: Duration = Duration::from_secs(60 * 60 * 24 * 30);

pub(crate) struct SchedulerParams<K, P, S> {
    pub(crate) intake: mpsc::Receiver<ControlMessage<K, P>>,
    pub(crate) repeats: mpsc::Receiver<ScheduledItem<K, P, S>>,
    pub(crate) admissions: mpsc::Sender<StatefulMessage<K, P, S>>,
    pub(crate) bus: Bus,
    pub(crate) now_fn: NowFn,
    pub(crate) retry_interval: Duration,
}

pub(crate) async fn run_scheduler<K, P, S>(params: SchedulerParams<K, P, S>)
where
    K: Eq + Debug,
{
    let SchedulerParams {
        mut intake,
        mut repeats,
        admissions,
        bus,
        now_fn,
        retry_interval,
    } = params;

    let mut table = Timetable::<K, P, S>::new();
    let timer = sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut armed = false;

    loop {
        tokio::select! {
            m = intake.recv() => {
                let Some(m) = m else { break };
                let now = (now_fn)();
                let label: Arc<str> = format!("{:?}", m.key).into();
                let (serial, outcome) = table.arrive(m, now);
                bus.publish(
                    Event::new(EventKind::MessageAccepted)
                        .with_key(label.clone())
                        .with_serial(serial),
                );
                publish_insert(&bus, &label, serial, &outcome);
                rearm(timer.as_mut(), &mut armed, table.front_delay(now));
            }
            Some(item) = repeats.recv() => {
                let now = (now_fn)();
                let label: Arc<str> = format!("{:?}", item.key).into();
                let serial = item.serial;
                let outcome = table.insert(item, now);
                publish_insert(&bus, &label, serial, &outcome);
                rearm(timer.as_mut(), &mut armed, table.front_delay(now));
            }
            _ = &mut timer, if armed => {
                armed = false;
                let now = (now_fn)();
                if let Some(item) = table.pop_due(now) {
                    let start_at = item.start_at;
                    let msg = StatefulMessage {
                        key: item.key,
                        params: item.params,
                        serial: item.serial,
                        state: item.state,
                    };
                    match admissions.try_send(msg) {
                        Ok(()) => {}
                        Err(TrySendError::Full(m)) => {
                            bus.publish(
                                Event::new(EventKind::HandoffDeferred)
                                    .with_key(format!("{:?}", m.key))
                                    .with_serial(m.serial)
                                    .with_delay(retry_interval),
                            );
                            table.push_front(ScheduledItem {
                                key: m.key,
                                params: m.params,
                                serial: m.serial,
                                state: m.state,
                                start_at,
                            });
                            timer.as_mut().reset(Instant::now() + retry_interval);
                            armed = true;
                            continue;
                        }
                        // Only reachable mid-teardown; the entry is abandoned.
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
                rearm(timer.as_mut(), &mut armed, table.front_delay(now));
            }
        }
    }

    bus.publish(Event::new(EventKind::IntakeClosed));
}

fn publish_insert(bus: &Bus, label: &Arc<str>, serial: u64, outcome: &InsertOutcome) {
    match outcome {
        InsertOutcome::Scheduled { delay, superseded } => {
            if let Some(old) = superseded {
                bus.publish(
                    Event::new(EventKind::ItemSuperseded)
                        .with_key(label.clone())
                        .with_serial(*old),
                );
            }
            bus.publish(
                Event::new(EventKind::ItemScheduled)
                    .with_key(label.clone())
                    .with_serial(serial)
                    .with_delay(*delay),
            );
        }
        InsertOutcome::Stale => {
            bus.publish(
                Event::new(EventKind::StaleItemDropped)
                    .with_key(label.clone())
                    .with_serial(serial),
            );
        }
    }
}

fn rearm(timer: Pin<&mut Sleep>, armed: &mut bool, next: Option<Duration>) {
    match next {
        Some(d) => {
            timer.reset(Instant::now() + d.min(MAX_ARM));
            *armed = true;
        }
        None => *armed = false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn spawn_stage(
        admission_capacity: usize,
        retry_interval: Duration,
    ) -> (
        mpsc::Sender<ControlMessage<&'static str, i32>>,
        mpsc::Sender<ScheduledItem<&'static str, i32, i32>>,
        mpsc::Receiver<StatefulMessage<&'static str, i32, i32>>,
        Bus,
    ) {
        let (intake_tx, intake_rx) = mpsc::channel(8);
        let (repeat_tx, repeat_rx) = mpsc::channel(8);
        let (admission_tx, admission_rx) = mpsc::channel(admission_capacity);
        let bus = Bus::new(64);

        tokio::spawn(run_scheduler(SchedulerParams {
            intake: intake_rx,
            repeats: repeat_rx,
            admissions: admission_tx,
            bus: bus.clone(),
            now_fn: Utc::now,
            retry_interval,
        }));

        (intake_tx, repeat_tx, admission_rx, bus)
    }

    async fn next_event_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = timeout(WAIT, rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bus closed");
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn immediate_messages_flow_to_admission_in_order() {
        let (intake, _repeats, mut admissions, _bus) = spawn_stage(8, Duration::from_millis(100));

        intake.send(ControlMessage::immediate("a", 1)).await.unwrap();
        intake.send(ControlMessage::immediate("b", 2)).await.unwrap();

        let first = timeout(WAIT, admissions.recv()).await.unwrap().unwrap();
        let second = timeout(WAIT, admissions.recv()).await.unwrap().unwrap();
        assert_eq!((first.key, first.serial), ("a", 1));
        assert_eq!((second.key, second.serial), ("b", 2));
        assert!(first.state.is_none());

        drop(intake);
        assert!(timeout(WAIT, admissions.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn busy_handoff_defers_and_retries() {
        let (intake, _repeats, mut admissions, bus) = spawn_stage(1, Duration::from_millis(20));
        let mut events = bus.subscribe();

        intake.send(ControlMessage::immediate("a", 0)).await.unwrap();
        intake.send(ControlMessage::immediate("b", 0)).await.unwrap();

        // "a" fills the capacity-1 channel; "b" cannot be handed off yet.
        let deferred = next_event_of(&mut events, EventKind::HandoffDeferred).await;
        assert_eq!(deferred.serial, Some(2));
        assert_eq!(deferred.delay_ms, Some(20));

        // Draining "a" frees the slot; the retry delivers "b".
        let first = timeout(WAIT, admissions.recv()).await.unwrap().unwrap();
        assert_eq!(first.key, "a");
        let second = timeout(WAIT, admissions.recv()).await.unwrap().unwrap();
        assert_eq!(second.key, "b");
    }

    #[tokio::test]
    async fn repeat_entries_preserve_serial_and_state() {
        let (_intake, repeats, mut admissions, _bus) = spawn_stage(8, Duration::from_millis(100));

        repeats
            .send(ScheduledItem {
                key: "a",
                params: 7,
                serial: 9,
                state: Some(5),
                start_at: Utc::now(),
            })
            .await
            .unwrap();

        let m = timeout(WAIT, admissions.recv()).await.unwrap().unwrap();
        assert_eq!(m.key, "a");
        assert_eq!(m.serial, 9);
        assert_eq!(m.params, 7);
        assert_eq!(m.state, Some(5));
    }

    #[tokio::test]
    async fn stale_repeat_is_dropped_observably() {
        let (_intake, repeats, _admissions, bus) = spawn_stage(8, Duration::from_millis(100));
        let mut events = bus.subscribe();

        let pending = Utc::now() + chrono::Duration::hours(1);
        for serial in [5, 3] {
            repeats
                .send(ScheduledItem {
                    key: "a",
                    params: 0,
                    serial,
                    state: None,
                    start_at: pending,
                })
                .await
                .unwrap();
        }

        let dropped = next_event_of(&mut events, EventKind::StaleItemDropped).await;
        assert_eq!(dropped.serial, Some(3));
        assert_eq!(dropped.key.as_deref(), Some("\"a\""));
    }

    #[tokio::test]
    async fn intake_close_stops_the_stage() {
        let (intake, _repeats, mut admissions, bus) = spawn_stage(8, Duration::from_millis(100));
        let mut events = bus.subscribe();

        drop(intake);

        next_event_of(&mut events, EventKind::IntakeClosed).await;
        assert!(timeout(WAIT, admissions.recv()).await.unwrap().is_none());
    }
}
