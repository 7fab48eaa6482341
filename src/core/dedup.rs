//! # Dedup gate: the in-flight lock around the caller pool.
//!
//! Two small stages share one key set:
//! - **Dedup-In** sits before the pool. A free key is locked and the message
//!   forwarded; a locked key means the message is **deferred, never
//!   dropped**: it goes back to the scheduler with a start time one dedup
//!   interval from now, keeping its serial and threaded state.
//! - **Dedup-Out** sits after the pool. It unlocks the key of every answer
//!   and forwards the answer to the repeater.
//!
//! Between the lock and the unlock no second message for the same key passes
//! Dedup-In, which is what makes controller invocations per key mutually
//! exclusive. The unlock happens strictly after the controller returned and
//! its answer reached Dedup-Out.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::events::{Bus, Event, EventKind};
use crate::messages::{Answer, ScheduledItem, StatefulMessage};
use crate::schedule::{NowFn, shift_forward};

/// Keys currently holding the in-flight lock, shared by both gate stages.
pub(crate) type InFlight<K> = Arc<Mutex<HashSet<K>>>;

pub(crate) struct DedupInParams<K, P, S> {
    pub(crate) admissions: mpsc::Receiver<StatefulMessage<K, P, S>>,
    pub(crate) pool: mpsc::Sender<StatefulMessage<K, P, S>>,
    pub(crate) repeats: mpsc::Sender<ScheduledItem<K, P, S>>,
    pub(crate) in_flight: InFlight<K>,
    pub(crate) bus: Bus,
    pub(crate) now_fn: NowFn,
    pub(crate) dedup_interval: Duration,
}

pub(crate) async fn run_dedup_in<K, P, S>(params: DedupInParams<K, P, S>)
where
    K: Eq + Hash + Clone + Debug,
{
    let DedupInParams {
        mut admissions,
        pool,
        repeats,
        in_flight,
        bus,
        now_fn,
        dedup_interval,
    } = params;

    while let Some(m) = admissions.recv().await {
        let newly_locked = in_flight.lock().await.insert(m.key.clone());
        if !newly_locked {
            bus.publish(
                Event::new(EventKind::AdmissionDeferred)
                    .with_key(format!("{:?}", m.key))
                    .with_serial(m.serial)
                    .with_delay(dedup_interval),
            );
            let item = ScheduledItem {
                key: m.key,
                params: m.params,
                serial: m.serial,
                state: m.state,
                start_at: shift_forward((now_fn)(), dedup_interval),
            };
            // Fails fast once the scheduler is gone; the deferral is then
            // discarded as part of teardown.
            let _ = repeats.send(item).await;
            continue;
        }

        let label = format!("{:?}", m.key);
        let serial = m.serial;
        if pool.send(m).await.is_err() {
            break;
        }
        bus.publish(
            Event::new(EventKind::AdmissionGranted)
                .with_key(label)
                .with_serial(serial),
        );
    }
}

pub(crate) struct DedupOutParams<K, P, S, V> {
    pub(crate) answers: mpsc::Receiver<Answer<K, P, S, V>>,
    pub(crate) routed: mpsc::Sender<Answer<K, P, S, V>>,
    pub(crate) in_flight: InFlight<K>,
    pub(crate) bus: Bus,
}

pub(crate) async fn run_dedup_out<K, P, S, V>(params: DedupOutParams<K, P, S, V>)
where
    K: Eq + Hash + Debug,
{
    let DedupOutParams {
        mut answers,
        routed,
        in_flight,
        bus,
    } = params;

    while let Some(answer) = answers.recv().await {
        in_flight.lock().await.remove(&answer.key);
        bus.publish(
            Event::new(EventKind::AdmissionReleased)
                .with_key(format!("{:?}", answer.key))
                .with_serial(answer.serial),
        );
        if routed.send(answer).await.is_err() {
            break;
        }
    }
}
