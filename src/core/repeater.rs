//! # Repeater stage.
//!
//! Routes each answer to its destinations, and both may apply to the same
//! answer:
//! - a `next_run` loops the key back to the scheduler as a new pending entry,
//!   carrying the answer's serial and threaded state
//! - a `value` goes to the reporter
//!
//! An answer with neither terminates the key's loop here.

use std::fmt::Debug;

use tokio::sync::mpsc;

use crate::events::{Bus, Event, EventKind};
use crate::messages::{Answer, ReportInfo, ScheduledItem};

pub(crate) struct RepeaterParams<K, P, S, V> {
    pub(crate) routed: mpsc::Receiver<Answer<K, P, S, V>>,
    pub(crate) repeats: mpsc::Sender<ScheduledItem<K, P, S>>,
    pub(crate) reports: mpsc::Sender<ReportInfo<K, V>>,
    pub(crate) bus: Bus,
}

pub(crate) async fn run_repeater<K, P, S, V>(params: RepeaterParams<K, P, S, V>)
where
    K: Clone + Debug,
{
    let RepeaterParams {
        mut routed,
        repeats,
        reports,
        bus,
    } = params;

    while let Some(answer) = routed.recv().await {
        let Answer {
            key,
            params,
            serial,
            state,
            value,
            next_run,
        } = answer;

        if let Some(start_at) = next_run {
            bus.publish(
                Event::new(EventKind::RepeatScheduled)
                    .with_key(format!("{key:?}"))
                    .with_serial(serial),
            );
            let item = ScheduledItem {
                key: key.clone(),
                params,
                serial,
                state,
                start_at,
            };
            // Fails fast once the scheduler is gone; the loop-back is then
            // discarded as part of teardown.
            let _ = repeats.send(item).await;
        }

        if let Some(value) = value {
            let _ = reports.send(ReportInfo { key, value }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use chrono::Utc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    type TestAnswer = Answer<&'static str, i32, i32, i32>;

    fn spawn_stage() -> (
        mpsc::Sender<TestAnswer>,
        mpsc::Receiver<ScheduledItem<&'static str, i32, i32>>,
        mpsc::Receiver<ReportInfo<&'static str, i32>>,
    ) {
        let (routed_tx, routed_rx) = mpsc::channel(10);
        let (repeat_tx, repeat_rx) = mpsc::channel(10);
        let (report_tx, report_rx) = mpsc::channel(10);

        tokio::spawn(run_repeater(RepeaterParams {
            routed: routed_rx,
            repeats: repeat_tx,
            reports: report_tx,
            bus: Bus::new(16),
        }));

        (routed_tx, repeat_rx, report_rx)
    }

    #[tokio::test]
    async fn answers_fan_out_to_their_destinations() {
        let (routed, mut repeat_rx, mut report_rx) = spawn_stage();
        let run_at = Utc::now();

        let answers = [
            TestAnswer { key: "a", params: 0, serial: 1, state: Some(7), value: None, next_run: Some(run_at) },
            TestAnswer { key: "b", params: 1, serial: 2, state: None, value: None, next_run: Some(run_at) },
            TestAnswer { key: "c", params: 2, serial: 3, state: None, value: Some(10), next_run: None },
            TestAnswer { key: "d", params: 3, serial: 4, state: None, value: Some(20), next_run: None },
        ];
        for answer in answers {
            routed.send(answer).await.unwrap();
        }
        drop(routed);

        let mut repeated = Vec::new();
        while let Some(item) = timeout(WAIT, repeat_rx.recv()).await.unwrap() {
            repeated.push(item);
        }
        assert_eq!(repeated.len(), 2);
        assert_eq!((repeated[0].key, repeated[0].serial, repeated[0].state), ("a", 1, Some(7)));
        assert_eq!(repeated[0].start_at, run_at);

        let mut reported = Vec::new();
        while let Some(info) = timeout(WAIT, report_rx.recv()).await.unwrap() {
            reported.push((info.key, info.value));
        }
        assert_eq!(reported, vec![("c", 10), ("d", 20)]);
    }

    #[tokio::test]
    async fn one_answer_can_repeat_and_report() {
        let (routed, mut repeat_rx, mut report_rx) = spawn_stage();
        let run_at = Utc::now();

        routed
            .send(TestAnswer {
                key: "a",
                params: 0,
                serial: 5,
                state: Some(1),
                value: Some(99),
                next_run: Some(run_at),
            })
            .await
            .unwrap();

        let item = timeout(WAIT, repeat_rx.recv()).await.unwrap().unwrap();
        assert_eq!((item.key, item.serial, item.state), ("a", 5, Some(1)));

        let info = timeout(WAIT, report_rx.recv()).await.unwrap().unwrap();
        assert_eq!((info.key, info.value), ("a", 99));
    }
}
