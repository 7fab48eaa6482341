//! # Reporter stage.
//!
//! Single task that delivers produced values to the caller-supplied sink and
//! owns the FIFO retry queue.
//!
//! ## Rules
//! - A fresh value is attempted immediately; failure queues it with
//!   `attempt = 1` and arms the retry timer.
//! - Each timer tick retries the **oldest** queued entry. An entry whose
//!   attempt count already reached the bound is dropped without another sink
//!   call, observable as a `ReportDropped` event.
//! - A persistently failing sink is therefore called exactly `max_attempts`
//!   times per value; the first success is terminal.
//! - When the report channel closes, the stage drains the queue with the
//!   same pacing and the same bound before exiting, so shutdown waits for
//!   retries but never waits forever.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use crate::control::ReporterRef;
use crate::events::{Bus, Event, EventKind};
use crate::messages::ReportInfo;

/// Retry-queue entry: a value plus the number of sink calls already made.
struct ReportAttempt<K, V> {
    key: K,
    value: V,
    attempt: u32,
}

pub(crate) struct ReporterParams<K, V> {
    pub(crate) reports: mpsc::Receiver<ReportInfo<K, V>>,
    pub(crate) reporter: ReporterRef<K, V>,
    pub(crate) bus: Bus,
    pub(crate) report_interval: Duration,
    /// Already clamped to at least 1 by the assembly.
    pub(crate) max_attempts: u32,
}

// The sink's boxed futures borrow the queued entry across awaits, so both
// type parameters need `'static` here.
pub(crate) async fn run_reporter<K, V>(params: ReporterParams<K, V>)
where
    K: Debug + 'static,
    V: 'static,
{
    let ReporterParams {
        mut reports,
        reporter,
        bus,
        report_interval,
        max_attempts,
    } = params;

    let mut queue: VecDeque<ReportAttempt<K, V>> = VecDeque::new();
    let timer = sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut armed = false;

    loop {
        tokio::select! {
            m = reports.recv() => {
                let Some(info) = m else { break };
                match reporter.report(&info.key, &info.value).await {
                    Ok(()) => {
                        bus.publish(
                            Event::new(EventKind::ReportDelivered)
                                .with_key(format!("{:?}", info.key))
                                .with_attempt(1),
                        );
                    }
                    Err(err) => {
                        bus.publish(
                            Event::new(EventKind::ReportRetried)
                                .with_key(format!("{:?}", info.key))
                                .with_attempt(1)
                                .with_reason(err.as_message()),
                        );
                        queue.push_back(ReportAttempt {
                            key: info.key,
                            value: info.value,
                            attempt: 1,
                        });
                        timer.as_mut().reset(Instant::now() + report_interval);
                        armed = true;
                    }
                }
            }
            _ = &mut timer, if armed => {
                armed = false;
                retry_oldest(&mut queue, &reporter, &bus, max_attempts).await;
                if !queue.is_empty() {
                    timer.as_mut().reset(Instant::now() + report_interval);
                    armed = true;
                }
            }
        }
    }

    // The report channel closed; flush what is still queued.
    while !queue.is_empty() {
        sleep(report_interval).await;
        retry_oldest(&mut queue, &reporter, &bus, max_attempts).await;
    }
}

/// Pops the oldest entry and either drops it (bound reached) or calls the
/// sink once more, re-enqueueing on failure.
async fn retry_oldest<K, V>(
    queue: &mut VecDeque<ReportAttempt<K, V>>,
    reporter: &ReporterRef<K, V>,
    bus: &Bus,
    max_attempts: u32,
) where
    K: Debug + 'static,
    V: 'static,
{
    let Some(entry) = queue.pop_front() else { return };

    if entry.attempt >= max_attempts {
        bus.publish(
            Event::new(EventKind::ReportDropped)
                .with_key(format!("{:?}", entry.key))
                .with_attempt(entry.attempt)
                .with_reason("attempt bound exhausted"),
        );
        return;
    }

    let attempt = entry.attempt + 1;
    match reporter.report(&entry.key, &entry.value).await {
        Ok(()) => {
            bus.publish(
                Event::new(EventKind::ReportDelivered)
                    .with_key(format!("{:?}", entry.key))
                    .with_attempt(attempt),
            );
        }
        Err(err) => {
            bus.publish(
                Event::new(EventKind::ReportRetried)
                    .with_key(format!("{:?}", entry.key))
                    .with_attempt(attempt)
                    .with_reason(err.as_message()),
            );
            queue.push_back(ReportAttempt { attempt, ..entry });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use crate::control::ReporterFn;
    use crate::error::ReportError;

    const WAIT: Duration = Duration::from_secs(2);

    /// Sink that fails its first `fail_times` calls and succeeds afterwards.
    fn flaky_sink(fail_times: u32) -> (ReporterRef<&'static str, i32>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let sink: ReporterRef<&'static str, i32> =
            ReporterFn::arc(move |_key: &'static str, _value: i32| {
                let seen = seen.clone();
                async move {
                    let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= fail_times {
                        Err(ReportError::unavailable(format!("attempt {n} refused")))
                    } else {
                        Ok(())
                    }
                }
            });
        (sink, calls)
    }

    fn spawn_stage(
        sink: ReporterRef<&'static str, i32>,
        max_attempts: u32,
    ) -> (
        mpsc::Sender<ReportInfo<&'static str, i32>>,
        Bus,
        JoinHandle<()>,
    ) {
        let (report_tx, report_rx) = mpsc::channel(10);
        let bus = Bus::new(64);
        let stage = tokio::spawn(run_reporter(ReporterParams {
            reports: report_rx,
            reporter: sink,
            bus: bus.clone(),
            report_interval: Duration::from_millis(5),
            max_attempts,
        }));
        (report_tx, bus, stage)
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
    async fn first_delivery_needs_no_timer() {
        let (sink, calls) = flaky_sink(0);
        let (reports, bus, _stage) = spawn_stage(sink, 3);
        let mut events = bus.subscribe();

        reports.send(ReportInfo { key: "a", value: 1 }).await.unwrap();

        let delivered = next_event_of(&mut events, EventKind::ReportDelivered).await;
        assert_eq!(delivered.attempt, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_sink_is_called_exactly_max_attempts_times() {
        let (sink, calls) = flaky_sink(u32::MAX);
        let (reports, bus, _stage) = spawn_stage(sink, 3);
        let mut events = bus.subscribe();

        reports.send(ReportInfo { key: "a", value: 1 }).await.unwrap();

        let dropped = next_event_of(&mut events, EventKind::ReportDropped).await;
        assert_eq!(dropped.attempt, Some(3));
        assert_eq!(dropped.key.as_deref(), Some("\"a\""));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // The drop is terminal: no further calls happen afterwards.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn success_is_terminal_for_a_value() {
        let (sink, calls) = flaky_sink(1);
        let (reports, bus, _stage) = spawn_stage(sink, 5);
        let mut events = bus.subscribe();

        reports.send(ReportInfo { key: "a", value: 1 }).await.unwrap();

        let delivered = next_event_of(&mut events, EventKind::ReportDelivered).await;
        assert_eq!(delivered.attempt, Some(2));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_drains_the_retry_queue() {
        let (sink, calls) = flaky_sink(2);
        let (reports, bus, stage) = spawn_stage(sink, 5);
        let mut events = bus.subscribe();

        reports.send(ReportInfo { key: "a", value: 1 }).await.unwrap();
        drop(reports);

        stage.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let delivered = next_event_of(&mut events, EventKind::ReportDelivered).await;
        assert_eq!(delivered.attempt, Some(3));
    }

    #[tokio::test]
    async fn empty_queue_exits_immediately_on_close() {
        let (sink, _calls) = flaky_sink(0);
        let (reports, _bus, stage) = spawn_stage(sink, 3);

        drop(reports);
        timeout(WAIT, stage).await.unwrap().unwrap();
    }
}
