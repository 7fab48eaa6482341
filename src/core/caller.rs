//! # Caller pool worker.
//!
//! Every worker runs [`run_caller`] over the same shared admission receiver:
//! whichever worker is idle takes the receiver lock and gets the next
//! message, so messages enter the pool in arrival order while invocations
//! for different keys overlap up to the pool size.
//!
//! ## Rules
//! - The receiver lock is held only across `recv`, never across the
//!   controller invocation.
//! - Each worker owns a clone of the answer sender; the last worker to exit
//!   drops the last clone, which closes Dedup-Out's input and lets the
//!   shutdown cascade continue.
//! - The controller call is not supervised: no timeout, no cancellation. A
//!   hung or panicking invocation costs the pool one worker.

use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::control::ControllerRef;
use crate::events::{Bus, Event, EventKind};
use crate::messages::{Answer, StatefulMessage};

pub(crate) struct CallerParams<K, P, S, V> {
    pub(crate) pool: Arc<Mutex<mpsc::Receiver<StatefulMessage<K, P, S>>>>,
    pub(crate) answers: mpsc::Sender<Answer<K, P, S, V>>,
    pub(crate) controller: ControllerRef<K, P, S, V>,
    pub(crate) bus: Bus,
}

// Derived `Clone` would demand `Clone` from every type parameter; the fields
// are all handles that clone regardless.
impl<K, P, S, V> Clone for CallerParams<K, P, S, V> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            answers: self.answers.clone(),
            controller: self.controller.clone(),
            bus: self.bus.clone(),
        }
    }
}

// The controller's boxed futures may hold the arguments across awaits, so
// every type parameter needs `'static` here.
pub(crate) async fn run_caller<K, P, S, V>(params: CallerParams<K, P, S, V>)
where
    K: Clone + Debug + 'static,
    P: Clone + 'static,
    S: 'static,
    V: 'static,
{
    let CallerParams {
        pool,
        answers,
        controller,
        bus,
    } = params;

    loop {
        let next = {
            let mut rx = pool.lock().await;
            rx.recv().await
        };
        let Some(m) = next else { break };
        let StatefulMessage {
            key,
            params,
            serial,
            state,
        } = m;

        let directive = controller.reconcile(key.clone(), params.clone(), state).await;
        bus.publish(
            Event::new(EventKind::ControllerDone)
                .with_key(format!("{key:?}"))
                .with_serial(serial),
        );

        let answer = Answer {
            key,
            params,
            serial,
            state: directive.state,
            value: directive.value,
            next_run: directive.next_run,
        };
        if answers.send(answer).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::control::{ControllerFn, Directive};

    const WAIT: Duration = Duration::from_secs(2);

    fn counting_controller() -> ControllerRef<&'static str, i32, i32, String> {
        ControllerFn::arc(|key: &'static str, params: i32, state: Option<i32>| async move {
            let n = state.unwrap_or(0) + 1;
            Directive::<i32, String>::idle()
                .with_state(n)
                .with_value(format!("{key}:{params}:{n}"))
        })
    }

    #[tokio::test]
    async fn worker_wraps_directives_into_answers() {
        let (pool_tx, pool_rx) = mpsc::channel(8);
        let (answer_tx, mut answer_rx) = mpsc::channel(8);
        let params = CallerParams {
            pool: Arc::new(Mutex::new(pool_rx)),
            answers: answer_tx,
            controller: counting_controller(),
            bus: Bus::new(16),
        };
        tokio::spawn(run_caller(params));

        pool_tx
            .send(StatefulMessage {
                key: "a",
                params: 7,
                serial: 3,
                state: Some(41),
            })
            .await
            .unwrap();

        let answer = timeout(WAIT, answer_rx.recv()).await.unwrap().unwrap();
        assert_eq!(answer.key, "a");
        assert_eq!(answer.params, 7);
        assert_eq!(answer.serial, 3);
        assert_eq!(answer.state, Some(42));
        assert_eq!(answer.value.as_deref(), Some("a:7:42"));
        assert!(answer.next_run.is_none());

        // Closing the pool ends the worker, which closes the answer channel.
        drop(pool_tx);
        assert!(timeout(WAIT, answer_rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workers_share_one_admission_stream() {
        let (pool_tx, pool_rx) = mpsc::channel(8);
        let (answer_tx, mut answer_rx) = mpsc::channel(8);
        let base = CallerParams {
            pool: Arc::new(Mutex::new(pool_rx)),
            answers: answer_tx,
            controller: counting_controller(),
            bus: Bus::new(16),
        };
        for _ in 0..2 {
            tokio::spawn(run_caller(base.clone()));
        }
        drop(base);

        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            pool_tx
                .send(StatefulMessage {
                    key,
                    params: i as i32,
                    serial: i as u64 + 1,
                    state: None,
                })
                .await
                .unwrap();
        }
        drop(pool_tx);

        let mut seen = HashSet::new();
        while let Some(answer) = timeout(WAIT, answer_rx.recv()).await.unwrap() {
            seen.insert(answer.key);
        }
        assert_eq!(seen, HashSet::from(["a", "b", "c"]));
    }
}
