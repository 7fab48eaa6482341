//! # ControlLoop: assembles the pipeline stages, fan-out delivery, and the shutdown cascade.
//!
//! The [`ControlLoop`] owns the event bus, a [`SubscriberSet`], and the engine
//! configuration. [`ControlLoop::spawn`] wires the stage tasks together with
//! bounded channels and returns a [`LoopHandle`] for observing completion.
//!
//! ## Key responsibilities
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - spawn the stage tasks with the channel capacities from [`Config`]
//! - share one in-flight key set between the two halves of the dedup gate
//! - tie shutdown to intake closure so the cascade drains in pipeline order
//!
//! ## High-level architecture
//! ```text
//! Inputs to spawn():
//!   ControllerRef, ReporterRef, num_workers, intake Receiver, NowFn
//!
//! Wiring:
//!                      ┌──────────────[ repeats ]──────────────────┐
//!                      ▼                                           │
//!   [ intake ] ──► scheduler ──[ admissions ]──► dedup-in ─────────┤ (defer)
//!                      ▲                             │             │
//!                      │                         [ pool ]          │
//!                      │                             ▼             │
//!                      │                    caller × num_workers   │
//!                      │                             │             │
//!                      │                        [ answers ]        │
//!                      │                             ▼             │
//!                      │                         dedup-out         │
//!                      │                             │             │
//!                      │                         [ routed ]        │
//!                      └──[ repeats ]──── repeater ◄─┘             │
//!                                            │                     │
//!                                       [ reports ]                │
//!                                            ▼                     │
//!                                        reporter ──► ReporterRef  │
//!
//! Event flow:
//!   stages ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit(&Event)
//!                                                  ┌─────────┬─────────┐
//!                                                  ▼         ▼         ▼
//!                                           [queue S1] [queue S2] ... [queue SN]
//!                                                  │         │         │
//!                                           worker S1  worker S2 ... worker SN
//!                                                  │         │         │
//!                                         sub.on_event(&Event) (per subscriber)
//!
//! Shutdown cascade (triggered by dropping every IntakeHandle):
//!   intake closes → scheduler exits (pending entries abandoned)
//!     → admissions closes → dedup-in exits
//!     → pool closes → callers finish in-flight work and exit
//!     → answers closes → dedup-out exits
//!     → routed closes → repeater exits
//!     → reports closes → reporter drains its retry queue and exits
//!   LoopHandle::wait() joins the stages in that order, then publishes
//!   PipelineDrained.
//!
//! Subscriber teardown (ControlLoop::close, after every pipeline drained):
//!   engine's bus sender drops → listener exits on Closed
//!     → subscriber lanes close → workers drain their queues and exit
//! ```
//!
//! ## Example
//! ```rust
//! use chrono::Utc;
//! use loopvisor::{
//!     Config, ControlLoop, ControlMessage, ControllerFn, ControllerRef, Directive,
//!     ReportError, ReporterFn, ReporterRef, intake,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let engine = ControlLoop::builder(Config::default()).build();
//!
//!     let controller: ControllerRef<String, u64, u64, String> =
//!         ControllerFn::arc(|key: String, step: u64, state: Option<u64>| async move {
//!             let total = state.unwrap_or(0) + step;
//!             Directive::<u64, String>::idle()
//!                 .with_state(total)
//!                 .with_value(format!("{key}={total}"))
//!         });
//!
//!     let sink: ReporterRef<String, String> =
//!         ReporterFn::arc(|_key: String, line: String| async move {
//!             println!("{line}");
//!             Ok::<_, ReportError>(())
//!         });
//!
//!     let (handle, rx) = intake::<String, u64>(16);
//!     let pipeline = engine.spawn(controller, sink, 4, rx, Utc::now);
//!
//!     handle
//!         .submit(ControlMessage::immediate("counter".to_string(), 2))
//!         .await
//!         .unwrap();
//!
//!     drop(handle);
//!     pipeline.wait().await;
//!     engine.close().await;
//! }
//! ```

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::control::{ControllerRef, ReporterRef};
use crate::core::{
    builder::ControlLoopBuilder,
    caller::{CallerParams, run_caller},
    config::Config,
    dedup::{DedupInParams, DedupOutParams, InFlight, run_dedup_in, run_dedup_out},
    handle::LoopHandle,
    repeater::{RepeaterParams, run_repeater},
    reporter::{ReporterParams, run_reporter},
    scheduler::{SchedulerParams, run_scheduler},
};
use crate::events::{Bus, Event};
use crate::messages::ControlMessage;
use crate::schedule::NowFn;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Assembles pipelines and fans events out to subscribers.
///
/// One `ControlLoop` normally drives one pipeline; spawning several shares
/// the bus and the subscriber set between them.
pub struct ControlLoop {
    /// Engine configuration applied to every spawned pipeline.
    pub cfg: Config,
    /// Event bus shared with all stages.
    pub bus: Bus,
    /// Fan-out set for subscribers.
    pub subs: Arc<SubscriberSet>,
    /// Bus-to-subscribers forwarding task, joined by [`ControlLoop::close`].
    listener: Option<JoinHandle<()>>,
}

impl ControlLoop {
    /// Starts building a `ControlLoop` with the given configuration.
    pub fn builder(cfg: Config) -> ControlLoopBuilder {
        ControlLoopBuilder::new(cfg)
    }

    /// Creates a control loop with the given config and subscribers.
    ///
    /// Must run inside a tokio runtime: the subscriber workers and the bus
    /// listener start here.
    pub fn new(cfg: Config, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(subscribers));
        let listener = if subs.is_empty() {
            None
        } else {
            Some(subscriber_listener(bus.subscribe(), Arc::clone(&subs)))
        };
        Self { cfg, bus, subs, listener }
    }

    /// Wires the stages together and starts them.
    ///
    /// `num_workers` is clamped to at least 1 and bounds how many controller
    /// invocations run concurrently (always at most one per key). The intake
    /// receiver usually comes from [`intake`](crate::intake); dropping every
    /// sending handle closes it and starts the shutdown cascade.
    ///
    /// `now_fn` supplies the wall clock for schedule resolution; pass
    /// [`Utc::now`](chrono::Utc::now) outside of tests.
    pub fn spawn<K, P, S, V>(
        &self,
        controller: ControllerRef<K, P, S, V>,
        reporter: ReporterRef<K, V>,
        num_workers: usize,
        intake: mpsc::Receiver<ControlMessage<K, P>>,
        now_fn: NowFn,
    ) -> LoopHandle
    where
        K: Eq + Hash + Clone + Debug + Send + 'static,
        P: Clone + Send + 'static,
        S: Send + 'static,
        V: Send + 'static,
    {
        let queue = self.cfg.queue_capacity_clamped();
        let workers = num_workers.max(1);

        let (repeat_tx, repeat_rx) = mpsc::channel(queue);
        let (admission_tx, admission_rx) = mpsc::channel(self.cfg.admission_capacity_clamped());
        let (pool_tx, pool_rx) = mpsc::channel(queue);
        let (answer_tx, answer_rx) = mpsc::channel(queue);
        let (routed_tx, routed_rx) = mpsc::channel(queue);
        let (report_tx, report_rx) = mpsc::channel(queue);

        let in_flight: InFlight<K> = Arc::new(Mutex::new(HashSet::new()));

        // Join order below matches the shutdown cascade.
        let mut stages = Vec::with_capacity(workers + 5);

        stages.push(tokio::spawn(run_scheduler(SchedulerParams {
            intake,
            repeats: repeat_rx,
            admissions: admission_tx,
            bus: self.bus.clone(),
            now_fn,
            retry_interval: self.cfg.admission_retry_interval,
        })));

        stages.push(tokio::spawn(run_dedup_in(DedupInParams {
            admissions: admission_rx,
            pool: pool_tx,
            repeats: repeat_tx.clone(),
            in_flight: in_flight.clone(),
            bus: self.bus.clone(),
            now_fn,
            dedup_interval: self.cfg.dedup_interval,
        })));

        let base = CallerParams {
            pool: Arc::new(Mutex::new(pool_rx)),
            answers: answer_tx,
            controller,
            bus: self.bus.clone(),
        };
        for _ in 0..workers {
            stages.push(tokio::spawn(run_caller(base.clone())));
        }
        // The answers channel must close when the last worker exits.
        drop(base);

        stages.push(tokio::spawn(run_dedup_out(DedupOutParams {
            answers: answer_rx,
            routed: routed_tx,
            in_flight,
            bus: self.bus.clone(),
        })));

        stages.push(tokio::spawn(run_repeater(RepeaterParams {
            routed: routed_rx,
            repeats: repeat_tx,
            reports: report_tx,
            bus: self.bus.clone(),
        })));

        stages.push(tokio::spawn(run_reporter(ReporterParams {
            reports: report_rx,
            reporter,
            bus: self.bus.clone(),
            report_interval: self.cfg.report_interval,
            max_attempts: self.cfg.max_report_attempts_clamped(),
        })));

        LoopHandle::new(stages, self.bus.clone())
    }

    /// Ends the engine's subscriber side.
    ///
    /// Drops the engine's bus sender, which closes the bus once every
    /// pipeline spawned from this engine has drained (so call this after
    /// [`LoopHandle::wait`] — before that it waits for the pipelines too).
    /// The listener then exits, the subscriber lanes close, and the workers
    /// finish their queues: even a slow subscriber still sees every event
    /// published before the drain, the final
    /// [`PipelineDrained`](crate::EventKind::PipelineDrained) included.
    ///
    /// An engine that is simply dropped instead leaves the subscriber workers
    /// to the runtime; trailing events may then go unhandled.
    pub async fn close(self) {
        let Self { bus, subs, listener, .. } = self;
        drop(bus);
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        // The listener held the only other handle to the set; a caller who
        // kept extra clones keeps the workers running instead.
        if let Ok(set) = Arc::try_unwrap(subs) {
            set.shutdown().await;
        }
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
fn subscriber_listener(mut rx: broadcast::Receiver<Event>, set: Arc<SubscriberSet>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
