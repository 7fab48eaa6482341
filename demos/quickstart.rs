//! # Example: quickstart
//!
//! Minimal example of a keyed control loop: two sensors polled a few rounds
//! each, with their summaries delivered to a closure sink.
//!
//! Demonstrates how to:
//! - Define a reconcile function with [`ControllerFn`].
//! - Thread state between invocations of the same key.
//! - Loop a key with `Directive::with_next_run` and stop when done.
//! - Feed the pipeline through the [`intake`] handle and drain it.
//!
//! ## Flow
//! ```text
//! submit("sensor-a"), submit("sensor-b")
//!     ├─► scheduler (both due immediately)
//!     ├─► dedup gate ─► caller pool ─► poll(key, interval, state)
//!     │        round < 3 ─► Directive{ state: round, next_run: now + interval }
//!     │        round = 3 ─► Directive{ value: summary }
//!     └─► reporter ─► println sink
//!
//! drop(handle) ─► shutdown cascade ─► pipeline.wait() returns
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example quickstart
//! ```

use std::time::Duration;

use chrono::Utc;
use loopvisor::{
    Config, ControlLoop, ControlMessage, ControllerFn, ControllerRef, Directive, ReportError,
    ReporterFn, ReporterRef, intake,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Build the engine (defaults are fine here)
    let engine = ControlLoop::builder(Config::default()).build();

    // 2. The reconcile function: three polling rounds per sensor
    let poll: ControllerRef<String, u32, u32, String> =
        ControllerFn::arc(|key: String, interval_ms: u32, state: Option<u32>| async move {
            let round = state.unwrap_or(0) + 1;
            println!("[{key}] polling round {round}");
            if round < 3 {
                let next = Utc::now() + chrono::Duration::milliseconds(i64::from(interval_ms));
                Directive::<u32, String>::idle()
                    .with_state(round)
                    .with_next_run(next)
            } else {
                Directive::<u32, String>::idle()
                    .with_value(format!("finished after {round} rounds"))
            }
        });

    // 3. The delivery sink: plain stdout
    let sink: ReporterRef<String, String> =
        ReporterFn::arc(|key: String, summary: String| async move {
            println!("[{key}] report: {summary}");
            Ok::<_, ReportError>(())
        });

    // 4. Wire a pipeline with two workers
    let (handle, rx) = intake::<String, u32>(16);
    let pipeline = engine.spawn(poll, sink, 2, rx, Utc::now);

    // 5. Two sensors on slightly different rhythms
    handle
        .submit(ControlMessage::immediate("sensor-a".to_string(), 200))
        .await?;
    handle
        .submit(ControlMessage::immediate("sensor-b".to_string(), 300))
        .await?;

    // 6. Give the loops time to finish their rounds, then drain
    tokio::time::sleep(Duration::from_secs(2)).await;
    drop(handle);
    pipeline.wait().await;

    println!("all sensors reported");
    Ok(())
}
