//! # Example: reporting
//!
//! Demonstrates the reporter's bounded retry loop and the built-in
//! [`LogWriter`] subscriber.
//!
//! Shows how to:
//! - Attach [`LogWriter`] through the builder to watch lifecycle events.
//! - Return [`ReportError`] from a sink and let the engine retry.
//! - Drain queued retries during shutdown instead of losing them.
//!
//! ## Flow
//! ```text
//! submit("alpha")
//!     ├─► scheduler ─► dedup gate ─► controller ─► value
//!     └─► reporter ─► sink (down twice)
//!           ├─► attempt 1 ─► Err ─► queued    [report-retry]
//!           ├─► attempt 2 ─► Err ─► queued    [report-retry]   (in shutdown drain)
//!           └─► attempt 3 ─► Ok              [report-ok]
//! ```
//!
//! ## Run
//! Requires the `logging` feature to export [`LogWriter`].
//! ```bash
//! cargo run --example reporting --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use loopvisor::{
    Config, ControlLoop, ControlMessage, ControllerFn, ControllerRef, Directive, LogWriter,
    ReportError, ReporterFn, ReporterRef, intake,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Slower retry pacing so the log lines are easy to follow
    let mut cfg = Config::default();
    cfg.report_interval = Duration::from_millis(200);
    cfg.max_report_attempts = 5;

    // 2. Attach the stdout logger to watch the pipeline work
    let engine = ControlLoop::builder(cfg)
        .with_subscriber(Arc::new(LogWriter::new()))
        .build();

    // 3. A controller that produces one value per key
    let controller: ControllerRef<String, (), (), String> =
        ControllerFn::arc(|key: String, _params: (), _state: Option<()>| async move {
            Directive::<(), String>::idle().with_value(format!("payload from {key}"))
        });

    // 4. A sink that stays down for the first two calls
    let calls = Arc::new(AtomicU32::new(0));
    let sink: ReporterRef<String, String> = ReporterFn::arc(move |key: String, value: String| {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 2 {
                println!("[sink] attempt {n} for {key}: still down");
                Err(ReportError::unavailable("endpoint down"))
            } else {
                println!("[sink] delivered {key}: {value}");
                Ok(())
            }
        }
    });

    let (handle, rx) = intake::<String, ()>(8);
    let pipeline = engine.spawn(controller, sink, 1, rx, Utc::now);

    handle
        .submit(ControlMessage::immediate("alpha".to_string(), ()))
        .await?;

    // 5. Let the message clear the scheduler, then close the intake; the
    //    remaining retries run inside the shutdown drain
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(handle);
    pipeline.wait().await;
    // Joining the subscriber workers keeps the last log lines from racing
    // process exit
    engine.close().await;

    println!("drained");
    Ok(())
}
