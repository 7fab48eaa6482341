//! # Reporter contract and function-backed implementation.
//!
//! This module defines the [`Reporter`] trait (the sink values produced by
//! the controller are delivered to) and a convenient function-backed
//! implementation [`ReporterFn`]. The common handle type is [`ReporterRef`],
//! an `Arc<dyn Reporter>`.
//!
//! A failed delivery is signalled with a [`ReportError`]; the engine keeps
//! the value and retries on a fixed interval, up to the configured attempt
//! bound.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ReportError;

/// Shared reference to a reporter (`Arc<dyn Reporter>`).
pub type ReporterRef<K, V> = Arc<dyn Reporter<K, V>>;

/// # Delivery sink for values produced by the controller.
///
/// The engine calls [`report`](Reporter::report) once per attempt, with
/// borrowed arguments so retries reuse the stored value. `Ok` is terminal for
/// that value; `Err` sends it to the back of the retry queue.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use loopvisor::{ReportError, Reporter};
///
/// struct Stdout;
///
/// #[async_trait]
/// impl Reporter<String, u64> for Stdout {
///     async fn report(&self, key: &String, value: &u64) -> Result<(), ReportError> {
///         println!("{key} -> {value}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Reporter<K, V>: Send + Sync + 'static {
    /// Attempts to deliver one value for `key`.
    async fn report(&self, key: &K, value: &V) -> Result<(), ReportError>;
}

/// Function-backed reporter implementation.
///
/// The wrapped closure takes the key and value **by value**; the adapter
/// clones them out of the retry queue on every attempt. Implement
/// [`Reporter`] directly to avoid the clones.
#[derive(Debug)]
pub struct ReporterFn<F> {
    f: F,
}

impl<F> ReporterFn<F> {
    /// Creates a new function-backed reporter.
    ///
    /// Prefer [`ReporterFn::arc`] when you immediately need a
    /// [`ReporterRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the reporter and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use loopvisor::{ReportError, ReporterFn, ReporterRef};
    ///
    /// let sink: ReporterRef<String, u64> = ReporterFn::arc(|key: String, value: u64| async move {
    ///     println!("{key} -> {value}");
    ///     Ok::<_, ReportError>(())
    /// });
    /// ```
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut, K, V> Reporter<K, V> for ReporterFn<F>
where
    F: Fn(K, V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ReportError>> + Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn report(&self, key: &K, value: &V) -> Result<(), ReportError> {
        (self.f)(key.clone(), value.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn function_backed_reporter_clones_per_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let sink: ReporterRef<String, u64> = ReporterFn::arc(move |key: String, value: u64| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if key == "bad" {
                    return Err(ReportError::rejected(format!("value {value} refused")));
                }
                Ok(())
            }
        });

        assert!(sink.report(&"ok".to_string(), &1).await.is_ok());
        let err = sink.report(&"bad".to_string(), &2).await.unwrap_err();
        assert_eq!(err.as_label(), "report_rejected");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
