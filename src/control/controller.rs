//! # Controller contract and function-backed implementation.
//!
//! This module defines the [`Controller`] trait (the reconcile function the
//! engine invokes for every due message) and a convenient function-backed
//! implementation [`ControllerFn`]. The common handle type is
//! [`ControllerRef`], an `Arc<dyn Controller>` suitable for sharing across
//! the caller pool.
//!
//! A controller receives the key, its parameters, and the state left behind
//! by the previous invocation of the same key (if any), and answers with a
//! [`Directive`]: what to remember, what to report, and when to run again.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Shared reference to a controller (`Arc<dyn Controller>`).
pub type ControllerRef<K, P, S, V> = Arc<dyn Controller<K, P, S, V>>;

/// What the controller decided for one invocation.
///
/// All three outputs are optional and independent:
/// - `state` is remembered and handed back on the key's next invocation;
/// - `value` is forwarded to the reporter sink;
/// - `next_run` schedules another invocation of the same key.
///
/// A [`Directive::idle`] with nothing set ends the key's loop until a new
/// message for it arrives.
#[derive(Debug)]
pub struct Directive<S, V> {
    /// State threaded to the key's next invocation.
    pub state: Option<S>,
    /// Value to deliver through the reporter.
    pub value: Option<V>,
    /// When to invoke the controller for this key again.
    pub next_run: Option<DateTime<Utc>>,
}

impl<S, V> Directive<S, V> {
    /// Creates a directive with no state, no value, and no next run.
    pub fn idle() -> Self {
        Self {
            state: None,
            value: None,
            next_run: None,
        }
    }

    /// Sets the state to thread into the next invocation.
    #[inline]
    pub fn with_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the value to report.
    #[inline]
    pub fn with_value(mut self, value: V) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the next start time for this key.
    #[inline]
    pub fn with_next_run(mut self, at: DateTime<Utc>) -> Self {
        self.next_run = Some(at);
        self
    }
}

impl<S, V> Default for Directive<S, V> {
    fn default() -> Self {
        Self::idle()
    }
}

/// # The reconcile function invoked for every due message.
///
/// The engine guarantees at most one in-flight `reconcile` per key, so an
/// implementation never races with itself on the same key. It may run
/// concurrently for different keys (up to the worker-pool size).
///
/// The engine applies no timeout and no cancellation: a hung invocation
/// occupies one worker slot until it returns.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use loopvisor::{Controller, Directive};
///
/// struct Probe;
///
/// #[async_trait]
/// impl Controller<String, u32, u64, String> for Probe {
///     async fn reconcile(&self, key: String, limit: u32, state: Option<u64>) -> Directive<u64, String> {
///         let seen = state.unwrap_or(0) + 1;
///         let report = format!("{key}: probe {seen}/{limit}");
///         Directive::idle().with_state(seen).with_value(report)
///     }
/// }
/// ```
#[async_trait]
pub trait Controller<K, P, S, V>: Send + Sync + 'static {
    /// Runs one invocation for `key` and decides what happens next.
    ///
    /// `state` is whatever the previous invocation of this key put into its
    /// directive, or `None` on the first invocation (and after any invocation
    /// that left the state unset).
    async fn reconcile(&self, key: K, params: P, state: Option<S>) -> Directive<S, V>;
}

/// Function-backed controller implementation.
///
/// Wraps a closure that *creates* a new future per invocation.
#[derive(Debug)]
pub struct ControllerFn<F> {
    f: F,
}

impl<F> ControllerFn<F> {
    /// Creates a new function-backed controller.
    ///
    /// Prefer [`ControllerFn::arc`] when you immediately need a
    /// [`ControllerRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the controller and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use loopvisor::{ControllerFn, ControllerRef, Directive};
    ///
    /// let ctl: ControllerRef<&'static str, u32, (), String> =
    ///     ControllerFn::arc(|key: &'static str, limit: u32, _state: Option<()>| async move {
    ///         Directive::<(), String>::idle().with_value(format!("{key} capped at {limit}"))
    ///     });
    /// ```
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut, K, P, S, V> Controller<K, P, S, V> for ControllerFn<F>
where
    F: Fn(K, P, Option<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Directive<S, V>> + Send + 'static,
    K: Send + 'static,
    P: Send + 'static,
    S: Send + 'static,
    V: Send + 'static,
{
    async fn reconcile(&self, key: K, params: P, state: Option<S>) -> Directive<S, V> {
        (self.f)(key, params, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_directive_is_empty() {
        let d: Directive<(), ()> = Directive::idle();
        assert!(d.state.is_none());
        assert!(d.value.is_none());
        assert!(d.next_run.is_none());
    }

    #[tokio::test]
    async fn function_backed_controller_threads_state() {
        let ctl: ControllerRef<&'static str, u32, u32, String> =
            ControllerFn::arc(|key: &'static str, step: u32, state: Option<u32>| async move {
                let total = state.unwrap_or(0) + step;
                Directive::<u32, String>::idle()
                    .with_state(total)
                    .with_value(format!("{key}={total}"))
            });

        let first = ctl.reconcile("a", 2, None).await;
        assert_eq!(first.state, Some(2));
        assert_eq!(first.value.as_deref(), Some("a=2"));

        let second = ctl.reconcile("a", 3, first.state).await;
        assert_eq!(second.state, Some(5));
        assert_eq!(second.value.as_deref(), Some("a=5"));
        assert!(second.next_run.is_none());
    }
}
