use std::sync::Arc;

use crate::subscribers::Subscribe;

use super::{Config, control_loop::ControlLoop};

/// Builder for constructing a ControlLoop with optional subscribers.
pub struct ControlLoopBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ControlLoopBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Adds one event subscriber.
    ///
    /// Subscribers receive pipeline events (scheduling, admission, delivery,
    /// shutdown) through dedicated workers with bounded queues.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Replaces the whole subscriber list.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the control loop.
    ///
    /// This consumes the builder and initializes the runtime components:
    /// - Event bus for broadcasting
    /// - Subscriber workers and the bus listener
    ///
    /// Must run inside a tokio runtime.
    pub fn build(self) -> ControlLoop {
        ControlLoop::new(self.cfg, self.subscribers)
    }
}
