//! # Queue Execution Coordinator
//!
//! Drives a fixed set of named work queues either strictly in order or
//! concurrently under a semaphore bound. A failure in one queue never
//! poisons the others: every queue in a batch gets its own outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::event_bus::{Event, EventBus, EventType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Queue '{queue}' failed: {message} (retryable: {retryable})")]
    ExecutionFailed {
        queue: String,
        message: String,
        retryable: bool,
    },

    #[error("Queue coordinator is not running")]
    NotRunning,
}

impl QueueError {
    pub fn retryable(queue: &str, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            queue: queue.to_string(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(queue: &str, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            queue: queue.to_string(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed {
                retryable: true,
                ..
            }
        )
    }
}

/// Per-queue result of one batch run.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Success(serde_json::Value),
    Error { message: String, retryable: bool },
}

impl QueueOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// One named queue's unit of work for a batch run.
#[async_trait]
pub trait QueueRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<serde_json::Value, QueueError>;
}

pub struct QueueCoordinator {
    queues: Vec<Arc<dyn QueueRunner>>,
    config: QueueConfig,
    event_bus: Arc<EventBus>,
    running: AtomicBool,
}

impl QueueCoordinator {
    /// Queue order here is the execution order for sequential batches.
    pub fn new(
        queues: Vec<Arc<dyn QueueRunner>>,
        config: QueueConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            queues,
            config,
            event_bus,
            running: AtomicBool::new(false),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.name().to_string()).collect()
    }

    fn emit(&self, event: Event) {
        if let Err(e) = self.event_bus.sync_publish(event) {
            debug!("event publish dropped: {}", e);
        }
    }

    fn emit_batch_started(&self, mode: &str) {
        self.emit(
            Event::new(EventType::QueueBatchStarted)
                .with_parameter("mode", json!(mode))
                .with_parameter("queues", json!(self.queue_names())),
        );
    }

    fn emit_batch_finished(&self, mode: &str, outcomes: &HashMap<String, QueueOutcome>) {
        let failed = outcomes.values().filter(|o| !o.is_success()).count();
        self.emit(
            Event::new(EventType::QueueBatchFinished)
                .with_parameter("mode", json!(mode))
                .with_parameter("failed", json!(failed)),
        );
    }

    /// Runs every queue to completion, one at a time, in registration
    /// order.
    ///
    /// A retryable failure is recorded in the outcome map and the batch
    /// moves on; a fatal one aborts the batch and is returned to the
    /// caller.
    pub async fn execute_sequential(&self) -> Result<HashMap<String, QueueOutcome>, QueueError> {
        if !self.is_running() {
            return Err(QueueError::NotRunning);
        }
        self.emit_batch_started("sequential");

        let mut outcomes = HashMap::new();
        for queue in &self.queues {
            let name = queue.name().to_string();
            debug!(queue = %name, "running queue");
            match queue.run().await {
                Ok(value) => {
                    outcomes.insert(name, QueueOutcome::Success(value));
                }
                Err(e) if e.is_retryable() => {
                    warn!(queue = %name, "queue failed (retryable): {}", e);
                    outcomes.insert(
                        name,
                        QueueOutcome::Error {
                            message: e.to_string(),
                            retryable: true,
                        },
                    );
                }
                Err(e) => {
                    error!(queue = %name, "queue failed (fatal): {}", e);
                    self.emit_batch_finished("sequential", &outcomes);
                    return Err(e);
                }
            }
        }

        self.emit_batch_finished("sequential", &outcomes);
        Ok(outcomes)
    }

    /// Runs all queues concurrently, at most `max_concurrent` in flight.
    ///
    /// `None` falls back to the configured bound. Each queue's failure
    /// lands in its own outcome entry; the batch always completes.
    pub async fn execute_concurrent(
        &self,
        max_concurrent: Option<usize>,
    ) -> Result<HashMap<String, QueueOutcome>, QueueError> {
        if !self.is_running() {
            return Err(QueueError::NotRunning);
        }
        let limit = max_concurrent.unwrap_or(self.config.max_concurrent).max(1);
        self.emit_batch_started("concurrent");
        info!(limit, queues = self.queues.len(), "running concurrent batch");

        let semaphore = Arc::new(Semaphore::new(limit));
        let futures = self.queues.iter().map(|queue| {
            let queue = queue.clone();
            let semaphore = semaphore.clone();
            async move {
                // closed only if the semaphore is dropped, which it is not
                let _permit = semaphore.acquire().await;
                let name = queue.name().to_string();
                let outcome = match queue.run().await {
                    Ok(value) => QueueOutcome::Success(value),
                    Err(e) => {
                        warn!(queue = %name, "queue failed: {}", e);
                        QueueOutcome::Error {
                            message: e.to_string(),
                            retryable: e.is_retryable(),
                        }
                    }
                };
                (name, outcome)
            }
        });

        let outcomes: HashMap<String, QueueOutcome> = join_all(futures).await.into_iter().collect();
        self.emit_batch_finished("concurrent", &outcomes);
        Ok(outcomes)
    }
}
