//! # Observability Event Bus
//!
//! The EventBus is the fire-and-forget side channel of the coordination
//! layer. Coordinators publish typed events here (message sent, task
//! status changed, circuit opened, ...) so that dashboards and loggers
//! can observe the system without being in the data path.
//!
//! ## Design Decisions
//!
//! The implementation uses Tokio's broadcast channel rather than MPSC
//! channels to:
//!
//! 1. Allow multiple subscribers to receive the same event
//! 2. Handle backpressure through the channel capacity
//! 3. Support non-blocking publish operations
//!
//! The bus never feeds back into coordinator behavior: a failed publish
//! is logged and dropped, it is never surfaced to the caller of a
//! coordinator operation.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// A discrete observability event: a closed type tag plus a JSON
/// parameter map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: EventType,
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }
}

/// Closed set of events the coordination layer emits.
#[derive(Debug, Clone, PartialEq, Hash, Eq, strum::Display, strum::EnumString, Default)]
pub enum EventType {
    #[default]
    Heartbeat,
    // Routing
    AgentMessageSent,
    // Task lifecycle
    TaskCreated,
    TaskStatusChanged,
    // Broadcast health
    BroadcastSucceeded,
    BroadcastFailed,
    CircuitOpened,
    CircuitClosed,
    BackpressureActivated,
    BackpressureCleared,
    RecoverySucceeded,
    // Queue execution
    QueueBatchStarted,
    QueueBatchFinished,
    #[strum(default)]
    Custom(String),
}

/// Severity taxonomy shared by error events and broadcast failure
/// classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Errors travel on their own channel so monitors can watch failures
/// without consuming the regular event stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorEvent {
    pub error_type: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Central hub for coordination-layer observability events.
///
/// Maintains two broadcast channels: one for regular events and one for
/// error events. Internal receivers keep both channels alive while no
/// external subscriber exists.
pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
    error_sender: broadcast::Sender<ErrorEvent>,
    capacity: usize,
    _internal_receiver: broadcast::Receiver<Event>,
    _internal_error_receiver: broadcast::Receiver<ErrorEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given buffer capacity. Slow
    /// subscribers that fall more than `capacity` events behind observe
    /// a `Lagged` error and are resubscribed at the current position.
    pub fn new(capacity: usize) -> Self {
        let (event_sender, event_receiver) = broadcast::channel(capacity);
        let (error_sender, error_receiver) = broadcast::channel(capacity);
        Self {
            event_sender,
            error_sender,
            capacity,
            _internal_receiver: event_receiver,
            _internal_error_receiver: error_receiver,
        }
    }

    /// Subscribes to both regular and error events.
    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        let event_rx = self.event_sender.subscribe();
        let error_rx = self.error_sender.subscribe();
        (EventReceiver::new(event_rx), ErrorReceiver::new(error_rx))
    }

    /// Publishes an event to all subscribers.
    pub async fn publish(&self, event: Event) -> EventResult<()> {
        debug_event("Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Publishes an event from a synchronous context without awaiting.
    pub fn sync_publish(&self, event: Event) -> EventResult<()> {
        debug_event("Sync Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Publishes an error event to all error subscribers.
    pub async fn publish_error(&self, error: ErrorEvent) -> EventResult<()> {
        self.error_sender
            .send(error)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn sync_publish_error(&self, error: ErrorEvent) -> EventResult<()> {
        self.error_sender
            .send(error)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn queue_size(&self) -> usize {
        self.event_sender.len()
    }

    pub fn subscribers_size(&self) -> usize {
        self.event_sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn debug_event(prefix: &str, event: &Event) {
    match event.event_type {
        // Heartbeats and broadcast successes are too chatty for debug
        EventType::Heartbeat | EventType::BroadcastSucceeded => {
            trace!("{} Event: {:?}", prefix, event)
        }
        _ => debug!("{} Event: {:?}", prefix, event),
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lagging, resubscribes at the current
    /// position and reports how many events were skipped; callers should
    /// call `recv` again promptly.
    pub async fn recv(&mut self) -> EventResult<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}

pub struct ErrorReceiver {
    pub receiver: broadcast::Receiver<ErrorEvent>,
}

impl ErrorReceiver {
    fn new(receiver: broadcast::Receiver<ErrorEvent>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> EventResult<ErrorEvent> {
        self.receiver
            .recv()
            .await
            .map_err(|e| EventError::ReceiveFailed {
                message: e.to_string(),
            })
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_publish_success() {
        let bus = EventBus::new(16);
        let event = Event::new(EventType::TaskCreated);
        assert!(bus.publish(event).await.is_ok());
    }

    #[tokio::test]
    async fn test_basic_publish_subscribe() {
        let bus = EventBus::new(16);
        let (mut event_rx, _) = bus.subscribe();

        bus.publish(
            Event::new(EventType::TaskStatusChanged)
                .with_parameter("task_id", serde_json::json!("t-1")),
        )
        .await
        .unwrap();

        let received = event_rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::TaskStatusChanged);
        assert_eq!(
            received.parameters.get("task_id"),
            Some(&serde_json::json!("t-1"))
        );
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let (mut rx1, _) = bus.subscribe();
        let (mut rx2, _) = bus.subscribe();

        bus.publish(Event::new(EventType::CircuitOpened)).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().event_type, EventType::CircuitOpened);
        assert_eq!(rx2.recv().await.unwrap().event_type, EventType::CircuitOpened);
    }

    #[tokio::test]
    async fn test_error_channel() {
        let bus = EventBus::new(16);
        let (_, mut error_rx) = bus.subscribe();

        let error = ErrorEvent {
            error_type: "broadcast_failure".to_string(),
            message: "connection refused".to_string(),
            severity: ErrorSeverity::High,
            ..Default::default()
        };
        bus.publish_error(error).await.unwrap();

        let received = error_rx.recv().await.unwrap();
        assert_eq!(received.error_type, "broadcast_failure");
        assert_eq!(received.severity, ErrorSeverity::High);
    }
}
