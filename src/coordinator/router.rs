//! # Message Router
//!
//! An asynchronous mailbox with type-keyed handler registration and a
//! correlation-id-based request/response pattern with timeouts.
//!
//! The router owns one consumer task reading its mailbox in strict FIFO
//! order. Handler failures are isolated to a log line: one failing
//! handler never aborts dispatch to its siblings, nor stops the consumer
//! loop. Request/response timeout is a normal outcome (`None`), not an
//! error.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{stream::SelectAll, Stream, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tracing::{debug, instrument, warn};

use crate::event_bus::{Event, EventBus, EventType};
use crate::message::{AgentMessage, MessageType};

/// A registered consumer of one message type. Multiple handlers per type
/// are permitted; dispatch invokes them in registration order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &AgentMessage) -> RouterResult<()>;
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),
    #[error("Mailbox closed")]
    MailboxClosed,
}

pub type RouterResult<T> = Result<T, RouterError>;

enum StreamMessage {
    Message(AgentMessage),
    Shutdown,
}

/// Message routing coordinator.
///
/// Call [`MessageRouter::start`] to launch the consumer task before
/// sending; [`MessageRouter::stop`] cancels the consumer and all pending
/// request futures, so awaiting callers receive `None` instead of
/// hanging.
pub struct MessageRouter {
    mailbox_tx: mpsc::UnboundedSender<AgentMessage>,
    mailbox_rx: Mutex<Option<mpsc::UnboundedReceiver<AgentMessage>>>,
    handlers: Arc<DashMap<MessageType, Vec<Arc<dyn MessageHandler>>>>,
    pending_requests: Arc<DashMap<String, oneshot::Sender<AgentMessage>>>,
    event_bus: Arc<EventBus>,
    default_timeout: Duration,
    shutdown_tx: broadcast::Sender<()>,
    consumer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MessageRouter {
    pub fn new(event_bus: Arc<EventBus>, default_timeout: Duration) -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        Self {
            mailbox_tx,
            mailbox_rx: Mutex::new(Some(mailbox_rx)),
            handlers: Arc::new(DashMap::new()),
            pending_requests: Arc::new(DashMap::new()),
            event_bus,
            default_timeout,
            shutdown_tx: broadcast::channel(1).0,
            consumer_handle: Mutex::new(None),
        }
    }

    /// Appends a handler to the ordered list for `message_type`.
    pub fn register_handler(&self, message_type: MessageType, handler: Arc<dyn MessageHandler>) {
        self.handlers.entry(message_type).or_default().push(handler);
    }

    pub fn handler_count(&self, message_type: &MessageType) -> usize {
        self.handlers
            .get(message_type)
            .map(|h| h.len())
            .unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_requests.len()
    }

    /// Enqueues a message onto the mailbox. Delivery is asynchronous
    /// relative to the caller; a closed mailbox is logged, never raised.
    pub fn send_message(&self, message: AgentMessage) {
        let event = Event::new(EventType::AgentMessageSent)
            .with_parameter("message_id", json!(message.id))
            .with_parameter("message_type", json!(message.message_type.to_string()))
            .with_parameter("sender", json!(message.sender));
        if let Err(e) = self.event_bus.sync_publish(event) {
            debug!("event publish dropped: {}", e);
        }

        if self.mailbox_tx.send(message).is_err() {
            warn!("router mailbox closed, message dropped");
        }
    }

    /// Sends `request` and awaits a correlated reply.
    ///
    /// Registers a pending future keyed by the request id, sends, and
    /// waits up to `timeout` (the router default when `None`). Returns
    /// `None` on timeout or cancellation; the pending entry is removed
    /// on every path, so no correlation entries leak.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn send_request_response(
        &self,
        request: AgentMessage,
        timeout: Option<Duration>,
    ) -> Option<AgentMessage> {
        let request_id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending_requests.insert(request_id.clone(), tx);

        self.send_message(request);

        let timeout = timeout.unwrap_or(self.default_timeout);
        let result = tokio::time::timeout(timeout, rx).await;
        self.pending_requests.remove(&request_id);

        match result {
            Ok(Ok(response)) => Some(response),
            Ok(Err(_)) => {
                debug!("pending request cancelled");
                None
            }
            Err(_) => {
                debug!("request timed out");
                None
            }
        }
    }

    /// Launches the single consumer task over the mailbox.
    pub async fn start(&self) {
        let mut guard = self.consumer_handle.lock().await;
        if guard.is_some() {
            warn!("message router already started");
            return;
        }
        let rx = match self.mailbox_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("router mailbox already consumed, not restarting");
                return;
            }
        };

        let handlers = self.handlers.clone();
        let pending = self.pending_requests.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        *guard = Some(tokio::spawn(async move {
            let mailbox_stream =
                UnboundedReceiverStream::new(rx).map(|m| Ok(StreamMessage::Message(m)));
            let shutdown_stream = BroadcastStream::new(shutdown_rx).map(|r| match r {
                Ok(_) => Ok(StreamMessage::Shutdown),
                Err(_) => Err(()),
            });

            let mut streams: SelectAll<
                Pin<Box<dyn Stream<Item = Result<StreamMessage, ()>> + Send>>,
            > = SelectAll::new();
            streams.push(Box::pin(mailbox_stream));
            streams.push(Box::pin(shutdown_stream));

            while let Some(Ok(message)) = streams.next().await {
                match message {
                    StreamMessage::Message(message) => {
                        Self::dispatch(&handlers, &pending, message).await;
                    }
                    StreamMessage::Shutdown => {
                        debug!("message router consumer shutting down");
                        break;
                    }
                }
            }
        }));
    }

    /// Processes one message: response-path correlation match first,
    /// then ordered handler dispatch with per-handler error isolation.
    async fn dispatch(
        handlers: &DashMap<MessageType, Vec<Arc<dyn MessageHandler>>>,
        pending: &DashMap<String, oneshot::Sender<AgentMessage>>,
        message: AgentMessage,
    ) {
        // A message correlated to itself is a fresh request, not a reply.
        let correlation = message.correlation_id().to_string();
        if correlation != message.id {
            if let Some((_, sender)) = pending.remove(&correlation) {
                if sender.send(message).is_err() {
                    debug!("requester no longer waiting for response");
                }
                return;
            }
        }

        let type_handlers: Option<Vec<Arc<dyn MessageHandler>>> =
            handlers.get(&message.message_type).map(|h| h.clone());
        match type_handlers {
            Some(list) if !list.is_empty() => {
                for handler in list {
                    if let Err(e) = handler.handle(&message).await {
                        warn!(
                            message_type = %message.message_type,
                            message_id = %message.id,
                            "handler failed, continuing dispatch: {}",
                            e
                        );
                    }
                }
            }
            _ => {
                warn!(
                    message_type = %message.message_type,
                    "no handler registered, dropping message"
                );
            }
        }
    }

    /// Cancels the consumer task and all pending request futures.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.consumer_handle.lock().await.take() {
            // bounded: the consumer breaks on the shutdown stream
            let _ = handle.await;
        }
        // dropping the senders resolves every awaiting caller with None
        self.pending_requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;
    use tokio::time::sleep;

    struct RecordingHandler {
        seen: Arc<AsyncMutex<Vec<String>>>,
        label: String,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: &AgentMessage) -> RouterResult<()> {
            self.seen
                .lock()
                .await
                .push(format!("{}:{}", self.label, message.id));
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl MessageHandler for FailingHandler {
        async fn handle(&self, _message: &AgentMessage) -> RouterResult<()> {
            Err(RouterError::HandlerFailed("boom".to_string()))
        }
    }

    /// Replies to every request it sees through the router.
    struct EchoResponder {
        router: Arc<MessageRouter>,
    }

    #[async_trait]
    impl MessageHandler for EchoResponder {
        async fn handle(&self, message: &AgentMessage) -> RouterResult<()> {
            let mut response = message.response("responder", MessageType::AnalysisResponse);
            response
                .content
                .insert("echo".to_string(), json!(message.id));
            self.router.send_message(response);
            Ok(())
        }
    }

    fn setup() -> Arc<MessageRouter> {
        let event_bus = Arc::new(EventBus::new(64));
        Arc::new(MessageRouter::new(event_bus, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_fifo_dispatch_to_all_handlers() {
        let router = setup();
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        router.register_handler(
            MessageType::StatusUpdate,
            Arc::new(RecordingHandler {
                seen: seen.clone(),
                label: "a".to_string(),
            }),
        );
        router.register_handler(
            MessageType::StatusUpdate,
            Arc::new(RecordingHandler {
                seen: seen.clone(),
                label: "b".to_string(),
            }),
        );
        assert_eq!(router.handler_count(&MessageType::StatusUpdate), 2);

        router.start().await;

        let first = AgentMessage::new("sender", MessageType::StatusUpdate);
        let second = AgentMessage::new("sender", MessageType::StatusUpdate);
        router.send_message(first.clone());
        router.send_message(second.clone());

        sleep(Duration::from_millis(100)).await;

        let seen = seen.lock().await.clone();
        // both handlers per message, registration order, FIFO across messages
        assert_eq!(
            seen,
            vec![
                format!("a:{}", first.id),
                format!("b:{}", first.id),
                format!("a:{}", second.id),
                format!("b:{}", second.id),
            ]
        );

        router.stop().await;
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let router = setup();
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        router.register_handler(MessageType::Heartbeat, Arc::new(FailingHandler));
        router.register_handler(
            MessageType::Heartbeat,
            Arc::new(RecordingHandler {
                seen: seen.clone(),
                label: "ok".to_string(),
            }),
        );

        router.start().await;
        router.send_message(AgentMessage::new("sender", MessageType::Heartbeat));
        router.send_message(AgentMessage::new("sender", MessageType::Heartbeat));
        sleep(Duration::from_millis(100)).await;

        // the sibling handler ran for both messages despite the failures
        assert_eq!(seen.lock().await.len(), 2);

        router.stop().await;
    }

    #[tokio::test]
    async fn test_unhandled_type_is_dropped_quietly() {
        let router = setup();
        router.start().await;
        // no handler registered; must not panic nor stall the consumer
        router.send_message(AgentMessage::new("sender", MessageType::ErrorReport));

        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        router.register_handler(
            MessageType::Heartbeat,
            Arc::new(RecordingHandler {
                seen: seen.clone(),
                label: "late".to_string(),
            }),
        );
        router.send_message(AgentMessage::new("sender", MessageType::Heartbeat));
        sleep(Duration::from_millis(100)).await;

        assert_eq!(seen.lock().await.len(), 1);
        router.stop().await;
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let router = setup();
        router.register_handler(
            MessageType::AnalysisRequest,
            Arc::new(EchoResponder {
                router: router.clone(),
            }),
        );
        router.start().await;

        let request = AgentMessage::new("requester", MessageType::AnalysisRequest);
        let request_id = request.id.clone();
        let response = router
            .send_request_response(request, Some(Duration::from_secs(2)))
            .await
            .expect("response expected");

        assert_eq!(response.correlation_id(), request_id);
        assert_eq!(response.content.get("echo"), Some(&json!(request_id)));
        assert_eq!(router.pending_count(), 0);

        router.stop().await;
    }

    #[tokio::test]
    async fn test_response_skips_type_handlers() {
        let router = setup();
        let response_handler_calls = Arc::new(AtomicUsize::new(0));
        let calls = response_handler_calls.clone();

        struct CountingHandler(Arc<AtomicUsize>);
        #[async_trait]
        impl MessageHandler for CountingHandler {
            async fn handle(&self, _message: &AgentMessage) -> RouterResult<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        router.register_handler(
            MessageType::AnalysisResponse,
            Arc::new(CountingHandler(calls)),
        );
        router.register_handler(
            MessageType::AnalysisRequest,
            Arc::new(EchoResponder {
                router: router.clone(),
            }),
        );
        router.start().await;

        let request = AgentMessage::new("requester", MessageType::AnalysisRequest);
        let response = router
            .send_request_response(request, Some(Duration::from_secs(2)))
            .await;
        assert!(response.is_some());

        sleep(Duration::from_millis(50)).await;
        // the correlated reply resolved the future instead of dispatching
        assert_eq!(response_handler_calls.load(Ordering::SeqCst), 0);

        router.stop().await;
    }

    #[tokio::test]
    async fn test_request_timeout_returns_none_and_cleans_up() {
        let router = setup();
        router.start().await;

        let started = std::time::Instant::now();
        let response = router
            .send_request_response(
                AgentMessage::new("requester", MessageType::CollaborationRequest),
                Some(Duration::from_millis(100)),
            )
            .await;

        assert!(response.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(router.pending_count(), 0);

        router.stop().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_requests() {
        let router = setup();
        router.start().await;

        let waiting_router = router.clone();
        let waiter = tokio::spawn(async move {
            waiting_router
                .send_request_response(
                    AgentMessage::new("requester", MessageType::CollaborationRequest),
                    Some(Duration::from_secs(30)),
                )
                .await
        });

        sleep(Duration::from_millis(50)).await;
        router.stop().await;

        // cancellation, not a 30 second hang
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve promptly")
            .unwrap();
        assert!(result.is_none());
    }
}
