//! Health-monitored broadcast wrapper around a caller-supplied transport.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::circuit::CircuitBreaker;
use crate::broadcast::classify::classify_failure;
use crate::broadcast::metrics::{DeliveryError, HealthMetrics, HealthSnapshot};
use crate::broadcast::recovery::RecoveryStrategy;
use crate::config::BroadcastConfig;
use crate::event_bus::{ErrorEvent, Event, EventBus, EventType};

/// Failure reported by a delivery transport.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// The raw delivery mechanism supplied by the UI push layer.
///
/// The monitor never depends on the transport's internal protocol; it
/// only needs "deliver one JSON payload, possibly failing" and an
/// optional connection-level reset hook for recovery.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    async fn deliver(&self, payload: serde_json::Value) -> Result<(), TransportError>;

    /// Re-establish the underlying connection. Default is a no-op for
    /// transports with nothing to reset.
    async fn reset(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Side-effect callback invoked on every failed delivery.
pub type ErrorHandler = Box<dyn Fn(DeliveryError) -> BoxFuture<'static, ()> + Send + Sync>;
/// Side-effect callback invoked when a recovery strategy succeeds,
/// receiving the strategy's ladder index.
pub type RecoveryHandler = Box<dyn Fn(usize) -> BoxFuture<'static, ()> + Send + Sync>;

/// Shared state and recording paths, behind one `Arc` so background
/// tasks (drain monitor, recovery) work on the same counters as the
/// public API.
struct MonitorCore {
    transport: Arc<dyn BroadcastTransport>,
    config: BroadcastConfig,
    event_bus: Arc<EventBus>,
    circuit: RwLock<CircuitBreaker>,
    metrics: RwLock<HealthMetrics>,
    backpressure: AtomicBool,
    queue_tx: mpsc::Sender<serde_json::Value>,
    error_handlers: RwLock<Vec<ErrorHandler>>,
    recovery_handlers: RwLock<Vec<RecoveryHandler>>,
    recovery_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorCore {
    /// Observability publishes are fire-and-forget.
    fn emit(&self, event: Event) {
        if let Err(e) = self.event_bus.sync_publish(event) {
            debug!("event publish dropped: {}", e);
        }
    }

    fn queue_depth(&self) -> usize {
        self.queue_tx.max_capacity() - self.queue_tx.capacity()
    }

    /// Invokes the transport once and records the outcome.
    async fn deliver_now(core: &Arc<Self>, message: serde_json::Value) -> bool {
        let started = Instant::now();
        let result = core.transport.deliver(message).await;
        let elapsed = started.elapsed();

        if elapsed > core.config.backpressure_threshold {
            core.activate_backpressure(elapsed).await;
        }

        match result {
            Ok(()) => {
                core.record_success(elapsed).await;
                true
            }
            Err(e) => {
                Self::record_failure(core, e).await;
                false
            }
        }
    }

    async fn record_success(&self, elapsed: Duration) {
        self.metrics.write().await.record_success(elapsed);
        let closed = self
            .circuit
            .write()
            .await
            .record_success(self.config.success_threshold);
        if closed {
            info!("circuit breaker closed after consecutive successes");
            self.emit(
                Event::new(EventType::CircuitClosed)
                    .with_parameter("reason", json!("success_threshold")),
            );
        }
        self.emit(Event::new(EventType::BroadcastSucceeded));
    }

    async fn record_failure(core: &Arc<Self>, transport_error: TransportError) {
        let severity = classify_failure(&transport_error.to_string());
        let delivery_error =
            DeliveryError::new(&transport_error.to_string(), severity, "broadcast");
        warn!(severity = %severity, "broadcast delivery failed: {}", transport_error);

        core.metrics
            .write()
            .await
            .record_failure(delivery_error.clone());

        let tripped = core
            .circuit
            .write()
            .await
            .record_failure(core.config.failure_threshold);
        if tripped {
            core.metrics.write().await.circuit_breaker_trips += 1;
            error!("circuit breaker opened after consecutive delivery failures");
            core.emit(Event::new(EventType::CircuitOpened));
            Self::spawn_recovery(core.clone()).await;
        }

        let _ = core.event_bus.sync_publish_error(ErrorEvent {
            error_type: "broadcast_failure".to_string(),
            message: delivery_error.message.clone(),
            severity,
            ..Default::default()
        });

        let event_param = Event::new(EventType::BroadcastFailed)
            .with_parameter("severity", json!(severity.to_string()));
        core.emit(event_param);

        for handler in core.error_handlers.read().await.iter() {
            handler(delivery_error.clone()).await;
        }
    }

    async fn activate_backpressure(&self, elapsed: Duration) {
        if !self.backpressure.swap(true, Ordering::SeqCst) {
            self.metrics.write().await.backpressure_events += 1;
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "slow delivery, backpressure activated"
            );
            self.emit(Event::new(EventType::BackpressureActivated));
        }
    }

    /// Launches the recovery ladder, replacing any previous attempt.
    async fn spawn_recovery(core: Arc<Self>) {
        let mut guard = core.recovery_handle.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        let task_core = core.clone();
        *guard = Some(tokio::spawn(async move {
            Self::run_recovery(task_core).await;
        }));
    }

    async fn run_recovery(core: Arc<Self>) {
        for strategy in RecoveryStrategy::ladder() {
            info!(strategy = %strategy, "attempting broadcast recovery");
            let applied = match strategy {
                RecoveryStrategy::Pause => {
                    tokio::time::sleep(core.config.recovery_pause).await;
                    Ok(())
                }
                RecoveryStrategy::ConnectionReset => core.transport.reset().await,
                RecoveryStrategy::FullReset => {
                    // clears monitor-side pressure state as well
                    core.backpressure.store(false, Ordering::SeqCst);
                    core.transport.reset().await
                }
            };
            if let Err(e) = applied {
                warn!(strategy = %strategy, "recovery step failed: {}", e);
                continue;
            }

            let probe = json!({
                "type": "health_check",
                "sent_at": Utc::now().to_rfc3339(),
            });
            match core.transport.deliver(probe).await {
                Ok(()) => {
                    core.circuit.write().await.close();
                    core.metrics.write().await.recovery_events += 1;
                    info!(strategy = %strategy, "broadcast recovery succeeded");
                    core.emit(
                        Event::new(EventType::RecoverySucceeded)
                            .with_parameter("strategy", json!(strategy.to_string()))
                            .with_parameter("strategy_index", json!(strategy.index())),
                    );
                    core.emit(
                        Event::new(EventType::CircuitClosed)
                            .with_parameter("reason", json!("recovery")),
                    );
                    for handler in core.recovery_handlers.read().await.iter() {
                        handler(strategy.index()).await;
                    }
                    return;
                }
                Err(e) => {
                    warn!(strategy = %strategy, "recovery health check failed: {}", e);
                }
            }
        }
        // the next broadcast() re-evaluates via the recovery timeout rule
        warn!("all recovery strategies failed, circuit remains open");
    }
}

/// Health-monitored broadcaster.
///
/// `broadcast()` never raises: the return value says whether the message
/// was delivered (or accepted by the backpressure queue). `start()`
/// launches the backpressure drain monitor; without it the bounded queue
/// fills and slow-path messages are shed.
pub struct BroadcastMonitor {
    core: Arc<MonitorCore>,
    running: Arc<AtomicBool>,
    queue_rx: Mutex<Option<mpsc::Receiver<serde_json::Value>>>,
    drain_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastMonitor {
    pub fn new(
        transport: Arc<dyn BroadcastTransport>,
        config: BroadcastConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.backpressure_queue_size.max(1));
        Self {
            core: Arc::new(MonitorCore {
                transport,
                config,
                event_bus,
                circuit: RwLock::new(CircuitBreaker::new()),
                metrics: RwLock::new(HealthMetrics::new()),
                backpressure: AtomicBool::new(false),
                queue_tx,
                error_handlers: RwLock::new(Vec::new()),
                recovery_handlers: RwLock::new(Vec::new()),
                recovery_handle: Mutex::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            queue_rx: Mutex::new(Some(queue_rx)),
            drain_handle: Mutex::new(None),
        }
    }

    /// Delivers one message through the health-checked transport.
    ///
    /// Returns `false` when the circuit is open, the backpressure queue
    /// sheds the message, or the delivery itself fails. Never blocks the
    /// caller beyond the transport call and the short enqueue timeout.
    pub async fn broadcast(&self, message: serde_json::Value) -> bool {
        {
            let mut circuit = self.core.circuit.write().await;
            if circuit.is_open() {
                if circuit.recovery_elapsed(self.core.config.recovery_timeout, Utc::now()) {
                    info!("recovery timeout elapsed, resetting circuit breaker");
                    circuit.close();
                    self.core.emit(
                        Event::new(EventType::CircuitClosed)
                            .with_parameter("reason", json!("recovery_timeout")),
                    );
                } else {
                    debug!("circuit breaker open, dropping broadcast");
                    return false;
                }
            }
        }

        if self.core.backpressure.load(Ordering::SeqCst) {
            return self.enqueue_backpressured(message).await;
        }

        MonitorCore::deliver_now(&self.core, message).await
    }

    /// Slow-consumer path: queue with a short timeout, shed on overflow.
    async fn enqueue_backpressured(&self, message: serde_json::Value) -> bool {
        match tokio::time::timeout(
            self.core.config.enqueue_timeout,
            self.core.queue_tx.send(message),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!("backpressure queue closed, dropping message");
                false
            }
            Err(_) => {
                warn!("backpressure queue full, dropping message");
                false
            }
        }
    }

    /// Starts the backpressure drain monitor.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut rx = match self.queue_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("broadcast monitor already consumed its queue, not restarting");
                return;
            }
        };

        let core = self.core.clone();
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match tokio::time::timeout(core.config.drain_check_interval, rx.recv()).await {
                    Ok(Some(message)) => {
                        let _ = MonitorCore::deliver_now(&core, message).await;
                    }
                    Ok(None) => break,
                    Err(_) => {}
                }

                if core.backpressure.load(Ordering::SeqCst)
                    && core.queue_depth() * 2 < core.config.backpressure_queue_size
                {
                    core.backpressure.store(false, Ordering::SeqCst);
                    info!("backpressure cleared, queue drained");
                    core.emit(Event::new(EventType::BackpressureCleared));
                }
            }
        });
        *self.drain_handle.lock().await = Some(handle);
    }

    /// Stops the drain monitor and cancels any in-flight recovery task.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.drain_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.core.recovery_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn add_error_handler(&self, handler: ErrorHandler) {
        self.core.error_handlers.write().await.push(handler);
    }

    pub async fn add_recovery_handler(&self, handler: RecoveryHandler) {
        self.core.recovery_handlers.write().await.push(handler);
    }

    pub async fn circuit_open(&self) -> bool {
        self.core.circuit.read().await.is_open()
    }

    pub fn backpressure_active(&self) -> bool {
        self.core.backpressure.load(Ordering::SeqCst)
    }

    /// Point-in-time health view for a status dashboard.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let mut metrics = self.core.metrics.write().await;
        let error_rate = metrics.error_rate(Utc::now());
        let circuit = self.core.circuit.read().await;
        HealthSnapshot {
            total_broadcasts: metrics.total_broadcasts,
            successful_broadcasts: metrics.successful_broadcasts,
            failed_broadcasts: metrics.failed_broadcasts,
            circuit_breaker_trips: metrics.circuit_breaker_trips,
            backpressure_events: metrics.backpressure_events,
            recovery_events: metrics.recovery_events,
            error_rate,
            recent_errors: metrics.recent_error_count(),
            min_duration_ms: metrics.min_duration().map(|d| d.as_millis() as u64),
            max_duration_ms: metrics.max_duration().map(|d| d.as_millis() as u64),
            avg_duration_ms: metrics.avg_duration().map(|d| d.as_millis() as u64),
            last_success_at: metrics.last_success_at,
            last_error_at: metrics.last_error_at,
            circuit_breaker_open: circuit.is_open(),
            backpressure_active: self.core.backpressure.load(Ordering::SeqCst),
            queue_depth: self.core.queue_depth(),
        }
    }
}
