use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event_bus::ErrorSeverity;

/// How many delivery durations the rolling timing window keeps.
const TIMING_WINDOW: usize = 100;
/// Errors older than this fall out of the error-rate window.
const ERROR_WINDOW: Duration = Duration::from_secs(300);

/// A single failed delivery, retained in the bounded recent-errors
/// window for rate computation.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub message: String,
    pub severity: ErrorSeverity,
    pub occurred_at: DateTime<Utc>,
    pub context: String,
    pub recovered: bool,
    pub retry_attempts: u32,
}

impl DeliveryError {
    pub fn new(message: &str, severity: ErrorSeverity, context: &str) -> Self {
        Self {
            message: message.to_string(),
            severity,
            occurred_at: Utc::now(),
            context: context.to_string(),
            recovered: false,
            retry_attempts: 0,
        }
    }
}

/// Counters and rolling windows for broadcast health.
///
/// Mutated only by the monitor's own success/failure recording paths:
/// single writer behind the monitor's lock.
#[derive(Debug, Default)]
pub struct HealthMetrics {
    pub total_broadcasts: u64,
    pub successful_broadcasts: u64,
    pub failed_broadcasts: u64,
    pub circuit_breaker_trips: u64,
    pub backpressure_events: u64,
    pub recovery_events: u64,
    durations: VecDeque<Duration>,
    recent_errors: VecDeque<DeliveryError>,
    recent_attempts: VecDeque<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl HealthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.total_broadcasts += 1;
        self.successful_broadcasts += 1;
        let now = Utc::now();
        self.last_success_at = Some(now);
        self.recent_attempts.push_back(now);
        self.durations.push_back(duration);
        while self.durations.len() > TIMING_WINDOW {
            self.durations.pop_front();
        }
    }

    pub fn record_failure(&mut self, error: DeliveryError) {
        self.total_broadcasts += 1;
        self.failed_broadcasts += 1;
        self.last_error_at = Some(error.occurred_at);
        self.recent_attempts.push_back(error.occurred_at);
        self.recent_errors.push_back(error);
        self.prune(Utc::now());
    }

    /// Errors recorded within the rolling window.
    pub fn recent_error_count(&self) -> usize {
        self.recent_errors.len()
    }

    /// Failed share of attempts within the rolling error window.
    ///
    /// Both errors and attempts age out of the window, so the rate
    /// decays back to 0.0 once the transport has been healthy for a full
    /// window. 0.0 when no attempt falls inside the window.
    pub fn error_rate(&mut self, now: DateTime<Utc>) -> f64 {
        self.prune(now);
        if self.recent_attempts.is_empty() {
            return 0.0;
        }
        self.recent_errors.len() as f64 / self.recent_attempts.len() as f64
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let expired = |at: DateTime<Utc>| {
            (now - at).to_std().unwrap_or(Duration::ZERO) > ERROR_WINDOW
        };
        while self.recent_errors.front().is_some_and(|e| expired(e.occurred_at)) {
            self.recent_errors.pop_front();
        }
        while self.recent_attempts.front().is_some_and(|at| expired(*at)) {
            self.recent_attempts.pop_front();
        }
    }

    pub fn min_duration(&self) -> Option<Duration> {
        self.durations.iter().min().copied()
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.durations.iter().max().copied()
    }

    pub fn avg_duration(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let total: Duration = self.durations.iter().sum();
        Some(total / self.durations.len() as u32)
    }
}

/// Point-in-time health view suitable for a status dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub total_broadcasts: u64,
    pub successful_broadcasts: u64,
    pub failed_broadcasts: u64,
    pub circuit_breaker_trips: u64,
    pub backpressure_events: u64,
    pub recovery_events: u64,
    pub error_rate: f64,
    pub recent_errors: usize,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub avg_duration_ms: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub circuit_breaker_open: bool,
    pub backpressure_active: bool,
    pub queue_depth: usize,
}
