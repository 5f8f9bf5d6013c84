use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{CoordinationResult, Error};

/// Top-level configuration for the coordination layer.
///
/// Deserializable from JSON; every field has a sensible default so an
/// empty object `{}` yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub tasks: TaskConfig,

    #[serde(default)]
    pub queues: QueueConfig,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            broadcast: BroadcastConfig::default(),
            router: RouterConfig::default(),
            tasks: TaskConfig::default(),
            queues: QueueConfig::default(),
        }
    }
}

impl CoordinationConfig {
    // Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoordinationResult<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::config(format!("failed to open config file: {}", e)))?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .map_err(|e| Error::config(format!("failed to parse config file: {}", e)))?;
        Ok(config)
    }
}

/// Circuit breaker, backpressure and recovery tuning for the broadcast
/// health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Consecutive delivery failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successes required to close an open circuit.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Elapsed time after which an open circuit resets on the next call.
    #[serde(default = "default_recovery_timeout", with = "duration_ms")]
    pub recovery_timeout: Duration,

    /// Delivery duration above which backpressure is flagged.
    #[serde(default = "default_backpressure_threshold", with = "duration_ms")]
    pub backpressure_threshold: Duration,

    /// Capacity of the bounded queue used while backpressure is active.
    #[serde(default = "default_backpressure_queue_size")]
    pub backpressure_queue_size: usize,

    /// How long a backpressured message waits for queue space before
    /// being dropped.
    #[serde(default = "default_enqueue_timeout", with = "duration_ms")]
    pub enqueue_timeout: Duration,

    /// Poll interval of the backpressure drain monitor.
    #[serde(default = "default_drain_interval", with = "duration_ms")]
    pub drain_check_interval: Duration,

    /// Pause applied by the first recovery strategy before its health
    /// check.
    #[serde(default = "default_recovery_pause", with = "duration_ms")]
    pub recovery_pause: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            recovery_timeout: default_recovery_timeout(),
            backpressure_threshold: default_backpressure_threshold(),
            backpressure_queue_size: default_backpressure_queue_size(),
            enqueue_timeout: default_enqueue_timeout(),
            drain_check_interval: default_drain_interval(),
            recovery_pause: default_recovery_pause(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Default timeout for `send_request_response` when the caller does
    /// not supply one.
    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Interval of the maintenance loop (deadline sweep + cleanup).
    #[serde(default = "default_maintenance_interval", with = "duration_ms")]
    pub maintenance_interval: Duration,

    /// Completed tasks older than this are purged by the cleanup sweep.
    #[serde(default = "default_max_task_age_hours")]
    pub max_task_age_hours: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: default_maintenance_interval(),
            max_task_age_hours: default_max_task_age_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Default concurrency bound for `execute_concurrent`.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_event_buffer_size() -> usize {
    256
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    3
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_backpressure_threshold() -> Duration {
    Duration::from_secs(2)
}

fn default_backpressure_queue_size() -> usize {
    16
}

fn default_enqueue_timeout() -> Duration {
    Duration::from_millis(100)
}

fn default_drain_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_recovery_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_maintenance_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_task_age_hours() -> u64 {
    24
}

fn default_max_concurrent() -> usize {
    4
}

// Duration serialization helper (milliseconds on the wire).
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = CoordinationConfig::default();
        assert_eq!(config.broadcast.failure_threshold, 5);
        assert_eq!(config.broadcast.success_threshold, 3);
        assert_eq!(config.broadcast.recovery_timeout, Duration::from_secs(60));
        assert_eq!(
            config.broadcast.backpressure_threshold,
            Duration::from_secs(2)
        );
        assert_eq!(config.router.request_timeout, Duration::from_secs(30));
        assert_eq!(config.tasks.max_task_age_hours, 24);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: CoordinationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.event_buffer_size, 256);
        assert_eq!(config.queues.max_concurrent, 4);
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "broadcast": { "failure_threshold": 2, "recovery_timeout": 5000 },
            "router": { "request_timeout": 1000 }
        }"#;
        let config: CoordinationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.broadcast.failure_threshold, 2);
        assert_eq!(config.broadcast.recovery_timeout, Duration::from_secs(5));
        // untouched fields keep their defaults
        assert_eq!(config.broadcast.success_threshold, 3);
        assert_eq!(config.router.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_round_trip() {
        let config = CoordinationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CoordinationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.broadcast.enqueue_timeout, Duration::from_millis(100));
        assert_eq!(back.tasks.maintenance_interval, Duration::from_secs(30));
    }
}
