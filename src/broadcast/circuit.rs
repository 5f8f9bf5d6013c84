use chrono::{DateTime, Utc};
use std::time::Duration;

/// Circuit breaker state owned by the broadcast monitor.
///
/// Opens after a run of consecutive failures, closes after a run of
/// consecutive successes or an elapsed recovery timeout. All mutation
/// goes through the monitor's recording paths; the struct itself carries
/// no locking.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    open: bool,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Whether `recovery_timeout` has elapsed since the breaker opened.
    /// Only meaningful while open.
    pub fn recovery_elapsed(&self, recovery_timeout: Duration, now: DateTime<Utc>) -> bool {
        match self.opened_at {
            Some(opened_at) if self.open => {
                let elapsed = (now - opened_at).to_std().unwrap_or(Duration::ZERO);
                elapsed >= recovery_timeout
            }
            _ => false,
        }
    }

    /// Records a successful delivery. Returns `true` when this success
    /// run closes an open breaker.
    pub fn record_success(&mut self, success_threshold: u32) -> bool {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        if self.open && self.consecutive_successes >= success_threshold {
            self.close();
            return true;
        }
        false
    }

    /// Records a failed delivery. Returns `true` when this failure trips
    /// the breaker open.
    pub fn record_failure(&mut self, failure_threshold: u32) -> bool {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        if !self.open && self.consecutive_failures >= failure_threshold {
            self.open = true;
            self.opened_at = Some(Utc::now());
            return true;
        }
        false
    }

    /// Closes the breaker and clears the counters.
    pub fn close(&mut self) {
        self.open = false;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_opens_at_threshold() {
        let mut breaker = CircuitBreaker::new();
        for _ in 0..4 {
            assert!(!breaker.record_failure(5));
        }
        assert!(!breaker.is_open());
        assert!(breaker.record_failure(5));
        assert!(breaker.is_open());
        assert!(breaker.opened_at().is_some());
    }

    #[test]
    fn test_success_resets_failure_run() {
        let mut breaker = CircuitBreaker::new();
        breaker.record_failure(5);
        breaker.record_failure(5);
        breaker.record_success(3);
        assert_eq!(breaker.consecutive_failures(), 0);
        // the run starts over
        for _ in 0..4 {
            breaker.record_failure(5);
        }
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_closes_after_success_run() {
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(5);
        }
        assert!(breaker.is_open());

        assert!(!breaker.record_success(3));
        assert!(!breaker.record_success(3));
        assert!(breaker.record_success(3));
        assert!(!breaker.is_open());
        assert!(breaker.opened_at().is_none());
    }

    #[test]
    fn test_recovery_elapsed() {
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(5);
        }
        let now = Utc::now();
        assert!(!breaker.recovery_elapsed(std::time::Duration::from_secs(60), now));
        assert!(breaker.recovery_elapsed(
            std::time::Duration::from_secs(60),
            now + ChronoDuration::seconds(61)
        ));
    }

    #[test]
    fn test_recovery_elapsed_only_while_open() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.recovery_elapsed(
            std::time::Duration::ZERO,
            Utc::now() + ChronoDuration::days(1)
        ));
    }
}
