/// Ordered ladder of recovery strategies tried when the circuit opens.
///
/// Each strategy is applied and followed by a synthetic health-check
/// delivery; the first one whose health check succeeds closes the
/// breaker. The ladder escalates from a plain pause to a full reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Wait out a transient fault, then probe.
    Pause,
    /// Ask the transport to re-establish its connection, then probe.
    ConnectionReset,
    /// Reset transport and monitor state, then probe.
    FullReset,
}

impl RecoveryStrategy {
    /// The strategies in escalation order.
    pub fn ladder() -> [RecoveryStrategy; 3] {
        [Self::Pause, Self::ConnectionReset, Self::FullReset]
    }

    /// Position in the ladder, reported to recovery handlers.
    pub fn index(&self) -> usize {
        match self {
            Self::Pause => 0,
            Self::ConnectionReset => 1,
            Self::FullReset => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        let ladder = RecoveryStrategy::ladder();
        assert_eq!(ladder[0], RecoveryStrategy::Pause);
        assert_eq!(ladder[1], RecoveryStrategy::ConnectionReset);
        assert_eq!(ladder[2], RecoveryStrategy::FullReset);
        for (i, strategy) in ladder.iter().enumerate() {
            assert_eq!(strategy.index(), i);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(RecoveryStrategy::ConnectionReset.to_string(), "connection_reset");
    }
}
