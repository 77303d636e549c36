use std::fmt;
use std::time::{Duration, Instant};

/// No response within this window fails the outstanding request.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Minimum spacing between any two frames put on the bus.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTimings {
    pub response_timeout: Duration,
    pub min_send_interval: Duration,
}

impl Default for SchedulerTimings {
    fn default() -> Self {
        Self {
            response_timeout: RESPONSE_TIMEOUT,
            min_send_interval: MIN_SEND_INTERVAL,
        }
    }
}

/// Where the poll engine is. `position` always indexes the catalog;
/// `resume` is the catalog position polling continues from once the write
/// queue has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Polling { position: usize },
    AwaitingRead { position: usize, sent_at: Instant },
    Writing { resume: usize },
    AwaitingWrite { sent_at: Instant, resume: usize },
}

impl SchedulerState {
    pub fn is_awaiting(&self) -> bool {
        self.sent_at().is_some()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SchedulerState::Idle)
    }

    pub fn sent_at(&self) -> Option<Instant> {
        match *self {
            SchedulerState::AwaitingRead { sent_at, .. } | SchedulerState::AwaitingWrite { sent_at, .. } => {
                Some(sent_at)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => f.write_str("idle"),
            SchedulerState::Polling { position } => write!(f, "polling #{}", position),
            SchedulerState::AwaitingRead { position, .. } => write!(f, "awaiting read #{}", position),
            SchedulerState::Writing { .. } => f.write_str("writing"),
            SchedulerState::AwaitingWrite { .. } => f.write_str("awaiting write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_awaiting_states_carry_sent_at() {
        let now = Instant::now();
        assert!(!SchedulerState::Idle.is_awaiting());
        assert!(!SchedulerState::Polling { position: 3 }.is_awaiting());
        assert!(!SchedulerState::Writing { resume: 0 }.is_awaiting());
        assert_eq!(
            SchedulerState::AwaitingRead { position: 1, sent_at: now }.sent_at(),
            Some(now)
        );
        assert_eq!(
            SchedulerState::AwaitingWrite { sent_at: now, resume: 2 }.sent_at(),
            Some(now)
        );
    }

    #[test]
    fn test_default_timings() {
        let timings = SchedulerTimings::default();
        assert_eq!(timings.response_timeout, Duration::from_secs(15));
        assert_eq!(timings.min_send_interval, Duration::from_secs(1));
        assert!(SchedulerState::default().is_idle());
    }
}
