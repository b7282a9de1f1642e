//! Reconnect state machine
//!
//! Decides when a session retries after a failure. The machine holds no
//! clock: it hands the delay for the next attempt back to the driver, which
//! owns the single retry timer.

use std::time::Duration;

use super::ConnectionStatus;

/// Backoff ladder and retry bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before each retry; attempts past the end reuse the last entry
    pub delays: Vec<Duration>,
    /// Retries allowed before the session gives up
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30),
            ],
            max_retries: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        self.delays
            .get(idx)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No connection and none wanted
    Idle,
    /// Transport open or handshake in flight
    Connecting,
    /// Handshake done, topic subscribed
    Connected,
    /// Waiting to run retry `n`
    Backoff(u32),
    /// Retries exhausted; only a manual reconnect leaves this state
    Failed,
}

/// Explicit reconnect state machine
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: ReconnectState,
    retry_count: u32,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ReconnectState::Idle,
            retry_count: 0,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Status reported to callers for the current state
    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            ReconnectState::Idle => ConnectionStatus::Disconnected,
            ReconnectState::Connecting => ConnectionStatus::Connecting,
            ReconnectState::Connected => ConnectionStatus::Connected,
            ReconnectState::Backoff(_) | ReconnectState::Failed => ConnectionStatus::Error,
        }
    }

    /// Whether a retry is scheduled
    pub fn is_reconnecting(&self) -> bool {
        matches!(self.state, ReconnectState::Backoff(_))
    }

    /// A connection attempt starts (initial connect or a retry firing)
    pub fn begin_attempt(&mut self) {
        self.state = ReconnectState::Connecting;
    }

    /// Handshake completed
    pub fn opened(&mut self) {
        self.state = ReconnectState::Connected;
        self.retry_count = 0;
    }

    /// The attempt or the live connection failed
    ///
    /// Returns the delay before the next retry, or `None` once the retry
    /// bound is reached and the machine is terminally failed.
    pub fn failed(&mut self) -> Option<Duration> {
        if self.retry_count >= self.policy.max_retries {
            self.state = ReconnectState::Failed;
            return None;
        }
        self.retry_count += 1;
        self.state = ReconnectState::Backoff(self.retry_count);
        Some(self.policy.delay_for(self.retry_count))
    }

    /// Manual reconnect: reset the counter and attempt immediately
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.state = ReconnectState::Connecting;
    }

    /// Caller-requested teardown
    pub fn closed(&mut self) {
        self.state = ReconnectState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30, 30]);
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let machine = ReconnectMachine::new(ReconnectPolicy::default());
        assert_eq!(machine.state(), ReconnectState::Idle);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_sixth_retry_is_never_scheduled() {
        let mut machine = ReconnectMachine::new(ReconnectPolicy::default());

        machine.begin_attempt();
        let mut scheduled = Vec::new();
        while let Some(delay) = machine.failed() {
            scheduled.push(delay.as_secs());
            assert_eq!(machine.status(), ConnectionStatus::Error);
            assert!(machine.is_reconnecting());
            machine.begin_attempt();
        }

        assert_eq!(scheduled, vec![5, 10, 20, 30, 30]);
        assert_eq!(machine.state(), ReconnectState::Failed);
        assert_eq!(machine.status(), ConnectionStatus::Error);
        assert!(!machine.is_reconnecting());

        // Still terminal on further failures
        assert_eq!(machine.failed(), None);
    }

    #[test]
    fn test_successful_open_resets_counter() {
        let mut machine = ReconnectMachine::new(ReconnectPolicy::default());
        machine.begin_attempt();
        machine.failed();
        machine.begin_attempt();
        machine.failed();
        assert_eq!(machine.retry_count(), 2);

        machine.begin_attempt();
        machine.opened();
        assert_eq!(machine.retry_count(), 0);
        assert_eq!(machine.status(), ConnectionStatus::Connected);

        assert_eq!(machine.failed(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_manual_reconnect_leaves_failed_state() {
        let policy = ReconnectPolicy {
            delays: vec![Duration::from_millis(10)],
            max_retries: 1,
        };
        let mut machine = ReconnectMachine::new(policy);
        machine.begin_attempt();
        assert!(machine.failed().is_some());
        machine.begin_attempt();
        assert!(machine.failed().is_none());
        assert_eq!(machine.state(), ReconnectState::Failed);

        machine.reset();
        assert_eq!(machine.retry_count(), 0);
        assert_eq!(machine.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_requested_close_is_not_an_error() {
        let mut machine = ReconnectMachine::new(ReconnectPolicy::default());
        machine.begin_attempt();
        machine.opened();
        machine.closed();
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }
}
