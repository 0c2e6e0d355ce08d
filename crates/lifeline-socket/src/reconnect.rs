use std::time::Duration;

/// Exponential backoff schedule for reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to the doubled delay.
    pub max_delay: Duration,
    /// Retries allowed before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 20,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }
}

/// Connection-level state of the reconnect machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A connection attempt is in flight.
    Connecting,
    /// A transport is live.
    Open,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Retries exhausted. Terminal; nothing is ever scheduled again.
    Failed,
}

/// What to do after a disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Schedule another connection attempt after this delay.
    Retry(Duration),
    /// Retries exhausted; the session is over.
    GiveUp,
}

/// Retry bookkeeping for one logical session.
///
/// Pure state: the owner drives it from transport outcomes and runs the
/// timer itself. Every `(state, event)` pair is defined; events that make
/// no sense for the current state are absorbed without effect.
#[derive(Debug)]
pub struct ReconnectState {
    policy: BackoffPolicy,
    state: LinkState,
    attempts: u32,
}

impl ReconnectState {
    /// Start in `Connecting` with no attempts consumed.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: LinkState::Connecting,
            attempts: 0,
        }
    }

    /// A transport opened: reset the attempt counter.
    pub fn on_open(&mut self) {
        if self.state != LinkState::Failed {
            self.state = LinkState::Open;
            self.attempts = 0;
        }
    }

    /// The transport closed, errored, or failed to connect.
    pub fn on_disconnect(&mut self) -> Disposition {
        if self.state == LinkState::Failed || self.attempts >= self.policy.max_attempts {
            self.state = LinkState::Failed;
            return Disposition::GiveUp;
        }
        self.attempts += 1;
        self.state = LinkState::Reconnecting;
        Disposition::Retry(self.policy.delay_for(self.attempts))
    }

    /// The backoff delay elapsed; a new attempt is starting.
    pub fn on_retry(&mut self) {
        if self.state == LinkState::Reconnecting {
            self.state = LinkState::Connecting;
        }
    }

    /// Current connection-level state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Reconnect attempts consumed so far in this outage.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The policy this machine runs under.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
