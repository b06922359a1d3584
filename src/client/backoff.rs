//! Reconnect state machine with capped exponential backoff

use std::time::Duration;

/// Link state of a subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt`
    Backoff { attempt: u32, delay: Duration },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt `attempt` (1-based): `min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Drives [`LinkState`] transitions for the reconnect loop
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    attempt: u32,
    state: LinkState,
}

impl ReconnectPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connect
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn on_connecting(&mut self) -> LinkState {
        self.state = LinkState::Connecting;
        self.state
    }

    /// A connection was established; resets the attempt counter
    pub fn on_connected(&mut self) -> LinkState {
        self.attempt = 0;
        self.state = LinkState::Connected;
        self.state
    }

    /// The link dropped or a connect failed; returns how long to wait
    pub fn on_disconnected(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.config.delay_for(self.attempt);
        self.state = LinkState::Backoff {
            attempt: self.attempt,
            delay,
        };
        delay
    }

    /// Stop reconnecting
    pub fn on_stopped(&mut self) -> LinkState {
        self.state = LinkState::Disconnected;
        self.state
    }
}
