//! Reconnect state shared by both ends of the serial link.
//!
//! The bridge and the host run the same `disconnected → connecting →
//! connected` cycle with a fixed backoff between attempts and no attempt
//! limit.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection state of one end of the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub interval: Duration,
}

impl BackoffPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }

    /// Delay before the given retry attempt (1-based).
    pub fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

/// Tracks one end of the link through its reconnect cycle.
#[derive(Debug)]
pub struct Link {
    name: String,
    state: LinkState,
    attempts: u32,
    policy: BackoffPolicy,
}

impl Link {
    pub fn new(name: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            name: name.into(),
            state: LinkState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Failed attempts since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn connecting(&mut self) {
        self.state = LinkState::Connecting;
        debug!("Connecting {}...", self.name);
    }

    pub fn connected(&mut self) {
        if self.attempts > 0 {
            info!(
                "{} reconnected after {} attempt(s)",
                self.name, self.attempts
            );
        } else {
            info!("{} connected", self.name);
        }
        self.state = LinkState::Connected;
        self.attempts = 0;
    }

    /// Record a transport fault and wait out the backoff on `clock`.
    pub fn failed(&mut self, error: &dyn std::fmt::Display, clock: &dyn Clock) {
        self.state = LinkState::Disconnected;
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.policy.delay(self.attempts);
        warn!(
            "{}: {error}, retrying in {:.1}s",
            self.name,
            delay.as_secs_f64()
        );
        clock.sleep(delay);
    }
}
