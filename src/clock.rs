//! Time source shared by the acquisition, ingestion and capture loops.
//!
//! Every loop in the crate that sleeps or measures elapsed time does so through
//! a [`Clock`], so reconnect and capture behaviour can be driven in tests
//! without real sleeps.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A monotonic time source that can also suspend the calling thread.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Suspend the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Create a shared system clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only advances when something sleeps on it.
///
/// Sleeps return immediately and move the clock forward, which makes
/// fixed-cadence loops deterministic. Every sleep is remembered so tests can
/// assert on backoff behaviour.
#[derive(Debug, Default)]
pub struct ManualClock {
    inner: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += duration;
        }
    }

    /// All sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .map(|state| state.sleeps.clone())
            .unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.inner.lock().map(|state| state.now).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += duration;
            state.sleeps.push(duration);
        }
    }
}
