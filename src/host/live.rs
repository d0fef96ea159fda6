//! Bounded live buffer shared by ingestion, display and capture.
//!
//! One writer (the ingestion thread) appends and evicts; readers take whole
//! snapshots under the lock so they never observe a half-updated window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of points kept for display.
pub const DEFAULT_LIVE_CAPACITY: usize = 50;

/// A timestamped center-of-pressure point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    pub at: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
}

impl LivePoint {
    pub fn new(at: DateTime<Utc>, x: f64, y: f64) -> Self {
        Self { at, x, y }
    }
}

/// Fixed-capacity FIFO window of recent points.
#[derive(Debug)]
pub struct LiveBuffer {
    capacity: usize,
    points: Mutex<VecDeque<LivePoint>>,
}

/// Thread-safe handle to a live buffer.
pub type SharedLiveBuffer = Arc<LiveBuffer>;

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    pub fn shared(capacity: usize) -> SharedLiveBuffer {
        Arc::new(Self::new(capacity))
    }

    fn points(&self) -> MutexGuard<'_, VecDeque<LivePoint>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a point, evicting from the front once over capacity.
    pub fn push(&self, point: LivePoint) {
        let mut points = self.points();
        points.push_back(point);
        while points.len() > self.capacity {
            points.pop_front();
        }
    }

    /// Most recent point.
    pub fn latest(&self) -> Option<LivePoint> {
        self.points().back().copied()
    }

    /// Copy of the whole window, oldest first.
    pub fn snapshot(&self) -> Vec<LivePoint> {
        self.points().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    pub fn clear(&self) {
        self.points().clear();
    }
}

impl Default for LiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_CAPACITY)
    }
}
