//! Link statistics.
//!
//! Counters for what crossed the serial link and what the pipeline did with
//! it. Updated from the acquisition, ingestion and capture threads without
//! locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current process.
#[derive(Debug)]
pub struct LinkStats {
    /// Frames written by the bridge
    frames_sent: AtomicU64,
    /// Frames parsed into live points by the host
    frames_received: AtomicU64,
    /// Lines the host could not parse
    frames_rejected: AtomicU64,
    /// Four-channel frames seen with no board geometry configured
    frames_unreduced: AtomicU64,
    /// Incomplete acquisition cycles dropped by the bridge
    samples_discarded: AtomicU64,
    /// Transport faults followed by a reconnect attempt
    reconnects: AtomicU64,
    /// Recordings that ran to completion
    recordings_completed: AtomicU64,
    /// Recordings aborted during capture
    recordings_aborted: AtomicU64,
    started: DateTime<Utc>,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            frames_unreduced: AtomicU64::new(0),
            samples_discarded: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            recordings_completed: AtomicU64::new(0),
            recordings_aborted: AtomicU64::new(0),
            started: Utc::now(),
        }
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_unreduced(&self) {
        self.frames_unreduced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_discarded(&self) {
        self.samples_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recording_completed(&self) {
        self.recordings_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recording_aborted(&self) {
        self.recordings_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_unreduced: self.frames_unreduced.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            recordings_completed: self.recordings_completed.load(Ordering::Relaxed),
            recordings_aborted: self.recordings_aborted.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Summary for the end of a bridge or host run.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Link Statistics:\n\
             - Frames sent: {}\n\
             - Frames received: {}\n\
             - Frames rejected: {}\n\
             - Frames without CoP reduction: {}\n\
             - Incomplete samples discarded: {}\n\
             - Reconnects: {}\n\
             - Recordings completed: {}\n\
             - Recordings aborted: {}\n\
             - Uptime: {} seconds",
            s.frames_sent,
            s.frames_received,
            s.frames_rejected,
            s.frames_unreduced,
            s.samples_discarded,
            s.reconnects,
            s.recordings_completed,
            s.recordings_aborted,
            s.uptime_secs
        )
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub frames_unreduced: u64,
    pub samples_discarded: u64,
    pub reconnects: u64,
    pub recordings_completed: u64,
    pub recordings_aborted: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<LinkStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(LinkStats::new())
}
