//! Host status, observable from any thread.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Where the host is in `disconnected → connected → displaying → recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Disconnected,
    /// Port open, nothing parsed yet
    Connected,
    /// Receiving data
    Displaying,
    Recording,
}

impl HostStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HostStatus::Connected,
            2 => HostStatus::Displaying,
            3 => HostStatus::Recording,
            _ => HostStatus::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            HostStatus::Disconnected => 0,
            HostStatus::Connected => 1,
            HostStatus::Displaying => 2,
            HostStatus::Recording => 3,
        }
    }

    /// True when live data is arriving, whether or not it is being recorded.
    pub fn has_data(self) -> bool {
        matches!(self, HostStatus::Displaying | HostStatus::Recording)
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostStatus::Disconnected => "disconnected",
            HostStatus::Connected => "connected",
            HostStatus::Displaying => "displaying",
            HostStatus::Recording => "recording",
        };
        f.write_str(s)
    }
}

/// Atomic holder for the host status.
///
/// Ingestion reports link events; the recorder enters and leaves
/// `Recording`. Link events never overwrite `Recording` with `Displaying`,
/// and leaving `Recording` only happens if the link is still up.
#[derive(Debug)]
pub struct StatusCell {
    value: AtomicU8,
}

pub type SharedStatus = Arc<StatusCell>;

impl StatusCell {
    pub fn new() -> Self {
        Self {
            value: AtomicU8::new(HostStatus::Disconnected.as_u8()),
        }
    }

    pub fn shared() -> SharedStatus {
        Arc::new(Self::new())
    }

    pub fn get(&self) -> HostStatus {
        HostStatus::from_u8(self.value.load(Ordering::SeqCst))
    }

    pub fn set(&self, status: HostStatus) {
        self.value.store(status.as_u8(), Ordering::SeqCst);
    }

    /// The link dropped.
    pub fn disconnected(&self) {
        self.set(HostStatus::Disconnected);
    }

    /// A port was opened.
    pub fn connected(&self) {
        self.set(HostStatus::Connected);
    }

    /// A frame was parsed. Leaves `Recording` alone.
    pub fn data_received(&self) {
        let _ = self.value.compare_exchange(
            HostStatus::Connected.as_u8(),
            HostStatus::Displaying.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Enter `Recording`, only from `Displaying`.
    pub fn begin_recording(&self) -> Result<(), HostStatus> {
        self.value
            .compare_exchange(
                HostStatus::Displaying.as_u8(),
                HostStatus::Recording.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(HostStatus::from_u8)
    }

    /// Leave `Recording`, back to `Displaying` if the link survived.
    pub fn end_recording(&self) {
        let _ = self.value.compare_exchange(
            HostStatus::Recording.as_u8(),
            HostStatus::Displaying.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Which surface the host is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMode {
    /// Ingesting and displaying live data
    Live,
    /// Reviewing a recording; ingestion releases the port
    Analysis,
}

/// Atomic holder for the host mode.
#[derive(Debug)]
pub struct ModeCell {
    live: AtomicBool,
}

pub type SharedMode = Arc<ModeCell>;

impl ModeCell {
    pub fn new(mode: HostMode) -> Self {
        Self {
            live: AtomicBool::new(mode == HostMode::Live),
        }
    }

    pub fn shared(mode: HostMode) -> SharedMode {
        Arc::new(Self::new(mode))
    }

    pub fn get(&self) -> HostMode {
        if self.live.load(Ordering::SeqCst) {
            HostMode::Live
        } else {
            HostMode::Analysis
        }
    }

    pub fn set(&self, mode: HostMode) {
        self.live.store(mode == HostMode::Live, Ordering::SeqCst);
    }
}
