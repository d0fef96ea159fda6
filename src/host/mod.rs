//! Session host: serial ingestion, live display state and recording.
//!
//! ```text
//!  serial ──▶ IngestTask ──▶ LiveBuffer ──▶ render (snapshot)
//!                 │              │
//!                 ▼              ▼
//!            StatusCell ◀──── Recorder ──▶ Recording
//! ```

pub mod frame;
pub mod ingest;
pub mod live;
pub mod ports;
pub mod recorder;
pub mod status;

pub use frame::{parse_line, BoardGeometry, Frame};
pub use ingest::{IngestTask, LineSource, LinkOpener, SerialLinkOpener};
pub use live::{LiveBuffer, LivePoint, SharedLiveBuffer};
pub use ports::{filter_ports, PortInfo, PortLister, PortSelector, SerialPortLister};
pub use recorder::{RecordError, Recorder, RecorderEvent};
pub use status::{HostMode, HostStatus, ModeCell, SharedMode, SharedStatus, StatusCell};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::export::SessionFile;
use crate::stats::SharedStats;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Shared state of a running session host.
pub struct SessionHost {
    config: Config,
    live: SharedLiveBuffer,
    status: SharedStatus,
    mode: SharedMode,
    selector: Arc<PortSelector>,
    stats: SharedStats,
    clock: SharedClock,
    recorder: Recorder,
    running: Arc<AtomicBool>,
}

impl SessionHost {
    pub fn new(config: Config, selector: PortSelector, clock: SharedClock, stats: SharedStats) -> Self {
        let live = LiveBuffer::shared(config.host.live_capacity);
        let status = StatusCell::shared();
        let recorder = Recorder::new(
            config.recording.clone(),
            config.practitioner.clone(),
            live.clone(),
            status.clone(),
            stats.clone(),
            clock.clone(),
        );
        Self {
            config,
            live,
            status,
            mode: ModeCell::shared(HostMode::Live),
            selector: Arc::new(selector),
            stats,
            clock,
            recorder,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Start the ingestion thread on the given port source and opener.
    pub fn spawn_ingest(
        &self,
        lister: Box<dyn PortLister>,
        opener: Box<dyn LinkOpener>,
    ) -> io::Result<JoinHandle<()>> {
        let task = IngestTask::new(
            self.config.host.clone(),
            self.config.analysis.board_geometry,
            lister,
            opener,
            self.selector.clone(),
            self.live.clone(),
            self.status.clone(),
            self.mode.clone(),
            self.stats.clone(),
            self.clock.clone(),
        );
        let running = self.running.clone();
        thread::Builder::new()
            .name("ingest".to_string())
            .spawn(move || task.run(&running))
    }

    /// Start the ingestion thread on real serial ports.
    pub fn spawn_serial_ingest(&self) -> io::Result<JoinHandle<()>> {
        self.spawn_ingest(
            Box::new(SerialPortLister),
            Box::new(SerialLinkOpener::new(
                self.config.serial.baud_rate,
                self.config.serial.read_timeout,
            )),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn live(&self) -> &SharedLiveBuffer {
        &self.live
    }

    pub fn status(&self) -> HostStatus {
        self.status.get()
    }

    pub fn mode(&self) -> HostMode {
        self.mode.get()
    }

    /// Switch mode; leaving `Live` makes ingestion release the port.
    pub fn set_mode(&self, mode: HostMode) {
        self.mode.set(mode);
    }

    pub fn selector(&self) -> &PortSelector {
        &self.selector
    }

    /// Load a saved session as the current recording and switch to analysis.
    pub fn open_session(&self, path: &Path) -> Result<SessionFile, RecordError> {
        let session = self.recorder.load(path)?;
        self.set_mode(HostMode::Analysis);
        Ok(session)
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Shared stop flag for the ingestion thread.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
