//! Sensor bridge: balance-board acquisition and serial forwarding.
//!
//! The bridge waits for the board to appear, assembles four-corner samples
//! from its input events and writes one text frame per sample to the serial
//! link. Transport faults are retried forever with a fixed backoff; the board
//! button ends the process.

pub mod assembler;
pub mod transport;
pub mod types;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod noop;

pub use assembler::{Assembly, SampleAssembler};
pub use transport::{FrameSink, SerialOpener, SinkOpener};
pub use types::{Corner, InputEvent, RawSample};

#[cfg(target_os = "linux")]
pub use linux::{EvdevBoard, EvdevFinder};

/// Platform-agnostic board finder
#[cfg(target_os = "linux")]
pub type Finder = EvdevFinder;

#[cfg(not(target_os = "linux"))]
pub use noop::NoopFinder;

/// Platform-agnostic board finder
#[cfg(not(target_os = "linux"))]
pub type Finder = NoopFinder;

use crate::clock::SharedClock;
use crate::config::BridgeConfig;
use crate::link::{BackoffPolicy, Link};
use crate::stats::SharedStats;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A blocking stream of input events from the board.
pub trait EventSource: Send {
    fn next_event(&mut self) -> io::Result<InputEvent>;
}

/// Locates the board among the host's input devices.
pub trait BoardFinder {
    fn find(&self, name: &str) -> io::Result<Option<Box<dyn EventSource>>>;
}

/// Errors that end the bridge.
#[derive(Debug)]
pub enum BridgeError {
    /// The board's event stream failed.
    Device(io::Error),
    /// The board button was pressed while measuring.
    Aborted,
    /// Shutdown was requested before the board was found.
    Stopped,
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Device(e) => write!(f, "Board device error: {e}"),
            BridgeError::Aborted => {
                write!(f, "User pressed board button while measuring, aborting")
            }
            BridgeError::Stopped => write!(f, "Stopped before the board was found"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Block until the board is found, polling at the configured interval.
pub fn discover_board(
    finder: &dyn BoardFinder,
    config: &BridgeConfig,
    clock: &SharedClock,
    running: &AtomicBool,
) -> Result<Box<dyn EventSource>, BridgeError> {
    info!("Waiting for '{}'...", config.board_name);
    while running.load(Ordering::SeqCst) {
        match finder.find(&config.board_name) {
            Ok(Some(source)) => {
                info!("Balance board found, please step on.");
                return Ok(source);
            }
            Ok(None) => {}
            Err(e) => debug!("Input device scan failed: {e}"),
        }
        clock.sleep(config.discovery_interval);
    }
    Err(BridgeError::Stopped)
}

/// The acquisition-and-forward loop.
pub struct Bridge {
    config: BridgeConfig,
    opener: Box<dyn SinkOpener>,
    clock: SharedClock,
    stats: SharedStats,
    assembler: SampleAssembler,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        opener: Box<dyn SinkOpener>,
        clock: SharedClock,
        stats: SharedStats,
    ) -> Self {
        Self {
            config,
            opener,
            clock,
            stats,
            assembler: SampleAssembler::new(),
        }
    }

    /// Read events until one complete sample is assembled.
    ///
    /// Incomplete cycles are dropped and assembly restarts; there is no
    /// retry limit.
    pub fn next_sample(&mut self, source: &mut dyn EventSource) -> Result<RawSample, BridgeError> {
        loop {
            let event = source.next_event().map_err(BridgeError::Device)?;
            match self.assembler.push(event) {
                Assembly::Complete(sample) => return Ok(sample),
                Assembly::Discarded => self.stats.record_sample_discarded(),
                Assembly::Abort => return Err(BridgeError::Aborted),
                Assembly::Pending | Assembly::Unrecognized => {}
            }
        }
    }

    /// Forward samples until `running` is cleared or the board fails.
    ///
    /// Serial faults close the link, wait out the backoff and reopen it.
    pub fn run(
        &mut self,
        source: &mut dyn EventSource,
        running: &AtomicBool,
    ) -> Result<(), BridgeError> {
        let mut link = Link::new(
            self.opener.name().to_string(),
            BackoffPolicy::fixed(self.config.reconnect_backoff),
        );

        while running.load(Ordering::SeqCst) {
            link.connecting();
            let mut sink = match self.opener.open() {
                Ok(sink) => sink,
                Err(e) => {
                    self.stats.record_reconnect();
                    link.failed(&e, self.clock.as_ref());
                    continue;
                }
            };
            link.connected();

            while running.load(Ordering::SeqCst) {
                let sample = self.next_sample(source)?;
                let written = sink
                    .discard_pending()
                    .and_then(|_| sink.write_frame(&sample.to_frame()));
                if let Err(e) = written {
                    self.stats.record_reconnect();
                    link.failed(&e, self.clock.as_ref());
                    break;
                }
                self.stats.record_frame_sent();
                self.clock.sleep(self.config.frame_interval);
            }
        }
        Ok(())
    }
}
