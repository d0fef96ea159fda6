//! Background serial ingestion.
//!
//! The ingestion task owns the host's end of the serial link. It rescans
//! ports, holds a connection while the host is live, parses each line and
//! feeds the live buffer. Anything that does not parse is "no data yet";
//! transport faults drop the status to disconnected and retry after a fixed
//! backoff, forever.

use crate::clock::SharedClock;
use crate::config::HostConfig;
use crate::host::frame::{parse_line, BoardGeometry, Frame};
use crate::host::live::{LivePoint, SharedLiveBuffer};
use crate::host::ports::{filter_ports, PortLister, PortSelector};
use crate::host::status::{HostMode, SharedMode, SharedStatus};
use crate::link::{BackoffPolicy, Link};
use crate::stats::SharedStats;
use chrono::Utc;
use serialport::SerialPort;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest line kept while waiting for a newline.
const MAX_PENDING: usize = 4096;

/// A connected link yielding text lines.
pub trait LineSource: Send {
    /// Next complete line, or `None` if nothing arrived within the read
    /// timeout.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Opens a line source on a named port.
pub trait LinkOpener: Send + Sync {
    fn open(&self, port: &str) -> io::Result<Box<dyn LineSource>>;
}

/// Line reader over a `serialport` handle.
pub struct SerialLineSource {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialLineSource {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl LineSource for SerialLineSource {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut buf = [0u8; 256];
        match self.port.read(&mut buf) {
            Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(e),
        }

        if self.pending.len() > MAX_PENDING && !self.pending.contains(&b'\n') {
            debug!("Dropping {} bytes without a line break", self.pending.len());
            self.pending.clear();
        }
        Ok(self.take_line())
    }
}

/// Opens serial ports at a fixed baud rate and read timeout.
#[derive(Debug, Clone)]
pub struct SerialLinkOpener {
    baud_rate: u32,
    timeout: Duration,
}

impl SerialLinkOpener {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

impl LinkOpener for SerialLinkOpener {
    fn open(&self, port: &str) -> io::Result<Box<dyn LineSource>> {
        let port = serialport::new(port, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(SerialLineSource::new(port)))
    }
}

/// The long-lived ingestion loop and the state it feeds.
pub struct IngestTask {
    config: HostConfig,
    geometry: Option<BoardGeometry>,
    lister: Box<dyn PortLister>,
    opener: Box<dyn LinkOpener>,
    selector: Arc<PortSelector>,
    live: SharedLiveBuffer,
    status: SharedStatus,
    mode: SharedMode,
    stats: SharedStats,
    clock: SharedClock,
}

impl IngestTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: HostConfig,
        geometry: Option<BoardGeometry>,
        lister: Box<dyn PortLister>,
        opener: Box<dyn LinkOpener>,
        selector: Arc<PortSelector>,
        live: SharedLiveBuffer,
        status: SharedStatus,
        mode: SharedMode,
        stats: SharedStats,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            geometry,
            lister,
            opener,
            selector,
            live,
            status,
            mode,
            stats,
            clock,
        }
    }

    /// Run until `running` is cleared.
    pub fn run(&self, running: &AtomicBool) {
        let mut link = Link::new("Serial link", BackoffPolicy::fixed(self.config.reconnect_backoff));

        while running.load(Ordering::SeqCst) {
            if self.mode.get() != HostMode::Live {
                self.clock.sleep(self.config.idle_interval);
                continue;
            }

            let Some(port) = self.scan() else {
                self.clock.sleep(self.config.idle_interval);
                continue;
            };

            link.connecting();
            info!("Opening serial port {port}...");
            let mut source = match self.opener.open(&port) {
                Ok(source) => source,
                Err(e) => {
                    self.fault(&mut link, &e);
                    continue;
                }
            };
            link.connected();
            self.status.connected();
            info!("Serial port {port} successfully opened.");

            match self.pump(&port, source.as_mut(), running) {
                Ok(()) => {
                    debug!("Releasing serial port {port}");
                    self.status.disconnected();
                }
                Err(e) => self.fault(&mut link, &e),
            }
        }
    }

    /// Rescan ports and return the one to connect to.
    fn scan(&self) -> Option<String> {
        let ports = match self.lister.list() {
            Ok(ports) => filter_ports(ports, &self.config.excluded_ports),
            Err(e) => {
                debug!("Port scan failed: {e}");
                Vec::new()
            }
        };
        self.selector.resolve(ports)
    }

    /// Read from a connected source until the port or mode changes.
    fn pump(
        &self,
        port: &str,
        source: &mut dyn LineSource,
        running: &AtomicBool,
    ) -> io::Result<()> {
        while running.load(Ordering::SeqCst)
            && self.mode.get() == HostMode::Live
            && self.selector.is_selected(port)
        {
            let accepted = match source.read_line()? {
                Some(line) => self.ingest_line(&line),
                None => false,
            };
            if !accepted {
                self.clock.sleep(self.config.poll_interval);
            }
        }
        Ok(())
    }

    fn fault(&self, link: &mut Link, error: &io::Error) {
        self.status.disconnected();
        self.stats.record_reconnect();
        link.failed(error, self.clock.as_ref());
    }

    /// Parse one line into the live buffer. Returns whether a point was added.
    pub fn ingest_line(&self, line: &str) -> bool {
        let point = match parse_line(line) {
            Some(Frame::Position { x, y }) => Some((x, y)),
            Some(Frame::Corners(sample)) => match &self.geometry {
                Some(geometry) => geometry.reduce(&sample),
                None => {
                    self.stats.record_frame_unreduced();
                    None
                }
            },
            None => {
                if !line.trim().is_empty() {
                    debug!("Ignoring malformed line {line:?}");
                    self.stats.record_frame_rejected();
                }
                None
            }
        };

        match point {
            Some((x, y)) => {
                self.live.push(LivePoint::new(Utc::now(), x, y));
                self.status.data_received();
                self.stats.record_frame_received();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::live::LiveBuffer;
    use crate::host::ports::PortInfo;
    use crate::host::status::{HostStatus, ModeCell, StatusCell};
    use crate::stats::create_shared_stats;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedLister(Vec<PortInfo>);

    impl PortLister for FixedLister {
        fn list(&self) -> io::Result<Vec<PortInfo>> {
            Ok(self.0.clone())
        }
    }

    enum Step {
        Line(&'static str),
        Quiet,
        Fail,
    }

    /// Each open hands out the next script; running out of scripts stops
    /// the task.
    struct ScriptedOpener {
        scripts: Mutex<VecDeque<Vec<Step>>>,
        running: Arc<AtomicBool>,
        opened: Mutex<Vec<String>>,
    }

    struct ScriptedSource {
        steps: VecDeque<Step>,
        running: Arc<AtomicBool>,
    }

    impl LineSource for ScriptedSource {
        fn read_line(&mut self) -> io::Result<Option<String>> {
            match self.steps.pop_front() {
                Some(Step::Line(s)) => Ok(Some(s.to_string())),
                Some(Step::Quiet) => Ok(None),
                Some(Step::Fail) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
                None => {
                    self.running.store(false, Ordering::SeqCst);
                    Ok(None)
                }
            }
        }
    }

    impl LinkOpener for ScriptedOpener {
        fn open(&self, port: &str) -> io::Result<Box<dyn LineSource>> {
            self.opened.lock().unwrap().push(port.to_string());
            let steps = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "gone"))?;
            Ok(Box::new(ScriptedSource {
                steps: steps.into(),
                running: self.running.clone(),
            }))
        }
    }

    struct Harness {
        task: IngestTask,
        live: SharedLiveBuffer,
        status: SharedStatus,
        stats: SharedStats,
        clock: Arc<ManualClock>,
    }

    fn harness(
        scripts: Vec<Vec<Step>>,
        running: Arc<AtomicBool>,
        geometry: Option<BoardGeometry>,
    ) -> Harness {
        let live = LiveBuffer::shared(50);
        let status = StatusCell::shared();
        let stats = create_shared_stats();
        let clock = Arc::new(ManualClock::new());
        let task = IngestTask::new(
            HostConfig::default(),
            geometry,
            Box::new(FixedLister(vec![
                PortInfo::new("/dev/tty.Bluetooth-Incoming-Port", ""),
                PortInfo::new("/dev/ttyACM0", "Gadget Serial"),
            ])),
            Box::new(ScriptedOpener {
                scripts: Mutex::new(scripts.into()),
                running,
                opened: Mutex::new(Vec::new()),
            }),
            Arc::new(PortSelector::automatic()),
            live.clone(),
            status.clone(),
            ModeCell::shared(HostMode::Live),
            stats.clone(),
            clock.clone(),
        );
        Harness {
            task,
            live,
            status,
            stats,
            clock,
        }
    }

    #[test]
    fn test_ingest_line() {
        let running = Arc::new(AtomicBool::new(true));
        let h = harness(Vec::new(), running, None);
        h.status.connected();

        assert!(h.task.ingest_line("12.50, -3.20\n"));
        let p = h.live.latest().unwrap();
        assert_eq!((p.x, p.y), (12.5, -3.2));
        assert_eq!(h.status.get(), HostStatus::Displaying);

        assert!(!h.task.ingest_line(""));
        assert!(!h.task.ingest_line("garbage\n"));
        assert!(!h.task.ingest_line("[10, 12, 11, 9]\n"));
        assert_eq!(h.live.len(), 1);

        let s = h.stats.snapshot();
        assert_eq!(s.frames_received, 1);
        assert_eq!(s.frames_rejected, 1);
        assert_eq!(s.frames_unreduced, 1);
    }

    #[test]
    fn test_corner_frames_with_geometry() {
        let running = Arc::new(AtomicBool::new(true));
        let h = harness(Vec::new(), running, Some(BoardGeometry::default()));
        assert!(h.task.ingest_line("[100, 100, 100, 100]\n"));
        assert!(!h.task.ingest_line("[0, 0, 0, 0]\n"));
        assert_eq!(h.live.snapshot().len(), 1);
    }

    #[test]
    fn test_reconnects_after_fault() {
        let running = Arc::new(AtomicBool::new(true));
        let h = harness(
            vec![
                vec![Step::Line("1.0, 2.0\n"), Step::Quiet, Step::Fail],
                vec![Step::Quiet, Step::Line("3.0, 4.0\n")],
            ],
            running.clone(),
            None,
        );

        h.task.run(&running);

        let xs: Vec<f64> = h.live.snapshot().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 3.0]);
        assert_eq!(h.stats.snapshot().reconnects, 1);
        assert_eq!(h.status.get(), HostStatus::Disconnected);

        let sleeps = h.clock.sleeps();
        assert!(sleeps.contains(&Duration::from_secs(1)));
        assert!(sleeps.contains(&Duration::from_millis(10)));
    }

    #[test]
    fn test_idles_outside_live_mode() {
        let running = Arc::new(AtomicBool::new(true));
        let h = harness(Vec::new(), running.clone(), None);
        h.task.mode.set(HostMode::Analysis);

        let stopper = running.clone();
        let clock = h.clock.clone();
        let watcher = std::thread::spawn(move || {
            while clock.sleeps().len() < 3 {
                std::thread::yield_now();
            }
            stopper.store(false, Ordering::SeqCst);
        });
        h.task.run(&running);
        watcher.join().unwrap();

        assert!(h.clock.sleeps().iter().all(|&d| d == Duration::from_secs(1)));
        assert!(h.live.is_empty());
    }
}
