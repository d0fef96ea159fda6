//! Serial output for the bridge.

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Write};
use std::time::Duration;

/// Destination for serial frames.
pub trait FrameSink: Send {
    /// Drop any output still queued in the transport.
    fn discard_pending(&mut self) -> io::Result<()>;

    /// Write one complete frame.
    fn write_frame(&mut self, frame: &str) -> io::Result<()>;
}

/// Opens (or reopens) the bridge's output link.
pub trait SinkOpener: Send {
    fn open(&self) -> io::Result<Box<dyn FrameSink>>;

    /// Human-readable name of the link for logs.
    fn name(&self) -> &str;
}

/// A serial port opened through `serialport`.
pub struct SerialSink {
    port: Box<dyn SerialPort>,
}

impl SerialSink {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl FrameSink for SerialSink {
    fn discard_pending(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Output).map_err(io::Error::from)
    }

    fn write_frame(&mut self, frame: &str) -> io::Result<()> {
        self.port.write_all(frame.as_bytes())?;
        self.port.flush()
    }
}

/// Opens a fixed serial device.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    path: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialOpener {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
        }
    }
}

impl SinkOpener for SerialOpener {
    fn open(&self) -> io::Result<Box<dyn FrameSink>> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(SerialSink::new(port)))
    }

    fn name(&self) -> &str {
        &self.path
    }
}
