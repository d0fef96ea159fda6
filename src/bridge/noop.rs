//! Non-Linux (noop) board discovery.
//!
//! This exists so the crate (and binary) can compile on targets without an
//! evdev input subsystem. The board is never found.

use crate::bridge::{BoardFinder, EventSource};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// A finder that never finds a board.
#[derive(Debug, Default)]
pub struct NoopFinder {
    warned: AtomicBool,
}

impl NoopFinder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BoardFinder for NoopFinder {
    fn find(&self, name: &str) -> io::Result<Option<Box<dyn EventSource>>> {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("Input device discovery is only supported on Linux; '{name}' cannot be found");
        }
        Ok(None)
    }
}
