//! Linux implementation of board discovery and event reading via evdev.

use crate::bridge::types::InputEvent;
use crate::bridge::{BoardFinder, EventSource};
use std::collections::VecDeque;
use std::io;
use tracing::debug;

/// An opened evdev device.
pub struct EvdevBoard {
    device: evdev::Device,
    pending: VecDeque<InputEvent>,
}

impl EvdevBoard {
    pub fn new(device: evdev::Device) -> Self {
        Self {
            device,
            pending: VecDeque::new(),
        }
    }
}

impl EventSource for EvdevBoard {
    fn next_event(&mut self) -> io::Result<InputEvent> {
        while self.pending.is_empty() {
            let events = self.device.fetch_events()?;
            self.pending.extend(events.map(|ev| from_evdev(&ev)));
        }
        self.pending
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no event"))
    }
}

fn from_evdev(ev: &evdev::InputEvent) -> InputEvent {
    InputEvent::new(ev.event_type().0, ev.code(), ev.value())
}

/// Finds the board by its input device name.
#[derive(Debug, Default)]
pub struct EvdevFinder;

impl EvdevFinder {
    pub fn new() -> Self {
        Self
    }
}

impl BoardFinder for EvdevFinder {
    fn find(&self, name: &str) -> io::Result<Option<Box<dyn EventSource>>> {
        for (path, device) in evdev::enumerate() {
            if device.name() == Some(name) {
                debug!("Found {name} at {}", path.display());
                return Ok(Some(Box::new(EvdevBoard::new(device))));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::types::{ABS_HAT1X, EV_ABS, EV_SYN, SYN_REPORT};

    #[test]
    fn test_from_evdev() {
        let ev = evdev::InputEvent::new(evdev::EventType::ABSOLUTE, ABS_HAT1X, -1234);
        assert_eq!(from_evdev(&ev), InputEvent::new(EV_ABS, ABS_HAT1X, -1234));

        let sync = evdev::InputEvent::new(evdev::EventType::SYNCHRONIZATION, SYN_REPORT, 0);
        assert_eq!(from_evdev(&sync), InputEvent::new(EV_SYN, SYN_REPORT, 0));
    }
}
