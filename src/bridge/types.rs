//! Input-event and sample types for the sensor bridge.
//!
//! Event codes follow the Linux input subsystem (`linux/input-event-codes.h`)
//! as reported by the balance board driver.

use serde::{Deserialize, Serialize};

/// Event type: synchronization marker.
pub const EV_SYN: u16 = 0x00;
/// Event type: key or button.
pub const EV_KEY: u16 = 0x01;
/// Event type: absolute axis.
pub const EV_ABS: u16 = 0x03;

/// Sync code closing one acquisition cycle.
pub const SYN_REPORT: u16 = 0x00;
/// Sync code signalling the kernel dropped events.
pub const SYN_DROPPED: u16 = 0x03;

pub const ABS_HAT0X: u16 = 0x10;
pub const ABS_HAT0Y: u16 = 0x11;
pub const ABS_HAT1X: u16 = 0x12;
pub const ABS_HAT1Y: u16 = 0x13;

/// The board's front button.
pub const BTN_A: u16 = 0x130;

/// `SYN_REPORT` value that closes a cycle.
pub const SYN_VALUE_CLOSE: i32 = 0;
/// `SYN_REPORT` value the board emits between cycles; not a cycle end.
pub const SYN_VALUE_CONTINUE: i32 = 3;

/// One low-level input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    /// Absolute-axis reading for one corner.
    pub fn corner(corner: Corner, value: i32) -> Self {
        Self::new(EV_ABS, corner.code(), value)
    }

    /// `SYN_REPORT` with the given value.
    pub fn sync(value: i32) -> Self {
        Self::new(EV_SYN, SYN_REPORT, value)
    }

    /// Board button press.
    pub fn button() -> Self {
        Self::new(EV_KEY, BTN_A, 1)
    }
}

impl std::fmt::Display for InputEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "event type {:#04x}, code {:#05x}, value {}",
            self.event_type, self.code, self.value
        )
    }
}

/// One of the four load cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Slot index within a [`RawSample`].
    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        }
    }

    /// Absolute-axis code the driver reports this corner on.
    pub fn code(self) -> u16 {
        match self {
            Corner::TopLeft => ABS_HAT1X,
            Corner::TopRight => ABS_HAT0X,
            Corner::BottomLeft => ABS_HAT0Y,
            Corner::BottomRight => ABS_HAT1Y,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            ABS_HAT1X => Some(Corner::TopLeft),
            ABS_HAT0X => Some(Corner::TopRight),
            ABS_HAT0Y => Some(Corner::BottomLeft),
            ABS_HAT1Y => Some(Corner::BottomRight),
            _ => None,
        }
    }
}

/// One complete acquisition cycle: a reading from every corner.
///
/// Values are in device units (decigrams on the reference board).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub top_left: i32,
    pub top_right: i32,
    pub bottom_left: i32,
    pub bottom_right: i32,
}

impl RawSample {
    pub fn new(top_left: i32, top_right: i32, bottom_left: i32, bottom_right: i32) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }
    }

    pub fn get(&self, corner: Corner) -> i32 {
        match corner {
            Corner::TopLeft => self.top_left,
            Corner::TopRight => self.top_right,
            Corner::BottomLeft => self.bottom_left,
            Corner::BottomRight => self.bottom_right,
        }
    }

    /// Sum of all four corners.
    pub fn total(&self) -> i64 {
        Corner::ALL.iter().map(|&c| self.get(c) as i64).sum()
    }

    /// Serial frame for this sample, newline included.
    pub fn to_frame(&self) -> String {
        format!("{self}\n")
    }
}

impl std::fmt::Display for RawSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.top_left, self.top_right, self.bottom_left, self.bottom_right
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_codes_roundtrip() {
        for corner in Corner::ALL {
            assert_eq!(Corner::from_code(corner.code()), Some(corner));
        }
        assert_eq!(Corner::from_code(BTN_A), None);
    }

    #[test]
    fn test_frame_format() {
        let sample = RawSample::new(10, 12, 11, 9);
        assert_eq!(sample.to_frame(), "[10, 12, 11, 9]\n");
        assert_eq!(sample.total(), 42);
    }
}
