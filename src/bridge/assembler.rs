//! Assembly of input events into complete four-corner samples.

use crate::bridge::types::{
    Corner, InputEvent, RawSample, BTN_A, EV_ABS, EV_KEY, EV_SYN, SYN_DROPPED, SYN_REPORT,
    SYN_VALUE_CLOSE, SYN_VALUE_CONTINUE,
};
use tracing::{debug, error};

/// What a single event did to the pending sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembly {
    /// The event was absorbed; the cycle is still open.
    Pending,
    /// The cycle closed with every corner present.
    Complete(RawSample),
    /// The cycle closed with a corner missing; slots were reset.
    Discarded,
    /// The event code is not one the board should send.
    Unrecognized,
    /// The board button was pressed mid-measurement.
    Abort,
}

/// Collects corner readings for the current acquisition cycle.
#[derive(Debug, Default)]
pub struct SampleAssembler {
    slots: [Option<i32>; 4],
}

impl SampleAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event.
    pub fn push(&mut self, event: InputEvent) -> Assembly {
        if let Some(corner) = Corner::from_code(event.code).filter(|_| event.event_type == EV_ABS) {
            self.slots[corner.index()] = Some(event.value);
            return Assembly::Pending;
        }

        match (event.event_type, event.code) {
            (EV_KEY, BTN_A) => Assembly::Abort,
            (EV_SYN, SYN_DROPPED) => Assembly::Pending,
            (EV_SYN, SYN_REPORT) if event.value == SYN_VALUE_CONTINUE => Assembly::Pending,
            (EV_SYN, SYN_REPORT) if event.value == SYN_VALUE_CLOSE => self.close(),
            _ => {
                error!("Got unexpected event: {event}");
                Assembly::Unrecognized
            }
        }
    }

    /// Corners observed so far in the open cycle.
    pub fn observed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn close(&mut self) -> Assembly {
        let slots = std::mem::take(&mut self.slots);
        match slots {
            [Some(tl), Some(tr), Some(bl), Some(br)] => {
                Assembly::Complete(RawSample::new(tl, tr, bl, br))
            }
            _ => {
                debug!(
                    "Incomplete cycle ({} of 4 corners), retrying",
                    slots.iter().filter(|s| s.is_some()).count()
                );
                Assembly::Discarded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut SampleAssembler, events: &[InputEvent]) -> Vec<Assembly> {
        events.iter().map(|&e| assembler.push(e)).collect()
    }

    #[test]
    fn test_complete_cycle_emits_sample() {
        let mut assembler = SampleAssembler::new();
        let results = feed(
            &mut assembler,
            &[
                InputEvent::corner(Corner::TopLeft, 10),
                InputEvent::corner(Corner::TopRight, 12),
                InputEvent::corner(Corner::BottomLeft, 11),
                InputEvent::corner(Corner::BottomRight, 9),
                InputEvent::sync(0),
            ],
        );
        assert_eq!(
            results.last(),
            Some(&Assembly::Complete(RawSample::new(10, 12, 11, 9)))
        );
        assert_eq!(assembler.observed(), 0);
    }

    #[test]
    fn test_missing_corner_discards_and_resets() {
        let mut assembler = SampleAssembler::new();
        feed(
            &mut assembler,
            &[
                InputEvent::corner(Corner::TopLeft, 10),
                InputEvent::corner(Corner::TopRight, 12),
                InputEvent::corner(Corner::BottomLeft, 11),
            ],
        );
        assert_eq!(assembler.observed(), 3);
        assert_eq!(assembler.push(InputEvent::sync(0)), Assembly::Discarded);
        assert_eq!(assembler.observed(), 0);

        // The next cycle starts from scratch: one corner is not enough.
        assembler.push(InputEvent::corner(Corner::BottomRight, 9));
        assert_eq!(assembler.push(InputEvent::sync(0)), Assembly::Discarded);
    }

    #[test]
    fn test_every_partial_subset_is_discarded() {
        for mask in 0u8..15 {
            let mut assembler = SampleAssembler::new();
            for corner in Corner::ALL {
                if mask & (1 << corner.index()) != 0 {
                    assembler.push(InputEvent::corner(corner, 7));
                }
            }
            assert_eq!(assembler.push(InputEvent::sync(0)), Assembly::Discarded);
            assert_eq!(assembler.observed(), 0);
        }
    }

    #[test]
    fn test_last_value_per_corner_wins() {
        let mut assembler = SampleAssembler::new();
        feed(
            &mut assembler,
            &[
                InputEvent::corner(Corner::TopLeft, 1),
                InputEvent::corner(Corner::TopRight, 2),
                InputEvent::corner(Corner::TopLeft, 100),
                InputEvent::corner(Corner::BottomLeft, 3),
                InputEvent::sync(3),
                InputEvent::corner(Corner::BottomRight, 4),
                InputEvent::corner(Corner::BottomLeft, 300),
            ],
        );
        assert_eq!(
            assembler.push(InputEvent::sync(0)),
            Assembly::Complete(RawSample::new(100, 2, 300, 4))
        );
    }

    #[test]
    fn test_continuation_and_dropped_are_noops() {
        let mut assembler = SampleAssembler::new();
        assembler.push(InputEvent::corner(Corner::TopLeft, 5));
        assert_eq!(assembler.push(InputEvent::sync(3)), Assembly::Pending);
        assert_eq!(
            assembler.push(InputEvent::new(EV_SYN, SYN_DROPPED, 0)),
            Assembly::Pending
        );
        assert_eq!(assembler.observed(), 1);
    }

    #[test]
    fn test_button_aborts() {
        let mut assembler = SampleAssembler::new();
        assert_eq!(assembler.push(InputEvent::button()), Assembly::Abort);
    }

    #[test]
    fn test_unknown_codes_are_ignored() {
        let mut assembler = SampleAssembler::new();
        assembler.push(InputEvent::corner(Corner::TopLeft, 5));
        assert_eq!(
            assembler.push(InputEvent::new(EV_ABS, 0x00, 42)),
            Assembly::Unrecognized
        );
        assert_eq!(assembler.push(InputEvent::sync(1)), Assembly::Unrecognized);
        assert_eq!(assembler.observed(), 1);
    }
}
