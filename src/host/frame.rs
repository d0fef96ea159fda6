//! Parsing of incoming serial lines.

use crate::bridge::types::RawSample;
use serde::{Deserialize, Serialize};

/// One parsed serial line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// A reduced center-of-pressure pair.
    Position { x: f64, y: f64 },
    /// Raw corner loads as written by the bridge.
    Corners(RawSample),
}

/// Parse one line of serial text.
///
/// Framing brackets and surrounding whitespace are stripped and the rest is
/// split on commas. Returns `None` for anything that is not exactly two
/// finite numbers or four integers; callers treat that as "no data yet".
pub fn parse_line(line: &str) -> Option<Frame> {
    let body = line
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    if body.is_empty() {
        return None;
    }

    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    match fields.as_slice() {
        [x, y] => {
            let x: f64 = x.parse().ok()?;
            let y: f64 = y.parse().ok()?;
            (x.is_finite() && y.is_finite()).then_some(Frame::Position { x, y })
        }
        [tl, tr, bl, br] => Some(Frame::Corners(RawSample::new(
            tl.parse().ok()?,
            tr.parse().ok()?,
            bl.parse().ok()?,
            br.parse().ok()?,
        ))),
        _ => None,
    }
}

/// Physical layout of the board's load cells, used to reduce corner loads
/// to a center of pressure in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardGeometry {
    /// Distance between left and right sensors (mm)
    pub width_mm: f64,
    /// Distance between front and back sensors (mm)
    pub length_mm: f64,
    /// Total load at or below which nobody is considered on the board
    pub min_total: i64,
}

impl Default for BoardGeometry {
    fn default() -> Self {
        Self {
            width_mm: 433.0,
            length_mm: 228.0,
            min_total: 0,
        }
    }
}

impl BoardGeometry {
    /// Center of pressure for `sample`, or `None` when the board is unloaded.
    ///
    /// Positive x is to the right, positive y is toward the front.
    pub fn reduce(&self, sample: &RawSample) -> Option<(f64, f64)> {
        let total = sample.total();
        if total <= self.min_total || total <= 0 {
            return None;
        }
        let total = total as f64;
        let right = f64::from(sample.top_right) + f64::from(sample.bottom_right);
        let left = f64::from(sample.top_left) + f64::from(sample.bottom_left);
        let front = f64::from(sample.top_left) + f64::from(sample.top_right);
        let back = f64::from(sample.bottom_left) + f64::from(sample.bottom_right);

        let x = self.width_mm / 2.0 * (right - left) / total;
        let y = self.length_mm / 2.0 * (front - back) / total;
        Some((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_position() {
        assert_eq!(
            parse_line("12.50, -3.20\n"),
            Some(Frame::Position { x: 12.5, y: -3.2 })
        );
        assert_eq!(
            parse_line("[1.0, 2.0]\r\n"),
            Some(Frame::Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn test_parse_corners() {
        assert_eq!(
            parse_line("[10, 12, 11, 9]\n"),
            Some(Frame::Corners(RawSample::new(10, 12, 11, 9)))
        );
    }

    #[test]
    fn test_malformed_lines_are_no_data() {
        for line in [
            "",
            "\n",
            "12.5",
            "12.5, ",
            "a, b",
            "1, 2, 3",
            "[1.5, 2, 3, 4]",
            "nan, 1.0",
        ] {
            assert_eq!(parse_line(line), None, "{line:?}");
        }
    }

    #[test]
    fn test_reduce_centered_load() {
        let geometry = BoardGeometry::default();
        let (x, y) = geometry.reduce(&RawSample::new(100, 100, 100, 100)).unwrap();
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);
    }

    #[test]
    fn test_reduce_right_front_load() {
        let geometry = BoardGeometry::default();
        let (x, _) = geometry.reduce(&RawSample::new(0, 50, 0, 50)).unwrap();
        assert_relative_eq!(x, 216.5);
        let (_, y) = geometry.reduce(&RawSample::new(50, 50, 0, 0)).unwrap();
        assert_relative_eq!(y, 114.0);
    }

    #[test]
    fn test_reduce_empty_board() {
        let geometry = BoardGeometry {
            min_total: 20,
            ..BoardGeometry::default()
        };
        assert_eq!(geometry.reduce(&RawSample::new(0, 0, 0, 0)), None);
        assert_eq!(geometry.reduce(&RawSample::new(5, 5, 5, 5)), None);
        assert!(geometry.reduce(&RawSample::new(6, 5, 5, 5)).is_some());
    }
}
