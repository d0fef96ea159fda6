//! Normalization of a recording into an analysis trajectory.

use crate::core::features::{DescriptorBackend, FeatureError};
use crate::core::session::RecordedSample;
use serde::{Deserialize, Serialize};

/// Default resampling frequency in Hz.
pub const TARGET_FREQUENCY: f64 = 100.0;

/// A mean-centered, uniformly resampled center-of-pressure signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Seconds, `i / frequency`
    pub time: Vec<f64>,
    /// Mediolateral
    pub x: Vec<f64>,
    /// Anteroposterior
    pub y: Vec<f64>,
    pub frequency: f64,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.time.last().copied().unwrap_or(0.0)
    }
}

/// Errors that fail an analysis.
#[derive(Debug)]
pub enum AnalysisError {
    /// A column holds a missing value
    MissingValues { row: usize, column: &'static str },
    /// Fewer than two samples, or no elapsed time
    TooShort { samples: usize },
    /// The descriptor collaborator could not resample
    Resample(FeatureError),
    /// Feature extraction failed
    Features(FeatureError),
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::MissingValues { row, column } => {
                write!(f, "Clean NaN values first (row {row}, column {column})")
            }
            AnalysisError::TooShort { samples } => {
                write!(f, "Recording too short to analyse ({samples} samples)")
            }
            AnalysisError::Resample(e) => write!(f, "Resampling failed: {e}"),
            AnalysisError::Features(e) => write!(f, "Feature extraction failed: {e}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Normalize `samples` into a trajectory at `frequency` Hz.
///
/// Missing values fail the analysis. Time is shifted to start at zero, x and
/// y are mean-centered independently, the signal is resampled through
/// `backend`, a fresh time axis is generated and everything is rounded to
/// two decimals.
pub fn normalize(
    samples: &[RecordedSample],
    frequency: f64,
    backend: &dyn DescriptorBackend,
) -> Result<Trajectory, AnalysisError> {
    for (row, s) in samples.iter().enumerate() {
        for (column, value) in [("time", s.time), ("x", s.x), ("y", s.y)] {
            if value.is_nan() {
                return Err(AnalysisError::MissingValues { row, column });
            }
        }
    }

    let too_short = AnalysisError::TooShort {
        samples: samples.len(),
    };
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Err(too_short);
    };
    if samples.len() < 2 || last.time <= first.time {
        return Err(too_short);
    }

    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.x).sum::<f64>() / n;
    let mean_y = samples.iter().map(|s| s.y).sum::<f64>() / n;

    let time: Vec<f64> = samples.iter().map(|s| s.time - first.time).collect();
    let x: Vec<f64> = samples.iter().map(|s| s.x - mean_x).collect();
    let y: Vec<f64> = samples.iter().map(|s| s.y - mean_y).collect();

    let (rx, ry) = backend
        .resample(&time, &x, &y, frequency)
        .map_err(AnalysisError::Resample)?;

    let time = (0..rx.len()).map(|i| round2(i as f64 / frequency)).collect();
    Ok(Trajectory {
        time,
        x: rx.into_iter().map(round2).collect(),
        y: ry.into_iter().map(round2).collect(),
        frequency,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::BasicDescriptors;
    use approx::assert_relative_eq;

    /// Jittered capture at roughly `hz`, lasting `secs`.
    fn capture(secs: f64, hz: f64) -> Vec<RecordedSample> {
        let count = (secs * hz) as usize;
        (0..=count)
            .map(|i| {
                let jitter = if i % 3 == 1 { 0.002 } else { 0.0 };
                let t = (i as f64 / hz + jitter).min(secs);
                RecordedSample::new(t + 12.0, 5.0 + (t * 2.0).sin(), -3.0 + (t * 3.0).cos())
            })
            .collect()
    }

    #[test]
    fn test_length_and_time_axis() {
        let trajectory = normalize(&capture(5.0, 100.0), 100.0, &BasicDescriptors).unwrap();

        let expected = 5.0 * 100.0;
        assert!((trajectory.len() as f64 - expected).abs() <= 1.0, "{}", trajectory.len());
        assert_eq!(trajectory.time[0], 0.0);
        assert!(trajectory.time.windows(2).all(|w| w[1] > w[0]));
        for (i, t) in trajectory.time.iter().enumerate() {
            assert_relative_eq!(*t, round2(i as f64 / 100.0));
        }
        assert_relative_eq!(trajectory.duration_secs(), 5.0);
    }

    #[test]
    fn test_mean_centered_and_rounded() {
        let samples: Vec<RecordedSample> = (0..=200)
            .map(|i| RecordedSample::new(i as f64 * 0.01, 40.0, -7.25))
            .collect();
        let trajectory = normalize(&samples, 100.0, &BasicDescriptors).unwrap();
        assert!(trajectory.x.iter().all(|&v| v == 0.0));
        assert!(trajectory.y.iter().all(|&v| v == 0.0));

        let wavy = normalize(&capture(2.0, 100.0), 100.0, &BasicDescriptors).unwrap();
        for v in wavy.x.iter().chain(&wavy.y) {
            assert_relative_eq!(*v, round2(*v));
        }
    }

    #[test]
    fn test_rejects_missing_values() {
        for column in 0..3 {
            let mut samples = capture(1.0, 100.0);
            let s = &mut samples[17];
            match column {
                0 => s.time = f64::NAN,
                1 => s.x = f64::NAN,
                _ => s.y = f64::NAN,
            }
            let err = normalize(&samples, 100.0, &BasicDescriptors).unwrap_err();
            assert!(matches!(err, AnalysisError::MissingValues { row: 17, .. }));
        }
    }

    #[test]
    fn test_rejects_short_recordings() {
        assert!(matches!(
            normalize(&[], 100.0, &BasicDescriptors),
            Err(AnalysisError::TooShort { samples: 0 })
        ));
        let still = vec![RecordedSample::new(1.0, 0.0, 0.0); 4];
        assert!(matches!(
            normalize(&still, 100.0, &BasicDescriptors),
            Err(AnalysisError::TooShort { samples: 4 })
        ));
    }
}
