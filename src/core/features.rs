//! Postural-sway features computed from a normalized trajectory.
//!
//! Feature values come from a [`DescriptorBackend`] as a loose name → value
//! map and are validated here into a fixed schema. AP is the y axis
//! (front-back), ML is the x axis (side-side).

use crate::core::normalize::Trajectory;
use serde::{Deserialize, Serialize, Serializer};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Embedding dimension for sample entropy.
const ENTROPY_DIMENSION: usize = 2;

/// Entropy tolerance as a fraction of the signal's standard deviation.
const ENTROPY_TOLERANCE: f64 = 0.2;

/// Which report table a feature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Ap,
    Ml,
    General,
}

/// Every feature the host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureName {
    MeanDistanceMl,
    MeanDistanceAp,
    MeanDistanceRadius,
    RmsMl,
    RmsAp,
    RangeMl,
    RangeAp,
    MeanVelocityMl,
    MeanVelocityAp,
    EntropyMl,
    EntropyAp,
}

impl FeatureName {
    pub const ALL: [FeatureName; 11] = [
        FeatureName::MeanDistanceMl,
        FeatureName::MeanDistanceAp,
        FeatureName::MeanDistanceRadius,
        FeatureName::RmsMl,
        FeatureName::RmsAp,
        FeatureName::RangeMl,
        FeatureName::RangeAp,
        FeatureName::MeanVelocityMl,
        FeatureName::MeanVelocityAp,
        FeatureName::EntropyMl,
        FeatureName::EntropyAp,
    ];

    /// Key used in descriptor output and session files.
    pub fn key(self) -> &'static str {
        match self {
            FeatureName::MeanDistanceMl => "mean_distance_ML",
            FeatureName::MeanDistanceAp => "mean_distance_AP",
            FeatureName::MeanDistanceRadius => "mean_distance_Radius",
            FeatureName::RmsMl => "rms_ML",
            FeatureName::RmsAp => "rms_AP",
            FeatureName::RangeMl => "range_ML",
            FeatureName::RangeAp => "range_AP",
            FeatureName::MeanVelocityMl => "mean_velocity_ML",
            FeatureName::MeanVelocityAp => "mean_velocity_AP",
            FeatureName::EntropyMl => "entropy_ML",
            FeatureName::EntropyAp => "entropy_AP",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn axis(self) -> Axis {
        match self {
            FeatureName::MeanDistanceAp
            | FeatureName::RmsAp
            | FeatureName::RangeAp
            | FeatureName::MeanVelocityAp
            | FeatureName::EntropyAp => Axis::Ap,
            FeatureName::MeanDistanceMl
            | FeatureName::RmsMl
            | FeatureName::RangeMl
            | FeatureName::MeanVelocityMl
            | FeatureName::EntropyMl => Axis::Ml,
            FeatureName::MeanDistanceRadius => Axis::General,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FeatureName::MeanDistanceMl | FeatureName::MeanDistanceAp => "Mean distance",
            FeatureName::MeanDistanceRadius => "Mean distance radius",
            FeatureName::RmsMl | FeatureName::RmsAp => "RMS",
            FeatureName::RangeMl | FeatureName::RangeAp => "Range",
            FeatureName::MeanVelocityMl | FeatureName::MeanVelocityAp => "Mean velocity",
            FeatureName::EntropyMl | FeatureName::EntropyAp => "Entropy",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            FeatureName::MeanVelocityMl | FeatureName::MeanVelocityAp => "mm/s",
            FeatureName::EntropyMl | FeatureName::EntropyAp => "no unit",
            _ => "mm",
        }
    }

    /// Healthy-adult reference shown next to the value.
    pub fn reference(self) -> &'static str {
        match self {
            FeatureName::MeanDistanceAp => "3,4",
            FeatureName::RmsAp => "4,5",
            FeatureName::RangeAp => "22,2",
            FeatureName::MeanVelocityAp => "8.8",
            FeatureName::MeanDistanceMl => "1,3",
            FeatureName::RmsMl => "1,6",
            FeatureName::RangeMl => "8,6",
            FeatureName::MeanVelocityMl => "5,9",
            FeatureName::MeanDistanceRadius => "11,8",
            FeatureName::EntropyMl | FeatureName::EntropyAp => "unknown",
        }
    }
}

impl std::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Feature extraction errors.
#[derive(Debug)]
pub enum FeatureError {
    /// The collaborator did not return a feature
    Missing(FeatureName),
    /// The collaborator returned NaN or infinity
    NonFinite { name: FeatureName, value: f64 },
    /// The input signal cannot be processed
    InvalidInput(String),
}

impl std::fmt::Display for FeatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureError::Missing(name) => write!(f, "Feature {name} missing"),
            FeatureError::NonFinite { name, value } => {
                write!(f, "Feature {name} is not finite ({value})")
            }
            FeatureError::InvalidInput(msg) => write!(f, "Invalid descriptor input: {msg}"),
        }
    }
}

impl std::error::Error for FeatureError {}

/// The full, validated feature set for one trajectory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>")]
pub struct FeatureSet {
    values: [f64; 11],
}

impl FeatureSet {
    /// Validate a loose name → value map against the schema.
    ///
    /// Every feature must be present and finite; extra entries are ignored.
    pub fn from_named(named: &BTreeMap<String, f64>) -> Result<Self, FeatureError> {
        let mut values = [0.0; 11];
        for name in FeatureName::ALL {
            let value = *named.get(name.key()).ok_or(FeatureError::Missing(name))?;
            if !value.is_finite() {
                return Err(FeatureError::NonFinite { name, value });
            }
            values[name.index()] = value;
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        self.values[name.index()]
    }

    /// `(name, value)` in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        FeatureName::ALL.into_iter().map(move |n| (n, self.get(n)))
    }

    /// Features of one report table.
    pub fn table(&self, axis: Axis) -> Vec<(FeatureName, f64)> {
        self.iter().filter(|(n, _)| n.axis() == axis).collect()
    }
}

impl TryFrom<BTreeMap<String, f64>> for FeatureSet {
    type Error = FeatureError;

    fn try_from(named: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::from_named(&named)
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name.key(), &value)?;
        }
        map.end()
    }
}

/// The external descriptor collaborator: resampling and feature math.
pub trait DescriptorBackend: Send + Sync {
    /// Resample an irregularly sampled signal to `frequency` Hz, starting at
    /// the first timestamp.
    fn resample(
        &self,
        time: &[f64],
        x: &[f64],
        y: &[f64],
        frequency: f64,
    ) -> Result<(Vec<f64>, Vec<f64>), FeatureError>;

    /// Named features for a normalized trajectory.
    fn compute(&self, trajectory: &Trajectory) -> Result<BTreeMap<String, f64>, FeatureError>;
}

/// Compute the validated feature set for `trajectory`.
pub fn compute_features(
    backend: &dyn DescriptorBackend,
    trajectory: &Trajectory,
) -> Result<FeatureSet, FeatureError> {
    let named = backend.compute(trajectory)?;
    FeatureSet::from_named(&named)
}

/// Built-in descriptors: linear resampling and direct readings of the
/// feature definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicDescriptors;

impl DescriptorBackend for BasicDescriptors {
    fn resample(
        &self,
        time: &[f64],
        x: &[f64],
        y: &[f64],
        frequency: f64,
    ) -> Result<(Vec<f64>, Vec<f64>), FeatureError> {
        if time.len() != x.len() || time.len() != y.len() {
            return Err(FeatureError::InvalidInput(
                "time and signal lengths differ".to_string(),
            ));
        }
        if frequency.is_nan() || frequency <= 0.0 {
            return Err(FeatureError::InvalidInput(format!(
                "frequency must be positive, got {frequency}"
            )));
        }
        let (Some(&start), Some(&end)) = (time.first(), time.last()) else {
            return Err(FeatureError::InvalidInput("empty signal".to_string()));
        };
        if time.windows(2).any(|w| w[1] < w[0]) {
            return Err(FeatureError::InvalidInput(
                "time is not monotonic".to_string(),
            ));
        }

        let count = ((end - start) * frequency + 1e-9).floor() as usize + 1;
        let mut rx = Vec::with_capacity(count);
        let mut ry = Vec::with_capacity(count);
        let mut j = 0;
        for i in 0..count {
            let t = start + i as f64 / frequency;
            while j + 2 < time.len() && time[j + 1] < t {
                j += 1;
            }
            let (t0, t1) = (time[j], time[(j + 1).min(time.len() - 1)]);
            let k = (j + 1).min(time.len() - 1);
            let w = if t1 > t0 {
                ((t - t0) / (t1 - t0)).clamp(0.0, 1.0)
            } else {
                1.0
            };
            rx.push(x[j] + (x[k] - x[j]) * w);
            ry.push(y[j] + (y[k] - y[j]) * w);
        }
        Ok((rx, ry))
    }

    fn compute(&self, trajectory: &Trajectory) -> Result<BTreeMap<String, f64>, FeatureError> {
        if trajectory.len() < ENTROPY_DIMENSION + 2 {
            return Err(FeatureError::InvalidInput(format!(
                "{} points is too few for feature extraction",
                trajectory.len()
            )));
        }
        let (ml, ap) = (&trajectory.x, &trajectory.y);

        let tolerance = ENTROPY_TOLERANCE * ml.iter().chain(ap.iter()).population_std_dev();

        let radius: Vec<f64> = ml.iter().zip(ap).map(|(x, y)| x.hypot(*y)).collect();

        let mut named = BTreeMap::new();
        let mut put = |name: FeatureName, value: f64| {
            named.insert(name.key().to_string(), value);
        };
        put(FeatureName::MeanDistanceMl, mean_distance(ml));
        put(FeatureName::MeanDistanceAp, mean_distance(ap));
        put(FeatureName::MeanDistanceRadius, radius.iter().mean());
        put(FeatureName::RmsMl, rms(ml));
        put(FeatureName::RmsAp, rms(ap));
        put(FeatureName::RangeMl, range(ml));
        put(FeatureName::RangeAp, range(ap));
        put(FeatureName::MeanVelocityMl, mean_velocity(ml, trajectory.frequency));
        put(FeatureName::MeanVelocityAp, mean_velocity(ap, trajectory.frequency));
        put(
            FeatureName::EntropyMl,
            sample_entropy(ml, ENTROPY_DIMENSION, tolerance),
        );
        put(
            FeatureName::EntropyAp,
            sample_entropy(ap, ENTROPY_DIMENSION, tolerance),
        );
        Ok(named)
    }
}

fn mean_distance(signal: &[f64]) -> f64 {
    signal.iter().map(|v| v.abs()).mean()
}

fn rms(signal: &[f64]) -> f64 {
    signal.iter().map(|v| v * v).mean().sqrt()
}

fn range(signal: &[f64]) -> f64 {
    let lo = signal.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    hi - lo
}

/// Path length per second.
fn mean_velocity(signal: &[f64], frequency: f64) -> f64 {
    let path: f64 = signal.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    let duration = (signal.len() - 1) as f64 / frequency;
    path / duration
}

/// Sample entropy with embedding dimension `m` and tolerance `r`.
///
/// When no template matches at `m + 1` (or at `m`) the ratio is undefined;
/// the upper bound `ln((N - m)(N - m - 1))` is reported instead.
pub fn sample_entropy(signal: &[f64], m: usize, r: f64) -> f64 {
    let n = signal.len();
    if n <= m + 1 {
        return 0.0;
    }
    let templates = n - m;
    let mut b = 0u64;
    let mut a = 0u64;

    for i in 0..templates {
        for j in (i + 1)..templates {
            let close = (0..m).all(|k| (signal[i + k] - signal[j + k]).abs() <= r);
            if close {
                b += 1;
                if (signal[i + m] - signal[j + m]).abs() <= r {
                    a += 1;
                }
            }
        }
    }

    if a == 0 || b == 0 {
        let t = templates as f64;
        return (t * (t - 1.0)).ln();
    }
    -(a as f64 / b as f64).ln()
}
