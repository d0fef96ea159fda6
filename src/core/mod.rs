//! Session analysis.
//!
//! This module contains:
//! - Recorded sessions and their metadata
//! - Normalization and resampling into an analysis trajectory
//! - Feature extraction against a fixed schema

pub mod features;
pub mod normalize;
pub mod session;

pub use features::{
    compute_features, sample_entropy, Axis, BasicDescriptors, DescriptorBackend, FeatureError,
    FeatureName, FeatureSet,
};
pub use normalize::{normalize, AnalysisError, Trajectory, TARGET_FREQUENCY};
pub use session::{random_identifier, RecordedSample, Recording, SessionMetadata, SubjectInfo};

/// A recording's trajectory and its features.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub trajectory: Trajectory,
    pub features: FeatureSet,
}

/// Normalize `recording` and compute its features.
pub fn analyze(
    recording: &Recording,
    frequency: f64,
    backend: &dyn DescriptorBackend,
) -> Result<Analysis, AnalysisError> {
    let trajectory = normalize(&recording.samples, frequency, backend)?;
    let features = compute_features(backend, &trajectory).map_err(AnalysisError::Features)?;
    tracing::debug!(
        "Analysed {} samples into {} points",
        recording.len(),
        trajectory.len()
    );
    Ok(Analysis {
        trajectory,
        features,
    })
}
