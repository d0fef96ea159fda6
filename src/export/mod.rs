//! Session files.
//!
//! A session is stored as three logical tables: `Data` (time, x, y),
//! `Metadata` (one row of text) and `Variables` (one row of features, when
//! computed). Two containers are supported, chosen by file extension: an
//! `.xlsx` workbook with one sheet per table, or a `.json` object with
//! `metadata`, `data` and `variables` keys.

pub mod json;
pub mod xlsx;

use crate::core::features::FeatureSet;
use crate::core::session::{RecordedSample, Recording, SessionMetadata};
use std::path::Path;
use tracing::info;

/// A recording with the features computed for it, as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFile {
    pub recording: Recording,
    pub variables: Option<FeatureSet>,
}

impl SessionFile {
    pub fn new(recording: Recording, variables: Option<FeatureSet>) -> Self {
        Self {
            recording,
            variables,
        }
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.recording.metadata
    }

    /// Data rows as they are written: time to 2 decimals, x and y to 4.
    pub fn rounded_samples(&self) -> Vec<RecordedSample> {
        self.recording
            .samples
            .iter()
            .map(|s| RecordedSample::new(round_to(s.time, 2), round_to(s.x, 4), round_to(s.y, 4)))
            .collect()
    }
}

/// Container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFormat {
    Xlsx,
    Json,
}

impl SessionFormat {
    /// Format for `path`'s extension.
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" => Ok(SessionFormat::Xlsx),
            "json" => Ok(SessionFormat::Json),
            _ => Err(ExportError::UnsupportedExtension(ext)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SessionFormat::Xlsx => "xlsx",
            SessionFormat::Json => "json",
        }
    }
}

/// Session file errors.
#[derive(Debug)]
pub enum ExportError {
    /// File system error
    Io(String),
    /// The extension is neither `.xlsx` nor `.json`
    UnsupportedExtension(String),
    /// Workbook could not be written or read
    Workbook(String),
    /// JSON could not be written or read
    Json(String),
    /// The file is readable but its contents are not a session
    Format(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(msg) => write!(f, "I/O error: {msg}"),
            ExportError::UnsupportedExtension(ext) => {
                write!(f, "Unsupported session file extension '{ext}'")
            }
            ExportError::Workbook(msg) => write!(f, "Workbook error: {msg}"),
            ExportError::Json(msg) => write!(f, "JSON error: {msg}"),
            ExportError::Format(msg) => write!(f, "Not a session file: {msg}"),
        }
    }
}

impl std::error::Error for ExportError {}

/// Save `session` to `path`, format chosen by extension.
pub fn save(session: &SessionFile, path: &Path) -> Result<(), ExportError> {
    let format = SessionFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::Io(e.to_string()))?;
    }
    match format {
        SessionFormat::Xlsx => xlsx::save(session, path)?,
        SessionFormat::Json => json::save(session, path)?,
    }
    info!("Saved session to {}", path.display());
    Ok(())
}

/// Load a session from `path`, format chosen by extension.
pub fn load(path: &Path) -> Result<SessionFile, ExportError> {
    match SessionFormat::from_path(path)? {
        SessionFormat::Xlsx => xlsx::load(path),
        SessionFormat::Json => json::load(path),
    }
}

/// File name for a session: identifier, date and time, filesystem-safe.
pub fn suggested_file_name(metadata: &SessionMetadata, format: SessionFormat) -> String {
    let identifier = if metadata.identifier.trim().is_empty() {
        "anonymous"
    } else {
        metadata.identifier.trim()
    };
    let stem: String = format!("{identifier}_{}_{}", metadata.date, metadata.time)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("STEP_{stem}.{}", format.extension())
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SessionFormat::from_path(&PathBuf::from("a/b.XLSX")).unwrap(),
            SessionFormat::Xlsx
        );
        assert_eq!(
            SessionFormat::from_path(&PathBuf::from("b.json")).unwrap(),
            SessionFormat::Json
        );
        assert!(matches!(
            SessionFormat::from_path(&PathBuf::from("b.csv")),
            Err(ExportError::UnsupportedExtension(ext)) if ext == "csv"
        ));
        assert!(SessionFormat::from_path(&PathBuf::from("noext")).is_err());
    }

    #[test]
    fn test_rounding() {
        let session = SessionFile::new(
            Recording::new(
                SessionMetadata::default(),
                vec![RecordedSample::new(0.126, 1.234_56, -9.876_54)],
            ),
            None,
        );
        assert_eq!(
            session.rounded_samples(),
            vec![RecordedSample::new(0.13, 1.2346, -9.8765)]
        );
    }

    #[test]
    fn test_suggested_file_name() {
        let metadata = SessionMetadata {
            identifier: "K7Q2ZP0L1M".to_string(),
            date: "07/03/2024".to_string(),
            time: "09:05:02".to_string(),
            ..SessionMetadata::default()
        };
        assert_eq!(
            suggested_file_name(&metadata, SessionFormat::Json),
            "STEP_K7Q2ZP0L1M_07-03-2024_09-05-02.json"
        );
    }
}
