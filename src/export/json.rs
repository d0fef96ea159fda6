//! JSON session files.

use crate::core::features::FeatureSet;
use crate::core::session::{RecordedSample, Recording, SessionMetadata};
use crate::export::{ExportError, SessionFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct JsonSession {
    metadata: SessionMetadata,
    data: Vec<RecordedSample>,
    #[serde(default)]
    variables: Vec<FeatureSet>,
}

/// Serialize a session to a JSON string.
pub fn to_string(session: &SessionFile) -> Result<String, ExportError> {
    let doc = JsonSession {
        metadata: session.metadata().clone(),
        data: session.rounded_samples(),
        variables: session.variables.iter().cloned().collect(),
    };
    serde_json::to_string_pretty(&doc).map_err(|e| ExportError::Json(e.to_string()))
}

/// Parse a session from a JSON string.
pub fn from_str(content: &str) -> Result<SessionFile, ExportError> {
    let doc: JsonSession =
        serde_json::from_str(content).map_err(|e| ExportError::Json(e.to_string()))?;
    Ok(SessionFile::new(
        Recording::new(doc.metadata, doc.data),
        doc.variables.into_iter().next(),
    ))
}

pub fn save(session: &SessionFile, path: &Path) -> Result<(), ExportError> {
    let content = to_string(session)?;
    std::fs::write(path, content).map_err(|e| ExportError::Io(e.to_string()))
}

pub fn load(path: &Path) -> Result<SessionFile, ExportError> {
    let content = std::fs::read_to_string(path).map_err(|e| ExportError::Io(e.to_string()))?;
    from_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut metadata = SessionMetadata::default();
        metadata.fall_history = "Yes".to_string();
        let session = SessionFile::new(
            Recording::new(metadata, vec![RecordedSample::new(0.0, 1.0, 2.0)]),
            None,
        );
        let value: serde_json::Value = serde_json::from_str(&to_string(&session).unwrap()).unwrap();

        assert_eq!(value["metadata"]["fallhistory"], "Yes");
        assert_eq!(value["data"][0]["y"], 2.0);
        assert_eq!(value["variables"], serde_json::json!([]));

        let back = from_str(&value.to_string()).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_rejects_invalid_variables() {
        let doc = r#"{"metadata": {}, "data": [], "variables": [{"rms_AP": 1.0}]}"#;
        assert!(matches!(from_str(doc), Err(ExportError::Json(_))));
    }
}
