//! Remote upload of session files.
//!
//! Uploads are credential-gated: nothing happens unless the configuration
//! carries a complete `RemoteConfig::Enabled` entry. Each upload is checked
//! with an `OPTIONS` pre-flight, then the session is written to a scratch
//! file, sent with `PUT` and the scratch file removed. The remote name is the
//! SHA-256 of the session metadata, so re-uploading a session overwrites it.

use crate::core::session::SessionMetadata;
use crate::export::{ExportError, SessionFormat};
use sha2::{Digest, Sha256};

#[cfg(feature = "upload")]
use crate::config::RemoteCredentials;
#[cfg(feature = "upload")]
use crate::export::{self, SessionFile};
#[cfg(feature = "upload")]
use std::path::Path;
#[cfg(feature = "upload")]
use tracing::{info, warn};

/// Upload error types.
#[derive(Debug)]
pub enum UploadError {
    /// No usable credentials are configured
    Disabled,
    /// The pre-flight check did not return 200
    Preflight { status: u16 },
    /// Network/HTTP error
    Network(String),
    /// Server rejected the upload
    Server { status: u16, message: String },
    /// The scratch file could not be written or read
    Export(ExportError),
    /// Metadata could not be serialized for naming
    Serialization(String),
    /// Client or runtime could not be created
    Client(String),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Disabled => write!(f, "Remote upload is not configured"),
            UploadError::Preflight { status } => {
                write!(f, "Remote pre-flight check failed ({status})")
            }
            UploadError::Network(msg) => write!(f, "Upload network error: {msg}"),
            UploadError::Server { status, message } => {
                write!(f, "Upload rejected ({status}): {message}")
            }
            UploadError::Export(e) => write!(f, "Upload artifact error: {e}"),
            UploadError::Serialization(msg) => write!(f, "Upload naming error: {msg}"),
            UploadError::Client(msg) => write!(f, "Upload client error: {msg}"),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<ExportError> for UploadError {
    fn from(e: ExportError) -> Self {
        UploadError::Export(e)
    }
}

/// Deterministic remote file name: SHA-256 hex of the metadata JSON plus the
/// format's extension.
pub fn remote_name(metadata: &SessionMetadata, format: SessionFormat) -> Result<String, UploadError> {
    let json =
        serde_json::to_string(metadata).map_err(|e| UploadError::Serialization(e.to_string()))?;
    let digest = Sha256::digest(json.as_bytes());
    Ok(format!("{:x}.{}", digest, format.extension()))
}

/// Join a base URL and a file name with exactly one slash.
pub fn remote_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

/// Async upload client.
#[cfg(feature = "upload")]
pub struct UploadClient {
    credentials: RemoteCredentials,
    client: reqwest::Client,
}

#[cfg(feature = "upload")]
impl UploadClient {
    /// Create a client for `credentials`.
    pub fn new(credentials: RemoteCredentials) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;
        Ok(Self {
            credentials,
            client,
        })
    }

    /// Check that the endpoint accepts our credentials.
    pub async fn preflight(&self) -> Result<(), UploadError> {
        let response = self
            .client
            .request(reqwest::Method::OPTIONS, &self.credentials.url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UploadError::Preflight {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// `PUT` `body` under `name`.
    pub async fn put(&self, name: &str, body: Vec<u8>) -> Result<(), UploadError> {
        let response = self
            .client
            .put(remote_url(&self.credentials.url, name))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Upload `session` in `format`, staging it in `scratch_dir`.
    ///
    /// Returns the remote name. The scratch file is removed whether or not
    /// the upload succeeded.
    pub async fn upload_session(
        &self,
        session: &SessionFile,
        format: SessionFormat,
        scratch_dir: &Path,
    ) -> Result<String, UploadError> {
        let name = remote_name(session.metadata(), format)?;
        let staged = scratch_dir.join(&name);

        self.preflight().await?;
        if let Err(e) = export::save(session, &staged) {
            if staged.exists() {
                remove_staged(&staged);
            }
            return Err(e.into());
        }
        let result = self.send_file(&name, &staged).await;
        remove_staged(&staged);

        result?;
        info!("Uploaded session as {name}");
        Ok(name)
    }

    async fn send_file(&self, name: &str, path: &Path) -> Result<(), UploadError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Export(ExportError::Io(e.to_string())))?;
        self.put(name, body).await
    }
}

#[cfg(feature = "upload")]
fn remove_staged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Could not remove {}: {e}", path.display());
    }
}

/// Blocking upload client for use in synchronous contexts.
#[cfg(feature = "upload")]
pub struct BlockingUploadClient {
    inner: UploadClient,
    runtime: tokio::runtime::Runtime,
}

#[cfg(feature = "upload")]
impl BlockingUploadClient {
    /// Create a blocking client for `credentials`.
    pub fn new(credentials: RemoteCredentials) -> Result<Self, UploadError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| UploadError::Client(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: UploadClient::new(credentials)?,
            runtime,
        })
    }

    /// Create a blocking client from configuration, if upload is enabled.
    pub fn from_config(remote: &crate::config::RemoteConfig) -> Result<Self, UploadError> {
        let credentials = remote.credentials().ok_or(UploadError::Disabled)?;
        Self::new(credentials.clone())
    }

    pub fn preflight(&self) -> Result<(), UploadError> {
        self.runtime.block_on(self.inner.preflight())
    }

    pub fn upload_session(
        &self,
        session: &SessionFile,
        format: SessionFormat,
        scratch_dir: &Path,
    ) -> Result<String, UploadError> {
        self.runtime
            .block_on(self.inner.upload_session(session, format, scratch_dir))
    }
}
