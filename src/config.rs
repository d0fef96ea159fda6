//! Configuration for the sensor bridge and the session host.

use crate::host::frame::BoardGeometry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const REDACTED: &str = "<redacted>";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Practitioner recorded in every session's metadata
    pub practitioner: String,

    /// Remote endpoint for session upload
    pub remote: RemoteConfig,

    /// Serial link parameters, shared by both ends
    pub serial: SerialConfig,

    /// Sensor bridge settings
    pub bridge: BridgeConfig,

    /// Session host ingestion settings
    pub host: HostConfig,

    /// Recording capture settings
    pub recording: RecordingConfig,

    /// Normalization and feature extraction settings
    pub analysis: AnalysisConfig,

    /// Default directory for saved sessions
    pub export_path: PathBuf,

    /// Directory for temporary upload artifacts
    pub scratch_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("step-balance");

        Self {
            practitioner: "unknown".to_string(),
            remote: RemoteConfig::Disabled,
            serial: SerialConfig::default(),
            bridge: BridgeConfig::default(),
            host: HostConfig::default(),
            recording: RecordingConfig::default(),
            analysis: AnalysisConfig::default(),
            export_path: data_dir.join("sessions"),
            scratch_path: data_dir.join("scratch"),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration, degrading to defaults when the file is malformed.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!("Error while reading config file: {e}, using defaults");
            Self::default()
        })
    }

    /// Copy of this configuration that is safe to display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let RemoteConfig::Enabled(creds) = &mut config.remote {
            if !creds.password.is_empty() {
                creds.password = REDACTED.to_string();
            }
        }
        config
    }

    /// Pretty JSON of the redacted configuration.
    pub fn to_display_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&self.redacted())
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("step-balance")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.scratch_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Remote upload endpoint.
///
/// An `Enabled` entry with any empty field behaves as `Disabled`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RemoteConfig {
    #[default]
    Disabled,
    Enabled(RemoteCredentials),
}

impl RemoteConfig {
    /// Usable credentials, if any.
    pub fn credentials(&self) -> Option<&RemoteCredentials> {
        match self {
            RemoteConfig::Enabled(c) if c.is_complete() => Some(c),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Credentials for the remote endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCredentials {
    /// Base URL; the upload name is appended to it
    pub url: String,
    pub username: String,
    pub password: String,
}

impl RemoteCredentials {
    fn is_complete(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Serial link parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Upper bound on each blocking read
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// Sensor bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device the bridge writes to
    pub device_path: String,
    /// Input device name of the balance board
    pub board_name: String,
    #[serde(with = "duration_ms")]
    pub discovery_interval: Duration,
    #[serde(with = "duration_ms")]
    pub reconnect_backoff: Duration,
    /// Pause after each written frame
    #[serde(with = "duration_ms")]
    pub frame_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/ttyGS0".to_string(),
            board_name: "Nintendo Wii Remote Balance Board".to_string(),
            discovery_interval: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(1),
            frame_interval: Duration::from_millis(10),
        }
    }
}

/// Session host ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Maximum number of points kept for live display
    pub live_capacity: usize,
    /// Pause between reads that returned no data
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Pause between port scans while no port is usable
    #[serde(with = "duration_ms")]
    pub idle_interval: Duration,
    #[serde(with = "duration_ms")]
    pub reconnect_backoff: Duration,
    /// Ports whose name or description contains one of these are skipped
    pub excluded_ports: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            live_capacity: 50,
            poll_interval: Duration::from_millis(10),
            idle_interval: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(1),
            excluded_ports: vec!["Bluetooth".to_string()],
        }
    }
}

/// Recording capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Interval between samples taken from the live buffer
    #[serde(with = "duration_ms")]
    pub cadence: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            cadence: Duration::from_millis(10),
        }
    }
}

/// Normalization and feature extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Resampling frequency in Hz
    pub target_frequency: f64,
    /// Board geometry for reducing four-channel frames to CoP.
    /// Unset means four-channel frames are not reduced.
    pub board_geometry: Option<BoardGeometry>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_frequency: 100.0,
            board_geometry: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
