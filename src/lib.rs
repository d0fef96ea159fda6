//! STEP Balance - balance-board acquisition and postural-sway analysis.
//!
//! The crate has two halves joined by a serial link:
//!
//! - **Sensor bridge**: reads the four corner sensors of a balance board,
//!   assembles complete samples and writes them as text frames to a serial
//!   port, reconnecting whenever the link drops.
//! - **Session host**: reads frames from an operator-selected serial port,
//!   keeps a bounded live buffer for display, records timed sessions,
//!   normalizes them into a center-of-pressure trajectory and computes
//!   sway features. Sessions are saved as `.xlsx` or `.json` and can be
//!   uploaded to a remote endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────── Sensor Bridge ─────────────────┐
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────┐ │
//! │  │ EventSource │──▶│  Assembler  │──▶│ Serial │─┼──┐
//! │  │   (evdev)   │   │ (4 corners) │   │  Sink  │ │  │
//! │  └─────────────┘   └─────────────┘   └────────┘ │  │
//! └─────────────────────────────────────────────────┘  │ "[tl, tr, bl, br]\n"
//! ┌───────────────── Session Host ──────────────────┐  │
//! │  ┌─────────────┐   ┌─────────────┐              │  │
//! │  │ IngestTask  │──▶│ LiveBuffer  │◀── render    │◀─┘
//! │  └─────────────┘   └─────────────┘              │
//! │         │                 │                     │
//! │         ▼                 ▼                     │
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────┐ │
//! │  │ StatusCell  │◀──│  Recorder   │──▶│Analyze │ │
//! │  └─────────────┘   └─────────────┘   └────────┘ │
//! │                                          │      │
//! │                              export ◀────┴──▶ upload
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use step_balance::{analyze, export, BasicDescriptors, TARGET_FREQUENCY};
//! use std::path::Path;
//!
//! let session = export::load(Path::new("session.xlsx")).expect("Failed to load session");
//! let analysis = analyze(&session.recording, TARGET_FREQUENCY, &BasicDescriptors)
//!     .expect("Analysis failed");
//! println!("{} points", analysis.trajectory.len());
//! ```

pub mod bridge;
pub mod clock;
pub mod config;
pub mod core;
pub mod export;
pub mod host;
pub mod link;
pub mod stats;
pub mod upload;

// Re-export key types at crate root for convenience
pub use bridge::{Bridge, BridgeError, RawSample};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, ConfigError, RemoteConfig, RemoteCredentials};
pub use self::core::{
    analyze, random_identifier, Analysis, AnalysisError, BasicDescriptors, DescriptorBackend,
    FeatureName, FeatureSet, Recording, SessionMetadata, SubjectInfo, TARGET_FREQUENCY,
};
pub use export::{ExportError, SessionFile, SessionFormat};
pub use host::{HostMode, HostStatus, PortSelector, RecordError, SessionHost};
pub use stats::{create_shared_stats, LinkStats, SharedStats};
pub use upload::UploadError;

#[cfg(feature = "upload")]
pub use upload::{BlockingUploadClient, UploadClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
