//! Recording state machine.
//!
//! `idle → recording → idle`. A capture runs on its own thread, sampling the
//! live buffer's most recent point at a fixed cadence until the configured
//! duration has elapsed. Outcomes are published on a channel; only completed
//! captures become the current recording.

use crate::clock::SharedClock;
use crate::config::RecordingConfig;
use crate::core::session::{RecordedSample, Recording, SessionMetadata, SubjectInfo};
use crate::export::{self, SessionFile};
use crate::host::live::SharedLiveBuffer;
use crate::host::status::{HostStatus, SharedStatus};
use crate::stats::SharedStats;
use chrono::Local;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Why a recording could not start, or why there is nothing to save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    AlreadyRecording,
    /// No serial link
    Disconnected,
    /// Link up but nothing received yet
    NoData,
    /// No completed recording
    NothingRecorded,
    /// The capture thread could not be spawned
    Spawn(String),
    /// A saved session could not be loaded
    Load(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::AlreadyRecording => write!(f, "Already recording"),
            RecordError::Disconnected => write!(f, "Not connected to the board"),
            RecordError::NoData => write!(f, "Connected but no data received yet"),
            RecordError::NothingRecorded => write!(f, "No recording available"),
            RecordError::Spawn(msg) => write!(f, "Could not start capture: {msg}"),
            RecordError::Load(msg) => write!(f, "Could not load session: {msg}"),
        }
    }
}

impl std::error::Error for RecordError {}

/// Published by the capture thread.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Started,
    Completed(Recording),
    Aborted(String),
}

/// Starts captures and holds the current recording.
pub struct Recorder {
    config: RecordingConfig,
    practitioner: String,
    live: SharedLiveBuffer,
    status: SharedStatus,
    stats: SharedStats,
    clock: SharedClock,
    active: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Recording>>>,
    events_tx: Sender<RecorderEvent>,
    events_rx: Receiver<RecorderEvent>,
}

impl Recorder {
    pub fn new(
        config: RecordingConfig,
        practitioner: impl Into<String>,
        live: SharedLiveBuffer,
        status: SharedStatus,
        stats: SharedStats,
        clock: SharedClock,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            practitioner: practitioner.into(),
            live,
            status,
            stats,
            clock,
            active: Arc::new(AtomicBool::new(false)),
            current: Arc::new(Mutex::new(None)),
            events_tx,
            events_rx,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Receiver for capture outcomes.
    pub fn events(&self) -> Receiver<RecorderEvent> {
        self.events_rx.clone()
    }

    /// The last completed recording.
    pub fn current(&self) -> Option<Recording> {
        lock(&self.current).clone()
    }

    /// Load a saved session; its recording replaces the current one.
    pub fn load(&self, path: &Path) -> Result<SessionFile, RecordError> {
        if self.is_recording() {
            return Err(RecordError::AlreadyRecording);
        }
        let session = export::load(path).map_err(|e| RecordError::Load(e.to_string()))?;
        self.set_current(session.recording.clone())?;
        info!(
            "Loaded {} ({} samples)",
            path.display(),
            session.recording.len()
        );
        Ok(session)
    }

    /// Replace the current recording.
    fn set_current(&self, recording: Recording) -> Result<(), RecordError> {
        if self.is_recording() {
            return Err(RecordError::AlreadyRecording);
        }
        *lock(&self.current) = Some(recording);
        Ok(())
    }

    /// The current recording, if it can be saved now.
    pub fn finished(&self) -> Result<Recording, RecordError> {
        if self.is_recording() {
            return Err(RecordError::AlreadyRecording);
        }
        self.current().ok_or(RecordError::NothingRecorded)
    }

    /// Start a capture for `subject`.
    ///
    /// Refused without side effects while recording, while disconnected, or
    /// before any data has arrived.
    pub fn start(&self, subject: SubjectInfo) -> Result<JoinHandle<()>, RecordError> {
        if self.is_recording() {
            return Err(RecordError::AlreadyRecording);
        }
        match self.status.get() {
            HostStatus::Disconnected => return Err(RecordError::Disconnected),
            HostStatus::Connected => return Err(RecordError::NoData),
            HostStatus::Recording => return Err(RecordError::AlreadyRecording),
            HostStatus::Displaying => {}
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RecordError::AlreadyRecording);
        }
        if let Err(status) = self.status.begin_recording() {
            self.active.store(false, Ordering::SeqCst);
            return Err(match status {
                HostStatus::Disconnected => RecordError::Disconnected,
                HostStatus::Connected => RecordError::NoData,
                _ => RecordError::AlreadyRecording,
            });
        }

        let capture = Capture {
            config: self.config.clone(),
            practitioner: self.practitioner.clone(),
            subject,
            live: self.live.clone(),
            status: self.status.clone(),
            clock: self.clock.clone(),
        };
        let active = self.active.clone();
        let current = self.current.clone();
        let status = self.status.clone();
        let stats = self.stats.clone();
        let events = self.events_tx.clone();

        let spawned = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let _ = events.send(RecorderEvent::Started);
                let outcome = capture.run();

                status.end_recording();
                match outcome {
                    Ok(recording) => {
                        info!("Recording finished ({} samples)", recording.len());
                        *lock(&current) = Some(recording.clone());
                        active.store(false, Ordering::SeqCst);
                        stats.record_recording_completed();
                        let _ = events.send(RecorderEvent::Completed(recording));
                    }
                    Err(cause) => {
                        error!("Recording aborted: {cause}");
                        active.store(false, Ordering::SeqCst);
                        stats.record_recording_aborted();
                        let _ = events.send(RecorderEvent::Aborted(cause));
                    }
                }
            });

        spawned.map_err(|e| {
            warn!("Could not spawn capture thread: {e}");
            self.status.end_recording();
            self.active.store(false, Ordering::SeqCst);
            RecordError::Spawn(e.to_string())
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a capture thread needs.
struct Capture {
    config: RecordingConfig,
    practitioner: String,
    subject: SubjectInfo,
    live: SharedLiveBuffer,
    status: SharedStatus,
    clock: SharedClock,
}

impl Capture {
    fn run(self) -> Result<Recording, String> {
        let started_at = Local::now();
        let start = self.clock.now();
        let mut samples = Vec::new();

        info!(
            "Recording {:.1}s at {}ms cadence",
            self.config.duration.as_secs_f64(),
            self.config.cadence.as_millis()
        );

        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed > self.config.duration {
                break;
            }
            if self.status.get() == HostStatus::Disconnected {
                return Err("Serial link lost during recording".to_string());
            }
            let point = self
                .live
                .latest()
                .ok_or_else(|| "No live data to record".to_string())?;
            samples.push(RecordedSample::new(elapsed.as_secs_f64(), point.x, point.y));
            self.clock.sleep(self.config.cadence);
        }

        let metadata = SessionMetadata::new(
            &started_at,
            self.config.duration,
            &self.subject,
            &self.practitioner,
        );
        Ok(Recording::new(metadata, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::host::live::{LiveBuffer, LivePoint};
    use crate::host::status::StatusCell;
    use crate::stats::create_shared_stats;
    use chrono::Utc;
    use std::time::Duration;

    fn recorder(secs: u64) -> (Recorder, SharedLiveBuffer, SharedStatus) {
        let live = LiveBuffer::shared(50);
        let status = StatusCell::shared();
        let config = RecordingConfig {
            duration: Duration::from_secs(secs),
            cadence: Duration::from_millis(10),
        };
        let recorder = Recorder::new(
            config,
            "tester",
            live.clone(),
            status.clone(),
            create_shared_stats(),
            Arc::new(ManualClock::new()),
        );
        (recorder, live, status)
    }

    #[test]
    fn test_start_guards() {
        let (recorder, live, status) = recorder(1);
        assert_eq!(
            recorder.start(SubjectInfo::default()).unwrap_err(),
            RecordError::Disconnected
        );

        status.connected();
        assert_eq!(
            recorder.start(SubjectInfo::default()).unwrap_err(),
            RecordError::NoData
        );
        assert_eq!(status.get(), HostStatus::Connected);
        assert!(!recorder.is_recording());
        assert!(recorder.current().is_none());
        assert!(live.is_empty());
    }

    #[test]
    fn test_refused_while_recording() {
        let (recorder, live, status) = recorder(1);
        status.connected();
        status.data_received();
        live.push(LivePoint::new(Utc::now(), 1.0, 2.0));

        recorder.active.store(true, Ordering::SeqCst);
        assert_eq!(
            recorder.start(SubjectInfo::default()).unwrap_err(),
            RecordError::AlreadyRecording
        );
        assert_eq!(status.get(), HostStatus::Displaying);
        assert_eq!(recorder.finished().unwrap_err(), RecordError::AlreadyRecording);
    }

    fn saved_session(name: &str, identifier: &str) -> std::path::PathBuf {
        let metadata = SessionMetadata {
            identifier: identifier.to_string(),
            duration: "1".to_string(),
            ..SessionMetadata::default()
        };
        let samples = (0..=100)
            .map(|i| RecordedSample::new(i as f64 / 100.0, 0.5, -0.5))
            .collect();
        let session = SessionFile::new(Recording::new(metadata, samples), None);
        let path = std::env::temp_dir()
            .join(format!("step-recorder-{name}-{}", std::process::id()))
            .join("session.json");
        export::save(&session, &path).unwrap();
        path
    }

    #[test]
    fn test_load_replaces_current() {
        let (recorder, _live, _status) = recorder(1);
        assert_eq!(recorder.finished().unwrap_err(), RecordError::NothingRecorded);

        let first = saved_session("first", "LOAD000001");
        let second = saved_session("second", "LOAD000002");

        let session = recorder.load(&first).unwrap();
        assert_eq!(session.metadata().identifier, "LOAD000001");
        assert_eq!(recorder.finished().unwrap(), session.recording);

        recorder.load(&second).unwrap();
        let current = recorder.current().unwrap();
        assert_eq!(current.metadata.identifier, "LOAD000002");
        assert_eq!(current.len(), 101);

        // A failed load keeps what was there.
        let missing = first.with_file_name("missing.json");
        assert!(matches!(recorder.load(&missing), Err(RecordError::Load(_))));
        assert_eq!(recorder.current().unwrap().metadata.identifier, "LOAD000002");

        for path in [first, second] {
            let _ = std::fs::remove_dir_all(path.parent().unwrap());
        }
    }

    #[test]
    fn test_load_refused_while_recording() {
        let (recorder, _live, _status) = recorder(1);
        let path = saved_session("busy", "LOAD000003");

        recorder.active.store(true, Ordering::SeqCst);
        assert_eq!(recorder.load(&path).unwrap_err(), RecordError::AlreadyRecording);
        recorder.active.store(false, Ordering::SeqCst);
        assert!(recorder.current().is_none());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_five_second_capture() {
        let (recorder, live, status) = recorder(5);
        status.connected();
        live.push(LivePoint::new(Utc::now(), 1.5, -0.5));
        status.data_received();

        let events = recorder.events();
        let subject = SubjectInfo {
            identifier: "ABC123XYZ0".to_string(),
            ..SubjectInfo::default()
        };
        recorder.start(subject).unwrap().join().unwrap();

        assert!(matches!(events.recv().unwrap(), RecorderEvent::Started));
        let recording = match events.recv().unwrap() {
            RecorderEvent::Completed(r) => r,
            other => panic!("unexpected {other:?}"),
        };

        assert!((recording.len() as i64 - 500).abs() <= 1, "{}", recording.len());
        assert_eq!(recording.samples[0].time, 0.0);
        assert!(recording.samples.windows(2).all(|w| w[1].time > w[0].time));
        assert!((recording.duration_secs() - 5.0).abs() < 1e-9);
        assert_eq!(recording.metadata.identifier, "ABC123XYZ0");
        assert_eq!(recording.metadata.practitioner, "tester");

        assert_eq!(status.get(), HostStatus::Displaying);
        assert!(!recorder.is_recording());
        assert_eq!(recorder.finished().unwrap(), recording);
    }

    /// Drops the link after a fixed number of capture ticks.
    struct UnpluggingClock {
        inner: ManualClock,
        status: SharedStatus,
        after: usize,
    }

    impl Clock for UnpluggingClock {
        fn now(&self) -> Duration {
            self.inner.now()
        }

        fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration);
            if self.inner.sleeps().len() == self.after {
                self.status.disconnected();
            }
        }
    }

    #[test]
    fn test_link_loss_aborts() {
        let live = LiveBuffer::shared(50);
        let status = StatusCell::shared();
        let clock = UnpluggingClock {
            inner: ManualClock::new(),
            status: status.clone(),
            after: 3,
        };
        let recorder = Recorder::new(
            RecordingConfig::default(),
            "tester",
            live.clone(),
            status.clone(),
            create_shared_stats(),
            Arc::new(clock),
        );
        status.connected();
        live.push(LivePoint::new(Utc::now(), 0.0, 0.0));
        status.data_received();
        let events = recorder.events();

        recorder.start(SubjectInfo::default()).unwrap().join().unwrap();
        let _ = events.recv();
        match events.recv().unwrap() {
            RecorderEvent::Aborted(cause) => assert!(cause.contains("lost")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!recorder.is_recording());
        assert!(recorder.current().is_none());
        assert_eq!(status.get(), HostStatus::Disconnected);
    }

    #[test]
    fn test_empty_buffer_aborts() {
        let (recorder, _live, status) = recorder(1);
        status.connected();
        status.data_received();
        let events = recorder.events();

        recorder.start(SubjectInfo::default()).unwrap().join().unwrap();
        let _ = events.recv();
        assert!(matches!(events.recv().unwrap(), RecorderEvent::Aborted(_)));
        assert!(recorder.current().is_none());
        assert_eq!(recorder.finished().unwrap_err(), RecordError::NothingRecorded);
        assert_eq!(status.get(), HostStatus::Displaying);
    }
}
