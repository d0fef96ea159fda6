//! Integration tests for the session host pipeline: serial lines in, saved
//! session out.

use approx::assert_relative_eq;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use step_balance::clock::{Clock, ManualClock};
use step_balance::config::Config;
use step_balance::core::{analyze, BasicDescriptors, FeatureName, SubjectInfo};
use step_balance::export::{self, SessionFile};
use step_balance::host::{
    HostMode, HostStatus, LineSource, LinkOpener, PortInfo, PortLister, PortSelector,
    RecordError, RecorderEvent, SessionHost,
};
use step_balance::create_shared_stats;

struct OnePort;

impl PortLister for OnePort {
    fn list(&self) -> io::Result<Vec<PortInfo>> {
        Ok(vec![
            PortInfo::new("/dev/tty.Bluetooth-Incoming-Port", ""),
            PortInfo::new("/dev/ttyACM0", "Gadget Serial"),
        ])
    }
}

/// A slow sway, sent alternately as bracketed and bare frames.
struct SwayLink {
    tick: u64,
}

impl LineSource for SwayLink {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        thread::sleep(Duration::from_micros(100));
        self.tick += 1;
        let t = self.tick as f64 / 100.0;
        let (x, y) = (2.0 + t.sin(), -1.5 + (0.7 * t).cos());
        if self.tick % 2 == 0 {
            Ok(Some(format!("[{x:.5}, {y:.5}]\r")))
        } else {
            Ok(Some(format!("{x:.5},{y:.5}")))
        }
    }
}

struct SwayOpener;

impl LinkOpener for SwayOpener {
    fn open(&self, port: &str) -> io::Result<Box<dyn LineSource>> {
        assert_eq!(port, "/dev/ttyACM0");
        Ok(Box::new(SwayLink { tick: 0 }))
    }
}

struct DeadOpener;

impl LinkOpener for DeadOpener {
    fn open(&self, _port: &str) -> io::Result<Box<dyn LineSource>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
    }
}

/// Manual time that yields briefly on every sleep so the ingestion thread
/// keeps feeding the live buffer while a capture runs.
struct PacedClock(ManualClock);

impl Clock for PacedClock {
    fn now(&self) -> Duration {
        self.0.now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(Duration::from_micros(200));
        self.0.sleep(duration);
    }
}

fn host(secs: u64) -> SessionHost {
    let mut config = Config::default();
    config.practitioner = "Dr. Test".to_string();
    config.recording.duration = Duration::from_secs(secs);
    SessionHost::new(
        config,
        PortSelector::automatic(),
        Arc::new(PacedClock(ManualClock::new())),
        create_shared_stats(),
    )
}

fn wait_for(host: &SessionHost, status: HostStatus) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if host.status() == status {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn test_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("step-pipeline-{name}-{}", std::process::id()))
}

#[test]
fn test_record_analyze_save_reload() {
    let host = host(2);
    let ingest = host
        .spawn_ingest(Box::new(OnePort), Box::new(SwayOpener))
        .expect("Failed to spawn ingestion");
    assert!(wait_for(&host, HostStatus::Displaying));

    let events = host.recorder().events();
    let subject = SubjectInfo {
        identifier: "PIPE000001".to_string(),
        stance: "Feet together".to_string(),
        eyes: "Closed".to_string(),
        fall_history: "No".to_string(),
        ..SubjectInfo::default()
    };
    host.recorder()
        .start(subject)
        .expect("Recording refused")
        .join()
        .expect("Capture thread panicked");

    assert!(matches!(
        events.recv_timeout(Duration::from_secs(1)).unwrap(),
        RecorderEvent::Started
    ));
    let recording = match events.recv_timeout(Duration::from_secs(1)).unwrap() {
        RecorderEvent::Completed(recording) => recording,
        other => panic!("unexpected event {other:?}"),
    };
    assert!((recording.len() as i64 - 201).abs() <= 1, "{}", recording.len());
    assert_eq!(recording.samples[0].time, 0.0);
    assert_eq!(recording.metadata.identifier, "PIPE000001");
    assert_eq!(recording.metadata.practitioner, "Dr. Test");
    assert_eq!(recording.metadata.duration, "2");
    assert_eq!(host.status(), HostStatus::Displaying);

    let analysis = analyze(&recording, 100.0, &BasicDescriptors).expect("Analysis failed");
    assert_eq!(analysis.trajectory.len(), 201);
    assert_eq!(analysis.trajectory.time[200], 2.0);
    for (_, value) in analysis.features.iter() {
        assert!(value.is_finite());
    }

    let saved = host.recorder().finished().expect("Nothing to save");
    let session = SessionFile::new(saved, Some(analysis.features.clone()));
    let dir = test_dir("reload");

    for file in ["session.xlsx", "session.json"] {
        let path = dir.join(file);
        export::save(&session, &path).expect("Save failed");
        let loaded = export::load(&path).expect("Load failed");

        assert_eq!(loaded.metadata(), session.metadata());
        let expected = session.rounded_samples();
        assert_eq!(loaded.recording.len(), expected.len());
        for (a, b) in loaded.recording.samples.iter().zip(&expected) {
            assert_relative_eq!(a.time, b.time, epsilon = 1e-9);
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        }

        let variables = loaded.variables.expect("Variables not reloaded");
        for name in FeatureName::ALL {
            assert_relative_eq!(
                variables.get(name),
                analysis.features.get(name),
                epsilon = 1e-9
            );
        }

        let again = analyze(&loaded.recording, 100.0, &BasicDescriptors).unwrap();
        assert_eq!(again.trajectory.len(), analysis.trajectory.len());
    }

    // Opening a saved file replaces the recording and leaves live mode.
    let opened = host
        .open_session(&dir.join("session.json"))
        .expect("Open failed");
    assert_eq!(host.mode(), HostMode::Analysis);
    assert_eq!(host.recorder().finished().unwrap(), opened.recording);
    assert_eq!(opened.recording.len(), session.recording.len());
    assert!(wait_for(&host, HostStatus::Disconnected));

    host.stop();
    ingest.join().expect("Ingestion thread panicked");

    let stats = host.stats().snapshot();
    assert!(stats.frames_received > 0);
    assert_eq!(stats.frames_rejected, 0);
    assert_eq!(stats.recordings_completed, 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_recording_refused_without_link() {
    let host = host(1);
    let ingest = host
        .spawn_ingest(Box::new(OnePort), Box::new(DeadOpener))
        .unwrap();

    thread::sleep(Duration::from_millis(20));
    assert_eq!(host.status(), HostStatus::Disconnected);
    assert_eq!(
        host.recorder().start(SubjectInfo::default()).unwrap_err(),
        RecordError::Disconnected
    );
    assert_eq!(
        host.recorder().finished().unwrap_err(),
        RecordError::NothingRecorded
    );

    host.stop();
    ingest.join().unwrap();
    assert!(host.stats().snapshot().reconnects > 0);
}

#[test]
fn test_analysis_mode_releases_port() {
    let host = host(1);
    let ingest = host
        .spawn_ingest(Box::new(OnePort), Box::new(SwayOpener))
        .unwrap();
    assert!(wait_for(&host, HostStatus::Displaying));

    host.set_mode(HostMode::Analysis);
    assert!(wait_for(&host, HostStatus::Disconnected));

    host.set_mode(HostMode::Live);
    assert!(wait_for(&host, HostStatus::Displaying));
    assert_eq!(host.selector().available().len(), 1);

    host.stop();
    ingest.join().unwrap();
}
