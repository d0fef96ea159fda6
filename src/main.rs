//! STEP Balance CLI
//!
//! Sensor bridge and session host for balance-board measurements.

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use step_balance::{
    analyze,
    bridge::{discover_board, Bridge, BridgeError, Finder, SerialOpener},
    clock::SystemClock,
    config::Config,
    core::{random_identifier, Axis, FeatureSet, Recording, SubjectInfo},
    create_shared_stats,
    export::{self, suggested_file_name, SessionFile, SessionFormat},
    host::{filter_ports, PortLister, PortSelector, RecorderEvent, SerialPortLister, SessionHost},
    BasicDescriptors, HostStatus, VERSION,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "step")]
#[command(version = VERSION)]
#[command(about = "Balance-board sensor bridge and session host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor bridge: forward board samples to the serial link
    Bridge {
        /// Serial device to write frames to (overrides the configuration)
        #[arg(long)]
        device: Option<String>,
    },

    /// List candidate serial ports
    Ports,

    /// Run the session host on a serial port
    Live {
        /// Serial port to read from; the first available port if omitted
        #[arg(long, short)]
        port: Option<String>,

        /// Record one session as soon as data arrives
        #[arg(long)]
        record: bool,

        /// Recording length in seconds (overrides the configuration)
        #[arg(long)]
        duration: Option<f64>,

        /// Output file for the recorded session (.xlsx or .json)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Upload the recorded session to the configured endpoint
        #[arg(long)]
        upload: bool,

        #[command(flatten)]
        subject: SubjectArgs,
    },

    /// Analyse a saved session and print its features
    Analyze {
        /// Session file (.xlsx or .json)
        file: PathBuf,

        /// Resampling frequency in Hz (overrides the configuration)
        #[arg(long)]
        frequency: Option<f64>,
    },

    /// Convert a saved session between .xlsx and .json
    Export {
        /// Session file to read
        input: PathBuf,

        /// Session file to write; format follows the extension
        output: PathBuf,
    },

    /// Upload a saved session to the configured endpoint
    Upload {
        /// Session file (.xlsx or .json)
        file: PathBuf,
    },

    /// Generate a random subject identifier
    Identifier,

    /// Show configuration
    Config,
}

/// Subject details stored in the session metadata.
#[derive(Args, Debug, Default)]
struct SubjectArgs {
    /// Subject identifier; a random one is generated if omitted
    #[arg(long)]
    identifier: Option<String>,
    #[arg(long, default_value = "")]
    stance: String,
    #[arg(long, default_value = "")]
    eyes: String,
    #[arg(long, default_value = "")]
    age: String,
    #[arg(long, default_value = "")]
    height: String,
    #[arg(long, default_value = "")]
    weight: String,
    #[arg(long, default_value = "")]
    condition: String,
    #[arg(long, default_value = "")]
    medication: String,
    #[arg(long = "fall-history", default_value = "")]
    fall_history: String,
    #[arg(long, default_value = "")]
    notes: String,
}

impl From<SubjectArgs> for SubjectInfo {
    fn from(args: SubjectArgs) -> Self {
        SubjectInfo {
            stance: args.stance,
            eyes: args.eyes,
            identifier: args.identifier.unwrap_or_else(random_identifier),
            age: args.age,
            height: args.height,
            weight: args.weight,
            condition: args.condition,
            medication: args.medication,
            fall_history: args.fall_history,
            notes: args.notes,
        }
    }
}

/// Options for the `live` command.
struct LiveOptions {
    port: Option<String>,
    record: bool,
    duration: Option<f64>,
    output: Option<PathBuf>,
    upload: bool,
    subject: SubjectInfo,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bridge { device } => {
            cmd_bridge(device);
        }
        Commands::Ports => {
            cmd_ports();
        }
        Commands::Live {
            port,
            record,
            duration,
            output,
            upload,
            subject,
        } => {
            cmd_live(LiveOptions {
                port,
                record,
                duration,
                output,
                upload,
                subject: subject.into(),
            });
        }
        Commands::Analyze { file, frequency } => {
            cmd_analyze(&file, frequency);
        }
        Commands::Export { input, output } => {
            cmd_export(&input, &output);
        }
        Commands::Upload { file } => {
            cmd_upload(&file);
        }
        Commands::Identifier => {
            println!("{}", random_identifier());
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn cmd_bridge(device: Option<String>) {
    println!("STEP Balance bridge v{VERSION}");
    println!();

    let mut config = Config::load_or_default();
    if let Some(device) = device {
        config.bridge.device_path = device;
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let clock = SystemClock::shared();
    let stats = create_shared_stats();
    let finder = Finder::new();

    let mut source = match discover_board(&finder, &config.bridge, &clock, &running) {
        Ok(source) => source,
        Err(BridgeError::Stopped) => return,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    println!("Forwarding samples to {}", config.bridge.device_path);
    println!("Press Ctrl+C to stop");
    println!();

    let opener = SerialOpener::new(
        config.bridge.device_path.clone(),
        config.serial.baud_rate,
        config.serial.read_timeout,
    );
    let mut bridge = Bridge::new(config.bridge.clone(), Box::new(opener), clock, stats.clone());
    let result = bridge.run(source.as_mut(), &running);

    println!();
    println!("{}", stats.summary());

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn cmd_ports() {
    let config = Config::load_or_default();
    let ports = match SerialPortLister.list() {
        Ok(ports) => ports,
        Err(e) => {
            error!("Could not list serial ports: {e}");
            std::process::exit(1);
        }
    };

    let ports = filter_ports(ports, &config.host.excluded_ports);
    if ports.is_empty() {
        println!("No serial ports found.");
        return;
    }
    for port in ports {
        println!("{port}");
    }
}

fn cmd_live(options: LiveOptions) {
    println!("STEP Balance session host v{VERSION}");
    println!();

    let mut config = Config::load_or_default();
    if let Err(e) = config.ensure_directories() {
        warn!("Could not create directories: {e}");
    }
    if let Some(secs) = options.duration {
        if secs.is_finite() && secs > 0.0 {
            config.recording.duration = Duration::from_secs_f64(secs);
        } else {
            error!("Recording duration must be a positive number of seconds");
            std::process::exit(1);
        }
    }

    let selector = match options.port.clone() {
        Some(port) => PortSelector::new(Some(port)),
        None => PortSelector::automatic(),
    };
    let host = SessionHost::new(config, selector, SystemClock::shared(), create_shared_stats());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let ingest = match host.spawn_serial_ingest() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Could not start ingestion: {e}");
            std::process::exit(1);
        }
    };

    match &options.port {
        Some(port) => println!("Listening on {port}"),
        None => println!("Listening on the first available port"),
    }
    if options.record {
        println!(
            "Recording {:.1}s for subject {} once data arrives",
            host.config().recording.duration.as_secs_f64(),
            options.subject.identifier
        );
    }
    println!("Press Ctrl+C to stop");
    println!();

    let events = host.recorder().events();
    let mut subject = options.record.then(|| options.subject.clone());
    let mut last_render = Instant::now();
    let mut last_status = None;

    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(RecorderEvent::Started) => println!("Recording..."),
            Ok(RecorderEvent::Completed(recording)) => {
                println!("Recorded {} samples", recording.len());
                finish_recording(&host, options.output.as_deref(), options.upload);
            }
            Ok(RecorderEvent::Aborted(cause)) => {
                eprintln!("Recording aborted: {cause}");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let status = host.status();
        if status == HostStatus::Displaying {
            if let Some(info) = subject.take() {
                if let Err(e) = host.recorder().start(info.clone()) {
                    warn!("Could not start recording: {e}");
                    subject = Some(info);
                }
            }
        }

        if last_status != Some(status) || last_render.elapsed() >= Duration::from_secs(1) {
            render(&host, status);
            last_status = Some(status);
            last_render = Instant::now();
        }
    }

    println!();
    println!("Stopping...");
    host.stop();
    if ingest.join().is_err() {
        warn!("Ingestion thread panicked");
    }

    println!();
    println!("{}", host.stats().summary());
}

/// One status line from already-buffered state.
fn render(host: &SessionHost, status: HostStatus) {
    match host.live().latest() {
        Some(point) if status.has_data() => println!(
            "[{}] {status} | x: {:>8.3} y: {:>8.3} | {} points",
            point.at.format("%H:%M:%S"),
            point.x,
            point.y,
            host.live().len()
        ),
        _ => println!("[{}] {status}", chrono::Local::now().format("%H:%M:%S")),
    }
}

/// Analyse, save and optionally upload the recording that just finished.
fn finish_recording(host: &SessionHost, output: Option<&Path>, upload: bool) {
    let recording = match host.recorder().finished() {
        Ok(recording) => recording,
        Err(e) => {
            warn!("Nothing to save: {e}");
            return;
        }
    };
    let config = host.config();

    let variables = analyze_features(&recording, config.analysis.target_frequency);
    if let Some(features) = &variables {
        print_features(features);
    }

    let session = SessionFile::new(recording, variables);
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => config
            .export_path
            .join(suggested_file_name(session.metadata(), SessionFormat::Xlsx)),
    };
    if let Err(e) = export::save(&session, &path) {
        error!("Could not save session: {e}");
        return;
    }
    println!("Saved session to {}", path.display());

    if upload {
        spawn_upload(config, session, &path);
    }
}

/// Features for `recording`, or `None` with the reason logged.
fn analyze_features(recording: &Recording, frequency: f64) -> Option<FeatureSet> {
    match analyze(recording, frequency, &BasicDescriptors) {
        Ok(analysis) => Some(analysis.features),
        Err(e) => {
            warn!("Analysis failed: {e}");
            None
        }
    }
}

#[cfg(feature = "upload")]
fn spawn_upload(config: &Config, session: SessionFile, path: &Path) {
    use step_balance::BlockingUploadClient;

    let format = match SessionFormat::from_path(path) {
        Ok(format) => format,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    let remote = config.remote.clone();
    let scratch = config.scratch_path.clone();

    // Not joined: an upload still in flight at exit is abandoned.
    let spawned = thread::Builder::new()
        .name("upload".to_string())
        .spawn(move || {
            let result = BlockingUploadClient::from_config(&remote)
                .and_then(|client| client.upload_session(&session, format, &scratch));
            match result {
                Ok(name) => info!("Upload complete: {name}"),
                Err(e) => error!("Upload failed: {e}"),
            }
        });
    if let Err(e) = spawned {
        error!("Could not start upload: {e}");
    }
}

#[cfg(not(feature = "upload"))]
fn spawn_upload(_config: &Config, _session: SessionFile, _path: &Path) {
    warn!("--upload ignored (upload feature not enabled at compile time)");
}

fn cmd_analyze(file: &Path, frequency: Option<f64>) {
    let config = Config::load_or_default();
    let session = load_session(&config, file);
    let frequency = frequency.unwrap_or(config.analysis.target_frequency);

    match analyze(&session.recording, frequency, &BasicDescriptors) {
        Ok(analysis) => {
            let metadata = session.metadata();
            println!("Session: {} ({} {})", metadata.identifier, metadata.date, metadata.time);
            println!(
                "Samples: {} recorded, {} after resampling at {frequency} Hz",
                session.recording.len(),
                analysis.trajectory.len()
            );
            println!();
            print_features(&analysis.features);
        }
        Err(e) => {
            error!("Analysis failed: {e}");
            std::process::exit(1);
        }
    }
}

/// The three report tables: AP, ML and general.
fn print_features(features: &FeatureSet) {
    for (title, axis) in [
        ("Antero-posterior", Axis::Ap),
        ("Medio-lateral", Axis::Ml),
        ("General", Axis::General),
    ] {
        println!("{title}");
        println!("{}", "=".repeat(title.len()));
        for (name, value) in features.table(axis) {
            println!(
                "  {:<28} {:>10.2} {:<8} (ref. {})",
                name.label(),
                value,
                name.unit(),
                name.reference()
            );
        }
        println!();
    }
}

fn cmd_export(input: &Path, output: &Path) {
    let config = Config::load_or_default();
    let mut session = load_session(&config, input);

    if session.variables.is_none() {
        session.variables =
            analyze_features(&session.recording, config.analysis.target_frequency);
    }

    match export::save(&session, output) {
        Ok(()) => println!("Exported to {}", output.display()),
        Err(e) => {
            error!("Could not export session: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "upload")]
fn cmd_upload(file: &Path) {
    use step_balance::BlockingUploadClient;

    let config = Config::load_or_default();
    let session = load_session(&config, file);
    let format = match SessionFormat::from_path(file) {
        Ok(format) => format,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let result = BlockingUploadClient::from_config(&config.remote)
        .and_then(|client| client.upload_session(&session, format, &config.scratch_path));
    match result {
        Ok(name) => println!("Uploaded as {name}"),
        Err(e) => {
            error!("Upload failed: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "upload"))]
fn cmd_upload(_file: &Path) {
    error!("Upload support not enabled at compile time");
    std::process::exit(1);
}

fn cmd_config() {
    let config = Config::load_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    match config.to_display_json() {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to render configuration: {e}"),
    }
}

/// Load a saved session through an offline host, as the analysis view does.
fn load_session(config: &Config, path: &Path) -> SessionFile {
    let host = SessionHost::new(
        config.clone(),
        PortSelector::automatic(),
        SystemClock::shared(),
        create_shared_stats(),
    );
    match host.open_session(path) {
        Ok(session) => session,
        Err(e) => {
            error!("{}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        warn!("Could not set Ctrl+C handler: {e}");
    }
}
