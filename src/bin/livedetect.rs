//! livedetect - live object detection over a camera feed
//!
//! Reads control commands from stdin (one per line, `help` for the list),
//! renders detections onto an overlay canvas and keeps a status line on
//! stderr. Ctrl-C or `quit` ends the session and releases the camera.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use live_detect::detect::vocabulary;
use live_detect::ui::{self, StatusView};
use live_detect::{
    BackendRegistry, Clock, Control, ControlOutcome, LiveDetectConfig, RgbaCanvas, Session,
    SystemClock,
};

const FALLBACK_INTERVAL_MS: f64 = 1000.0 / 30.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live object detection over a camera feed")]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "LIVE_DETECT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Camera device (`/dev/video0`, `stub://webcam`).
    #[arg(long)]
    camera: Option<String>,
    /// Detector backend name.
    #[arg(long)]
    backend: Option<String>,
    /// Model file for file-backed detectors.
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Confidence threshold in [0.1, 0.9].
    #[arg(long)]
    threshold: Option<f32>,
    /// Comma-separated class allow-list.
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,
    /// Start detecting immediately.
    #[arg(long)]
    detect: bool,
    /// Write the last overlay composited over its frame to this PNG on exit.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// List registered detector backends and exit.
    #[arg(long)]
    list_backends: bool,
    /// UI mode: auto, plain, pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

enum Event {
    Line(String),
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let registry = BackendRegistry::with_builtin();
    if args.list_backends {
        for name in registry.list() {
            let marker = if registry.default_name() == Some(name.as_str()) {
                " (default)"
            } else {
                ""
            };
            println!("{name}{marker}");
        }
        return Ok(());
    }

    let config = {
        let _stage = ui.stage("load config");
        load_config(&args)?
    };

    let mut canvas = RgbaCanvas::new(
        config.camera.profile.ideal.width,
        config.camera.profile.ideal.height,
    );
    if let Some(path) = &config.render.font_path {
        canvas = canvas.with_font_file(path)?;
    }

    let clock = SystemClock::new();
    let mut session = {
        let _stage = ui.stage("open camera");
        Session::open(&config, &registry, canvas)
    };
    if !session.has_camera() {
        log::warn!("no camera stream; detection is unavailable this session");
    }

    let events = spawn_inputs()?;
    if args.detect {
        session.apply(Control::SetDetecting(true), clock.now_ms());
    }

    let mut dashboard = ui.dashboard(Duration::from_secs(2));
    let interval_ms = session.frame_interval_ms().unwrap_or(FALLBACK_INTERVAL_MS);
    let interval = Duration::from_secs_f64(interval_ms / 1000.0);
    log::info!("livedetect running, pacing at {:.1} ms", interval_ms);

    'run: loop {
        session.pump(clock.now_ms());

        let state = session.state();
        let stats = state.stats();
        dashboard.update(&StatusView {
            loop_state: session.loop_state(),
            model: session.model_state(),
            threshold: state.controls.filter.threshold,
            selected_classes: state.controls.filter.classes.selected_count(),
            stats: &stats,
        });

        let mut next = match events.recv_timeout(interval) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break 'run,
        };
        while let Some(event) = next.take() {
            match event {
                Event::Shutdown => break 'run,
                Event::Line(line) => {
                    if handle_line(&mut session, &line, clock.now_ms()) == ControlOutcome::Quit {
                        break 'run;
                    }
                }
            }
            next = events.try_recv().ok();
        }
    }

    dashboard.finish();
    if let Some(path) = &args.snapshot {
        session
            .snapshot(path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        log::info!("snapshot written to {}", path.display());
    }
    if let Some(stats) = session.camera_stats() {
        log::info!(
            "camera {} delivered {} frames",
            stats.device,
            stats.frames_delivered
        );
    }
    session.shutdown();
    Ok(())
}

fn load_config(args: &Args) -> Result<LiveDetectConfig> {
    let mut config = LiveDetectConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = &args.camera {
        config.camera.device = camera.clone();
    }
    if let Some(backend) = &args.backend {
        config.detector.backend = Some(backend.clone());
    }
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }
    if let Some(threshold) = args.threshold {
        config.filter.threshold = threshold;
    }
    if !args.classes.is_empty() {
        config.filter.classes = args.classes.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Stdin lines and Ctrl-C feed one channel so the loop waits on a single
/// receiver.
fn spawn_inputs() -> Result<Receiver<Event>> {
    let (tx, rx) = mpsc::channel();

    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(Event::Shutdown);
    })
    .context("install Ctrl-C handler")?;

    thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(Event::Line(line)).is_err() {
                    break;
                }
            }
        })
        .context("spawn stdin reader")?;

    Ok(rx)
}

fn handle_line(session: &mut Session<RgbaCanvas>, line: &str, now_ms: f64) -> ControlOutcome {
    let line = line.trim();
    if line.is_empty() {
        return ControlOutcome::Ignored;
    }
    if line.eq_ignore_ascii_case("help") {
        print_help();
        return ControlOutcome::Ignored;
    }
    match line.parse::<Control>() {
        Ok(control) => session.apply(control, now_ms),
        Err(err) => {
            eprintln!("{err}");
            ControlOutcome::Ignored
        }
    }
}

fn print_help() {
    eprintln!("commands:");
    eprintln!("  toggle | start | pause");
    eprintln!("  threshold <value> | + | -");
    eprintln!("  class <label> | category <name> | all | clear");
    eprintln!("  quit");
    eprintln!(
        "categories: {}",
        vocabulary::categories().collect::<Vec<_>>().join(", ")
    );
}
