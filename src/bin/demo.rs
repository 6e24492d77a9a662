//! demo - headless synthetic run of the detection loop
//!
//! Drives a `stub://` camera and the scene backend on a manual clock, applies
//! an optional command script and prints a summary.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use live_detect::ui;
use live_detect::{
    BackendRegistry, Clock, Control, CycleOutcome, LiveDetectConfig, ManualClock, ModelState,
    RgbaCanvas, Session,
};

const DEMO_WIDTH: u32 = 1280;
const DEMO_HEIGHT: u32 = 720;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Synthetic camera frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Scene seed for the stub detector.
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Commands applied at a frame index, e.g. `60:threshold 0.7;90:category animals`.
    #[arg(long, value_delimiter = ';')]
    script: Vec<String>,
    /// Write the final overlay composited over its frame as PNG.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Write the summary as JSON.
    #[arg(long, value_name = "PATH")]
    summary_json: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    ticks: u64,
    cycles_published: u64,
    frames_not_ready: u64,
    inference_failures: u64,
    waiting_for_model: u64,
    camera_frames: u64,
    mean_fps: f64,
    class_totals: BTreeMap<String, usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    let script = parse_script(&args.script)?;
    let ui = ui::Ui::from_args(None, std::io::stderr().is_terminal());

    let mut config = LiveDetectConfig::load()?;
    config.camera.device = format!(
        "stub://demo?width={}&height={}&fps={}",
        DEMO_WIDTH, DEMO_HEIGHT, args.fps
    );
    config.camera.profile.min.fps = config.camera.profile.min.fps.min(args.fps);
    config.detector.backend = Some("stub".to_string());
    config.detector.seed = args.seed;
    config.validate()?;

    let registry = BackendRegistry::with_builtin();
    let clock = ManualClock::new(0.0);
    let mut session = Session::open(&config, &registry, RgbaCanvas::new(DEMO_WIDTH, DEMO_HEIGHT));

    {
        let _stage = ui.stage("load model");
        if let ModelState::Failed(reason) = session.adapter_mut().wait(Duration::from_secs(10)) {
            return Err(anyhow!("model failed to load: {reason}"));
        }
    }
    session.apply(Control::SetDetecting(true), clock.now_ms());

    let mut summary = Summary::default();
    let total_ticks = args.seconds.saturating_mul(args.fps as u64);
    let interval_ms = 1000.0 / args.fps as f64;
    {
        let _stage = ui.stage("run synthetic session");
        for tick in 0..total_ticks {
            for control in script.get(&tick).into_iter().flatten() {
                session.apply(control.clone(), clock.now_ms());
            }
            match session.pump(clock.now_ms()) {
                Some(CycleOutcome::Published { .. }) => {
                    summary.cycles_published += 1;
                    for detection in &session.state().published.detections {
                        *summary
                            .class_totals
                            .entry(detection.label.clone())
                            .or_default() += 1;
                    }
                }
                Some(CycleOutcome::FrameNotReady) => summary.frames_not_ready += 1,
                Some(CycleOutcome::InferenceFailed(_)) => summary.inference_failures += 1,
                Some(CycleOutcome::WaitingForModel) => summary.waiting_for_model += 1,
                _ => {}
            }
            summary.ticks += 1;
            clock.advance(interval_ms);
        }
    }

    summary.mean_fps = session.state().published.fps;
    summary.camera_frames = session
        .camera_stats()
        .map(|stats| stats.frames_delivered)
        .unwrap_or(0);

    if let Some(path) = &args.snapshot {
        session
            .snapshot(path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
    }
    session.shutdown();

    println!("ticks:            {}", summary.ticks);
    println!("cycles published: {}", summary.cycles_published);
    println!("frames not ready: {}", summary.frames_not_ready);
    println!("camera frames:    {}", summary.camera_frames);
    println!("mean fps:         {:.1}", summary.mean_fps);
    for (label, count) in &summary.class_totals {
        println!("  {label:<16} {count}");
    }
    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

fn parse_script(entries: &[String]) -> Result<BTreeMap<u64, Vec<Control>>> {
    let mut script: BTreeMap<u64, Vec<Control>> = BTreeMap::new();
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        let (tick, command) = entry
            .split_once(':')
            .ok_or_else(|| anyhow!("script entry '{}' must be FRAME:COMMAND", entry))?;
        let tick: u64 = tick
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid frame index in '{}'", entry))?;
        let control: Control = command
            .parse()
            .with_context(|| format!("script entry '{}'", entry))?;
        script.entry(tick).or_default().push(control);
    }
    Ok(script)
}
