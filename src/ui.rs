use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::detect::ModelState;
use crate::filter::ConfidenceThreshold;
use crate::pipeline::LoopState;
use crate::state::DetectionStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live status line. Plain mode prints at most once per `plain_interval`.
    pub fn dashboard(&self, plain_interval: Duration) -> Dashboard {
        let bar = self.use_pretty().then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar
        });
        Dashboard {
            bar,
            plain_interval,
            last_plain: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

// ----------------------------------------------------------------------------
// Dashboard
// ----------------------------------------------------------------------------

/// Everything the status line shows.
pub struct StatusView<'a> {
    pub loop_state: LoopState,
    pub model: &'a ModelState,
    pub threshold: ConfidenceThreshold,
    pub selected_classes: usize,
    pub stats: &'a DetectionStats,
}

pub struct Dashboard {
    bar: Option<ProgressBar>,
    plain_interval: Duration,
    last_plain: Option<Instant>,
}

impl Dashboard {
    pub fn update(&mut self, view: &StatusView<'_>) {
        let line = status_line(view);
        match &self.bar {
            Some(bar) => {
                bar.set_message(line);
                bar.tick();
            }
            None => {
                let due = self
                    .last_plain
                    .map_or(true, |last| last.elapsed() >= self.plain_interval);
                if due {
                    eprintln!("{line}");
                    self.last_plain = Some(Instant::now());
                }
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

pub fn status_line(view: &StatusView<'_>) -> String {
    let state = match (view.loop_state, view.model) {
        (_, ModelState::Loading) => "loading model",
        (_, ModelState::Failed(_)) => "model unavailable",
        (LoopState::Idle, _) => "paused",
        (LoopState::Running, _) => "detecting",
        (LoopState::WaitingForModel, _) => "waiting for model",
    };
    let classes = if view.selected_classes == 0 {
        "all classes".to_string()
    } else {
        format!("{} classes", view.selected_classes)
    };
    let top = view
        .stats
        .top(3)
        .iter()
        .map(|(label, count)| format!("{label}×{count}"))
        .collect::<Vec<_>>()
        .join(" ");
    let mut line = format!(
        "[{state}] {} fps | {} objects | threshold {} ({}) | {classes}",
        view.stats.fps_text(),
        view.stats.total,
        view.threshold,
        view.threshold.sensitivity(),
    );
    if !top.is_empty() {
        line.push_str(" | ");
        line.push_str(&top);
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
