use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use keyframe_extractor::{ProgressEvent, ProgressSink, Stage};

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
    pub fn from_args(ui_flag: &str, is_tty: bool) -> Self {
        let mode = match ui_flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self { mode, is_tty }
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Spinner (pretty) or a header line (plain) for a setup step.
    pub fn step(&self, name: &str) -> StepGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StepGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StepGuard::new(name.to_string(), None)
        }
    }

    /// Sink that renders pipeline progress.
    pub fn progress(&self) -> ProgressView {
        let bar = self.pretty().then(|| {
            let bar = ProgressBar::new(100);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        ProgressView {
            bar,
            stage: None,
            start: Instant::now(),
        }
    }
}

pub struct StepGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StepGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Renders `ProgressEvent`s as a bar, or as one line per stage change.
pub struct ProgressView {
    bar: Option<ProgressBar>,
    stage: Option<Stage>,
    start: Instant,
}

impl ProgressSink for ProgressView {
    fn report(&mut self, event: ProgressEvent) {
        let stage_changed = self.stage != Some(event.stage);
        self.stage = Some(event.stage);
        match &self.bar {
            Some(bar) => {
                bar.set_position(u64::from(event.percent));
                if stage_changed {
                    bar.set_message(event.stage.to_string());
                }
                if event.stage == Stage::Completed {
                    bar.finish_with_message(format!(
                        "completed ({})",
                        format_duration(self.start.elapsed())
                    ));
                }
            }
            None if stage_changed => eprintln!("==> {} {:>3}%", event.stage, event.percent),
            None => {}
        }
    }
}

impl Drop for ProgressView {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
