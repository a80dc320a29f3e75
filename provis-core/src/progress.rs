//! Progress reporting for long-running watches.
//!
//! The CLI uses `IndicatifReporter` for a live status spinner.
//! Library callers can use `NoopReporter` or provide their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Trait for reporting the progress of a watched job or batch.
pub trait ProgressReporter: Send + Sync {
    /// Begin watching `task`.
    fn start(&self, task: &str);

    /// Record one poll result, described by `status`.
    fn update(&self, status: &str);

    /// Stop reporting, leaving `summary` behind.
    fn finish(&self, summary: &str);

    /// Display an informational message.
    fn message(&self, msg: &str);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _task: &str) {}
    fn update(&self, _status: &str) {}
    fn finish(&self, _summary: &str) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter backed by an `indicatif` spinner for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    polls: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    /// A reporter that draws nothing (for tests and non-tty output).
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {prefix} {msg} ({elapsed})")
        {
            bar.set_style(style);
        }
        Self {
            bar,
            polls: AtomicU64::new(0),
        }
    }

    /// Number of updates received since the last `start`.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, task: &str) {
        self.polls.store(0, Ordering::Relaxed);
        self.bar.reset();
        self.bar.set_prefix(task.to_string());
        self.bar.set_message("waiting for first status");
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn update(&self, status: &str) {
        let polls = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        self.bar.set_message(format!("{status} [poll {polls}]"));
    }

    fn finish(&self, summary: &str) {
        self.bar.finish_with_message(summary.to_string());
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}
