//! Batch progress on stderr.
//!
//! stdout carries the summary (or the `--json` report), so progress lines
//! never go there.

use std::io::Write;

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The source is being read; the batch size is not known yet.
    Loading { source: String },
    /// One document reached a terminal state. `done` counts settled
    /// documents, which arrive in completion order rather than input order.
    Settled {
        done: u64,
        total: u64,
        url: String,
        status: &'static str,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// `[  3/120] persisted  https://...`
pub struct StderrProgress;

impl StderrProgress {
    fn line(event: &ProgressEvent) -> String {
        match event {
            ProgressEvent::Loading { source } => format!("loading {}", source),
            ProgressEvent::Settled {
                done,
                total,
                url,
                status,
            } => {
                let width = total.to_string().len();
                format!("[{:>width$}/{}] {:<9}  {}", done, total, status, url)
            }
        }
    }
}

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", Self::line(&event));
    }
}

/// One JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
