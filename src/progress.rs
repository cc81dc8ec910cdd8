//! Index build progress reporting.
//!
//! The builder emits a [`BuildProgressEvent`] while listing, for every file
//! it processes, and once at the end. The CLI prints them on **stderr** so
//! stdout stays parseable; the HTTP server feeds them into the
//! [`BuildTracker`](crate::status::BuildTracker) that backs the status and
//! event-stream endpoints.

use std::io::Write;

/// A single progress event for an index build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProgressEvent {
    /// Enumerating source documents. Total unknown.
    Listing,
    /// File `current` of `total` (1-based) is done.
    Processing {
        current: u64,
        total: u64,
        file: String,
        message: String,
    },
    /// The index was written.
    Complete { indexed: u64, scanned: u64 },
    /// The build aborted; the previous index is still in place.
    Failed { message: String },
}

/// Receives build progress. Called from the builder task.
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build  processing  12 / 1,250  report.pdf: 4 pages".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Listing => "build  listing documents...\n".to_string(),
            BuildProgressEvent::Processing {
                current,
                total,
                message,
                ..
            } => format!(
                "build  processing  {} / {}  {}\n",
                format_number(*current),
                format_number(*total),
                message
            ),
            BuildProgressEvent::Complete { indexed, scanned } => format!(
                "build  complete  {} of {} files indexed\n",
                format_number(*indexed),
                format_number(*scanned)
            ),
            BuildProgressEvent::Failed { message } => format!("build  failed  {}\n", message),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Listing => serde_json::json!({
                "event": "progress",
                "phase": "listing"
            }),
            BuildProgressEvent::Processing {
                current,
                total,
                file,
                message,
            } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "progress": current,
                "total": total,
                "file": file,
                "message": message
            }),
            BuildProgressEvent::Complete { indexed, scanned } => serde_json::json!({
                "event": "complete",
                "indexed": indexed,
                "scanned": scanned
            }),
            BuildProgressEvent::Failed { message } => serde_json::json!({
                "event": "error",
                "message": message
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
