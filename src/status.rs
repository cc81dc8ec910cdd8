//! Live status of the index build.
//!
//! One [`BuildTracker`] is shared by the HTTP server. It holds the single
//! build status record (polled by `GET /index/status`) and fans every
//! update out over a broadcast channel (consumed by `GET /index/events`).
//! At most one build runs at a time: [`BuildTracker::try_start`] refuses
//! while a run is `processing`.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{LibraryError, Result};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Idle,
    Processing,
    Complete,
    Error,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Complete | BuildState::Error)
    }
}

/// The build status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    pub run_id: Option<String>,
    pub status: BuildState,
    pub progress: u64,
    pub total: u64,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub indexed: Option<u64>,
}

impl BuildStatus {
    fn idle() -> Self {
        Self {
            run_id: None,
            status: BuildState::Idle,
            progress: 0,
            total: 0,
            message: "No build has run yet".to_string(),
            started_at: None,
            finished_at: None,
            indexed: None,
        }
    }
}

pub struct BuildTracker {
    current: RwLock<BuildStatus>,
    events: broadcast::Sender<BuildStatus>,
}

impl BuildTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            current: RwLock::new(BuildStatus::idle()),
            events,
        }
    }

    pub fn snapshot(&self) -> BuildStatus {
        match self.current.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Receive every status change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildStatus> {
        self.events.subscribe()
    }

    /// Claim the build slot for a new run and return its id.
    pub fn try_start(&self) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.update(|s| {
            if s.status == BuildState::Processing {
                return Err(LibraryError::BuildInProgress(
                    s.run_id.clone().unwrap_or_default(),
                ));
            }
            *s = BuildStatus {
                run_id: Some(run_id.clone()),
                status: BuildState::Processing,
                progress: 0,
                total: 0,
                message: "Build started".to_string(),
                started_at: Some(Utc::now()),
                finished_at: None,
                indexed: None,
            };
            Ok(())
        })?;
        Ok(run_id)
    }

    /// Mark the running build as failed (e.g. the task panicked).
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let _ = self.update(|s| {
            if s.status == BuildState::Processing {
                s.status = BuildState::Error;
                s.message = message;
                s.finished_at = Some(Utc::now());
            }
            Ok(())
        });
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BuildStatus) -> Result<()>,
    {
        let snapshot = {
            let mut guard = match self.current.write() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            let before = guard.clone();
            f(&mut *guard)?;
            if *guard == before {
                return Ok(());
            }
            guard.clone()
        };
        // No subscribers is fine.
        let _ = self.events.send(snapshot);
        Ok(())
    }
}

impl Default for BuildTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildProgressReporter for BuildTracker {
    fn report(&self, event: BuildProgressEvent) {
        let _ = self.update(|s| {
            if s.status != BuildState::Processing {
                return Ok(());
            }
            match event {
                BuildProgressEvent::Listing => {
                    s.message = "Listing documents".to_string();
                }
                BuildProgressEvent::Processing {
                    current,
                    total,
                    message,
                    ..
                } => {
                    s.progress = current;
                    s.total = total;
                    s.message = message;
                }
                BuildProgressEvent::Complete { indexed, scanned } => {
                    s.status = BuildState::Complete;
                    s.progress = scanned;
                    s.total = scanned;
                    s.indexed = Some(indexed);
                    s.message = format!("Indexed {} of {} documents", indexed, scanned);
                    s.finished_at = Some(Utc::now());
                }
                BuildProgressEvent::Failed { message } => {
                    s.status = BuildState::Error;
                    s.message = message;
                    s.finished_at = Some(Utc::now());
                }
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let tracker = BuildTracker::new();
        let s = tracker.snapshot();
        assert_eq!(s.status, BuildState::Idle);
        assert!(s.run_id.is_none());
    }

    #[test]
    fn second_start_is_rejected_while_processing() {
        let tracker = BuildTracker::new();
        let run = tracker.try_start().unwrap();
        let err = tracker.try_start().unwrap_err();
        assert!(matches!(err, LibraryError::BuildInProgress(ref id) if *id == run));

        tracker.report(BuildProgressEvent::Complete {
            indexed: 1,
            scanned: 1,
        });
        assert!(tracker.try_start().is_ok());
    }

    #[test]
    fn progress_updates_the_record() {
        let tracker = BuildTracker::new();
        tracker.try_start().unwrap();
        tracker.report(BuildProgressEvent::Processing {
            current: 2,
            total: 5,
            file: "b.pdf".into(),
            message: "b.pdf: 3 page(s)".into(),
        });
        let s = tracker.snapshot();
        assert_eq!((s.progress, s.total), (2, 5));
        assert_eq!(s.status, BuildState::Processing);

        tracker.report(BuildProgressEvent::Failed {
            message: "listing failed".into(),
        });
        let s = tracker.snapshot();
        assert_eq!(s.status, BuildState::Error);
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn events_are_ignored_when_not_running() {
        let tracker = BuildTracker::new();
        tracker.report(BuildProgressEvent::Listing);
        assert_eq!(tracker.snapshot().status, BuildState::Idle);
    }

    #[tokio::test]
    async fn subscribers_see_terminal_event() {
        let tracker = BuildTracker::new();
        let mut rx = tracker.subscribe();
        tracker.try_start().unwrap();
        tracker.report(BuildProgressEvent::Complete {
            indexed: 3,
            scanned: 4,
        });
        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, BuildState::Processing);
        let last = rx.recv().await.unwrap();
        assert_eq!(last.status, BuildState::Complete);
        assert_eq!(last.indexed, Some(3));
    }

    #[test]
    fn serializes_camel_case() {
        let tracker = BuildTracker::new();
        tracker.try_start().unwrap();
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["status"], "processing");
        assert!(json["runId"].is_string());
        assert!(json.get("startedAt").is_some());
    }
}
