//! Bounded in-memory event log with an optional JSONL mirror written off
//! the request path.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use buddy_common::{BuddyError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Routing decision for a turn
    Route,
    /// Completed turn with its timing
    Turn,
    /// A side effect was applied
    SideEffect,
    Warning,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Route => "route",
            EventType::Turn => "turn",
            EventType::SideEffect => "side_effect",
            EventType::Warning => "warning",
            EventType::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,

    pub event_type: EventType,

    /// Error/warning kind (e.g. `unknown_mode`); absent for info events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub trace_id: String,

    #[serde(default)]
    pub fields: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

/// Lines the mirror buffers before new ones are dropped.
const MIRROR_BUFFER_LINES: usize = 4096;

/// JSONL copy of every event, written by a background worker thread. A full
/// buffer drops lines rather than making the caller wait.
enum Mirror {
    Off,
    On {
        writer: NonBlocking,
        _guard: WorkerGuard,
    },
    Unavailable(String),
}

impl Mirror {
    fn open(path: &Path) -> Self {
        match Self::writer_for(path) {
            Ok(appender) => {
                let (writer, guard) = NonBlockingBuilder::default()
                    .lossy(true)
                    .buffered_lines_limit(MIRROR_BUFFER_LINES)
                    .thread_name("buddy-event-log")
                    .finish(appender);
                Mirror::On {
                    writer,
                    _guard: guard,
                }
            }
            Err(e) => {
                let reason = format!("{}: {e}", path.display());
                warn!(%reason, "Event log file unavailable; events stay in memory only");
                Mirror::Unavailable(reason)
            }
        }
    }

    fn writer_for(path: &Path) -> Result<RollingFileAppender> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BuddyError::SinkFailure("event log path has no file name".into()))?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        if path.is_dir() {
            return Err(BuddyError::SinkFailure("path is a directory".into()));
        }
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(dir)
            .map_err(|e| BuddyError::SinkFailure(e.to_string()))
    }

    /// Hand a line to the worker. Only a vanished worker or a mirror that
    /// never opened is an error; buffer overflow is counted separately.
    fn send(&self, line: &str) -> Option<BuddyError> {
        match self {
            Mirror::Off => None,
            Mirror::On { writer, .. } => {
                let mut writer = writer.clone();
                writer
                    .write_all(format!("{line}\n").as_bytes())
                    .err()
                    .map(|e| BuddyError::SinkFailure(format!("event log worker: {e}")))
            }
            Mirror::Unavailable(reason) => Some(BuddyError::SinkFailure(reason.clone())),
        }
    }

    fn dropped_lines(&self) -> u64 {
        match self {
            Mirror::On { writer, .. } => writer.error_counter().dropped_lines() as u64,
            _ => 0,
        }
    }
}

/// Append-only ring of the most recent events.
pub struct EventLog {
    events: Mutex<VecDeque<Event>>,
    max_events: usize,
    next_id: AtomicU64,
    mirror: Mirror,
}

impl EventLog {
    /// With `file`, events are also mirrored as JSON lines. Pending lines
    /// are flushed when the log is dropped.
    pub fn new(max_events: usize, file: Option<PathBuf>) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events: max_events.max(1),
            next_id: AtomicU64::new(1),
            mirror: file.map_or(Mirror::Off, |path| Mirror::open(&path)),
        }
    }

    /// Append an event. Returns the stored copy and any mirroring error so
    /// the caller can count it. Never waits on file I/O.
    pub fn append(
        &self,
        event_type: EventType,
        kind: Option<String>,
        trace_id: &str,
        fields: serde_json::Value,
    ) -> (Event, Option<BuddyError>) {
        let event = Event {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            event_type,
            kind,
            trace_id: trace_id.to_string(),
            fields,
            timestamp: Utc::now(),
        };

        {
            let mut events = self.events.lock();
            events.push_back(event.clone());
            while events.len() > self.max_events {
                events.pop_front();
            }
        }

        let mirror_error = match &self.mirror {
            Mirror::Off => None,
            mirror => match serde_json::to_string(&event) {
                Ok(line) => mirror.send(&line),
                Err(e) => Some(BuddyError::SinkFailure(e.to_string())),
            },
        };
        (event, mirror_error)
    }

    /// Lines the mirror dropped because its buffer was full.
    pub fn dropped_lines(&self) -> u64 {
        self.mirror.dropped_lines()
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.events.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recent_newest_first_and_bounded() {
        let log = EventLog::new(3, None);
        for i in 0..5 {
            log.append(EventType::Route, None, &format!("t{i}"), json!({}));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        let traces: Vec<_> = recent.iter().map(|e| e.trace_id.as_str()).collect();
        assert_eq!(traces, vec!["t4", "t3", "t2"]);
        assert!(recent[0].id > recent[1].id);
    }

    #[test]
    fn test_jsonl_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let log = EventLog::new(10, Some(path.clone()));

        let (_, err) = log.append(
            EventType::Warning,
            Some("unknown_mode".into()),
            "abc",
            json!({"value": "doesnotexist"}),
        );
        assert!(err.is_none());
        log.append(EventType::Route, None, "abc", json!({"mode": "general"}));
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Event = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event_type, EventType::Warning);
        assert_eq!(first.kind.as_deref(), Some("unknown_mode"));
    }

    #[test]
    fn test_unwritable_file_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let log = EventLog::new(10, Some(dir.path().to_path_buf()));
        let (event, err) = log.append(EventType::Error, Some("x".into()), "t", json!({}));
        assert!(matches!(err, Some(BuddyError::SinkFailure(_))));
        assert_eq!(event.trace_id, "t");
        assert_eq!(log.len(), 1);
        assert_eq!(log.dropped_lines(), 0);
    }

    #[test]
    fn test_burst_is_either_written_or_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::new(16, Some(path.clone()));

        let started = std::time::Instant::now();
        for i in 0..10_000 {
            let (_, err) = log.append(EventType::Turn, None, &format!("t{i}"), json!({"i": i}));
            assert!(err.is_none());
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        let dropped = log.dropped_lines();
        drop(log);
        let written = std::fs::read_to_string(&path).unwrap().lines().count() as u64;
        assert_eq!(written + dropped, 10_000);
    }
}
