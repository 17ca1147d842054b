use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::backend::common::dtos::SessionKind;
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::pty_terminal_sessions::terminal_view::SessionObserver;
use crate::backend::session_registry::session::Session;

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// One closed activity window, stored as a line of `time-tracking.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRecord {
    pub project_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_secs: u64,
}

struct OpenWindow {
    started_at: OffsetDateTime,
    sessions: usize,
}

#[derive(Default)]
struct TrackerState {
    /// Live assistant session id -> owning project id.
    sessions: HashMap<String, String>,
    windows: HashMap<String, OpenWindow>,
}

/// Measures how long each project has at least one Assistant session alive.
pub struct TimeTracker {
    log_path: PathBuf,
    clock: Clock,
    state: Mutex<TrackerState>,
}

impl TimeTracker {
    pub fn new(log_path: PathBuf) -> Self {
        TimeTracker::with_clock(log_path, Arc::new(OffsetDateTime::now_utc))
    }

    pub fn with_clock(log_path: PathBuf, clock: Clock) -> Self {
        TimeTracker {
            log_path,
            clock,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Projects with an open window right now.
    pub fn active_projects(&self) -> Vec<String> {
        let mut ids = self.lock_state().windows.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn records(&self) -> CoreResult<Vec<TimeRecord>> {
        read_records(&self.log_path)
    }

    /// Seconds per project across every closed window.
    pub fn totals(&self) -> CoreResult<BTreeMap<String, u64>> {
        let mut totals = BTreeMap::new();
        for record in self.records()? {
            *totals.entry(record.project_id).or_insert(0) += record.duration_secs;
        }
        Ok(totals)
    }

    /// Like `totals`, counting only the part of each window after `since`.
    pub fn totals_since(&self, since: OffsetDateTime) -> CoreResult<BTreeMap<String, u64>> {
        let mut totals = BTreeMap::new();
        for record in self.records()? {
            let (Ok(started), Ok(ended)) = (
                OffsetDateTime::parse(&record.started_at, &Rfc3339),
                OffsetDateTime::parse(&record.ended_at, &Rfc3339),
            ) else {
                tracing::warn!(project_id = %record.project_id, "time.record.bad_timestamp");
                continue;
            };
            if ended <= since {
                continue;
            }
            let counted = (ended - started.max(since)).whole_seconds().max(0) as u64;
            *totals.entry(record.project_id).or_insert(0) += counted;
        }
        Ok(totals)
    }

    fn session_started(&self, session_id: &str, project_id: &str) {
        let now = (self.clock)();
        let mut state = self.lock_state();
        if state
            .sessions
            .insert(session_id.to_string(), project_id.to_string())
            .is_some()
        {
            return;
        }
        let window = state
            .windows
            .entry(project_id.to_string())
            .or_insert_with(|| OpenWindow {
                started_at: now,
                sessions: 0,
            });
        window.sessions += 1;
        if window.sessions == 1 {
            tracing::debug!(project_id, "time.window.opened");
        }
    }

    fn session_ended(&self, session_id: &str) {
        let now = (self.clock)();
        let closed = {
            let mut state = self.lock_state();
            let Some(project_id) = state.sessions.remove(session_id) else {
                return;
            };
            let Some(window) = state.windows.get_mut(&project_id) else {
                return;
            };
            window.sessions = window.sessions.saturating_sub(1);
            if window.sessions > 0 {
                return;
            }
            state
                .windows
                .remove(&project_id)
                .map(|window| close_window(project_id, window.started_at, now))
        };

        if let Some(record) = closed {
            tracing::info!(
                project_id = %record.project_id,
                duration_secs = record.duration_secs,
                "time.window.closed"
            );
            if let Err(error) = append_record(&self.log_path, &record) {
                tracing::warn!(%error, path = %self.log_path.display(), "time.persist.failed");
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionObserver for TimeTracker {
    fn on_started(&self, session: &Session) {
        if session.kind() == SessionKind::Assistant {
            self.session_started(session.id(), &session.project_ref().project_id);
        }
    }

    fn on_exit(&self, session_id: &str, _exit_code: Option<i32>) {
        self.session_ended(session_id);
    }

    fn on_closed(&self, session_id: &str) {
        self.session_ended(session_id);
    }
}

fn close_window(project_id: String, started_at: OffsetDateTime, ended_at: OffsetDateTime) -> TimeRecord {
    TimeRecord {
        project_id,
        started_at: format_timestamp(started_at),
        ended_at: format_timestamp(ended_at),
        duration_secs: (ended_at - started_at).whole_seconds().max(0) as u64,
    }
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn append_record(path: &Path, record: &TimeRecord) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(record)
        .map_err(|error| CoreError::Persistence(format!("Failed to serialize time record: {error}")))?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Unparseable lines are skipped so one bad write never hides the rest.
fn read_records(path: &Path) -> CoreResult<Vec<TimeRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(error) => tracing::warn!(%error, "time.record.unparseable"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::session_registry::session::test_session;
    use std::time::Duration;

    struct ManualClock(Mutex<OffsetDateTime>);

    impl ManualClock {
        fn advance(&self, seconds: u64) {
            *self.0.lock().unwrap() += Duration::from_secs(seconds);
        }
    }

    fn tracker(dir: &Path) -> (TimeTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock(Mutex::new(OffsetDateTime::UNIX_EPOCH)));
        let source = clock.clone();
        let tracker = TimeTracker::with_clock(
            dir.join("time-tracking.jsonl"),
            Arc::new(move || *source.0.lock().unwrap()),
        );
        (tracker, clock)
    }

    #[test]
    fn window_spans_first_start_to_last_exit() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, clock) = tracker(dir.path());
        let first = test_session("s1", "p1", "/repo/p1", SessionKind::Assistant);
        let second = test_session("s2", "p1", "/repo/p1", SessionKind::Assistant);

        tracker.on_started(&first);
        clock.advance(60);
        tracker.on_started(&second);
        clock.advance(60);
        tracker.on_exit("s1", Some(0));
        assert_eq!(tracker.active_projects(), vec!["p1".to_string()]);
        clock.advance(30);
        tracker.on_closed("s2");

        assert!(tracker.active_projects().is_empty());
        let records = tracker.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_secs, 150);
        assert_eq!(records[0].started_at, "1970-01-01T00:00:00Z");
        assert_eq!(tracker.totals().unwrap().get("p1"), Some(&150));
    }

    #[test]
    fn ignores_non_assistant_sessions_and_repeat_ends() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, clock) = tracker(dir.path());
        tracker.on_started(&test_session("plain", "p1", "/repo/p1", SessionKind::Plain));
        tracker.on_started(&test_session("s1", "p2", "/repo/p2", SessionKind::Assistant));
        clock.advance(10);
        tracker.on_exit("plain", Some(0));
        tracker.on_exit("s1", Some(0));
        tracker.on_closed("s1");

        let totals = tracker.totals().unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals.get("p2"), Some(&10));
    }

    #[test]
    fn totals_since_clips_windows() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, clock) = tracker(dir.path());
        tracker.on_started(&test_session("s1", "p1", "/repo/p1", SessionKind::Assistant));
        clock.advance(100);
        tracker.on_exit("s1", None);

        let since = OffsetDateTime::UNIX_EPOCH + Duration::from_secs(40);
        assert_eq!(tracker.totals_since(since).unwrap().get("p1"), Some(&60));
        let later = OffsetDateTime::UNIX_EPOCH + Duration::from_secs(500);
        assert!(tracker.totals_since(later).unwrap().is_empty());
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time-tracking.jsonl");
        fs::write(
            &path,
            "garbage\n{\"projectId\":\"p1\",\"startedAt\":\"1970-01-01T00:00:00Z\",\"endedAt\":\"1970-01-01T00:00:05Z\",\"durationSecs\":5}\n",
        )
        .unwrap();
        let tracker = TimeTracker::new(path);
        assert_eq!(tracker.totals().unwrap().get("p1"), Some(&5));
    }
}
