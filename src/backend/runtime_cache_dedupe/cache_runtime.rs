use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::cache_scope::is_fresh;
use crate::backend::git_workspace_engine::snapshot::GitStatusSnapshot;

struct StatusCacheEntry {
    snapshot: GitStatusSnapshot,
    refreshed_at: Instant,
}

#[derive(Default)]
struct StatusCacheState {
    entries: HashMap<String, StatusCacheEntry>,
    refreshing: HashSet<String>,
}

/// Last known Git status per project id. Reads may be stale; refreshes are
/// deduplicated so one project never has two refreshes in flight.
#[derive(Default)]
pub struct GitStatusCache {
    state: Mutex<StatusCacheState>,
}

impl GitStatusCache {
    pub fn new() -> Self {
        GitStatusCache::default()
    }

    pub fn get(&self, project_id: &str) -> Option<GitStatusSnapshot> {
        self.lock_state()
            .entries
            .get(project_id)
            .map(|entry| entry.snapshot.clone())
    }

    pub fn is_fresh(&self, project_id: &str, ttl: Duration) -> bool {
        self.lock_state()
            .entries
            .get(project_id)
            .is_some_and(|entry| is_fresh(entry.refreshed_at, ttl))
    }

    pub fn store(&self, project_id: &str, snapshot: GitStatusSnapshot) {
        self.lock_state().entries.insert(
            project_id.to_string(),
            StatusCacheEntry {
                snapshot,
                refreshed_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, project_id: &str) {
        self.lock_state().entries.remove(project_id);
    }

    /// Claims the refresh slot for `project_id`. Returns `false` when a
    /// refresh is already running.
    pub fn begin_refresh(&self, project_id: &str) -> bool {
        self.lock_state().refreshing.insert(project_id.to_string())
    }

    pub fn end_refresh(&self, project_id: &str) {
        self.lock_state().refreshing.remove(project_id);
    }

    fn lock_state(&self) -> MutexGuard<'_, StatusCacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
