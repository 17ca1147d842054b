use std::collections::HashSet;

use crate::backend::common::errors::{CoreError, CoreResult};

/// Files picked for the next commit, tracked by path. Lives only in memory
/// and never touches the Git index until a commit runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingSelection {
    /// Paths of the latest status snapshot, in snapshot order.
    known: Vec<String>,
    selected: HashSet<String>,
}

impl StagingSelection {
    /// Adopts a fresh snapshot's file list and drops selected paths that are
    /// no longer present.
    pub fn reconcile(&mut self, paths: impl IntoIterator<Item = String>) {
        self.known = paths.into_iter().collect();
        let known = self.known.iter().collect::<HashSet<_>>();
        self.selected.retain(|path| known.contains(path));
    }

    pub fn select(&mut self, path: &str) -> CoreResult<()> {
        if !self.known.iter().any(|known| known == path) {
            return Err(CoreError::not_found("changed file", path));
        }
        self.selected.insert(path.to_string());
        Ok(())
    }

    pub fn deselect(&mut self, path: &str) {
        self.selected.remove(path);
    }

    pub fn select_all(&mut self) {
        self.selected = self.known.iter().cloned().collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.selected.contains(path)
    }

    /// Selected paths in snapshot order.
    pub fn selected(&self) -> Vec<String> {
        self.known
            .iter()
            .filter(|path| self.selected.contains(*path))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
