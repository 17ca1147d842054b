use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::backend::common::errors::{CoreError, CoreResult};
use crate::workspace::canonical_path_key;

/// A persisted Assistant conversation that can be resumed. The descriptor
/// is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeEntry {
    pub resume_descriptor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_prompt: Option<String>,
    pub message_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// External index of persisted Assistant sessions for a project directory.
#[async_trait]
pub trait AssistantSessionIndex: Send + Sync {
    async fn list_sessions(&self, project_path: &Path) -> CoreResult<Vec<ResumeEntry>>;
}

/// Per-project cache in front of an [`AssistantSessionIndex`].
pub struct ResumeIndex {
    source: Arc<dyn AssistantSessionIndex>,
    entries: Mutex<HashMap<String, Vec<ResumeEntry>>>,
}

impl ResumeIndex {
    pub fn new(source: Arc<dyn AssistantSessionIndex>) -> Self {
        ResumeIndex {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Asks the Assistant runtime again and replaces the cached list.
    pub async fn rebuild(&self, project_path: &str) -> CoreResult<Vec<ResumeEntry>> {
        let path = Path::new(project_path);
        let entries = self.source.list_sessions(path).await?;
        tracing::debug!(path = project_path, count = entries.len(), "resume_index.rebuild.done");
        self.lock_entries()
            .insert(canonical_path_key(path), entries.clone());
        Ok(entries)
    }

    /// Last rebuilt list; empty until the first rebuild.
    pub fn cached(&self, project_path: &str) -> Vec<ResumeEntry> {
        self.lock_entries()
            .get(&canonical_path_key(Path::new(project_path)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn forget(&self, project_path: &str) {
        self.lock_entries()
            .remove(&canonical_path_key(Path::new(project_path)));
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Vec<ResumeEntry>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reads the Assistant CLI's per-project session directory. Each
/// `<descriptor>.jsonl` file is one conversation; only file metadata and
/// line counts are used.
pub struct DirectorySessionIndex {
    projects_root: PathBuf,
}

impl DirectorySessionIndex {
    pub fn new(projects_root: PathBuf) -> Self {
        DirectorySessionIndex { projects_root }
    }

    pub fn project_dir(&self, project_path: &Path) -> PathBuf {
        self.projects_root.join(encode_project_dir(project_path))
    }
}

/// The Assistant CLI names a project's directory after its path with every
/// non-alphanumeric character replaced by `-`.
pub(crate) fn encode_project_dir(project_path: &Path) -> String {
    project_path
        .display()
        .to_string()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect()
}

#[async_trait]
impl AssistantSessionIndex for DirectorySessionIndex {
    async fn list_sessions(&self, project_path: &Path) -> CoreResult<Vec<ResumeEntry>> {
        let directory = self.project_dir(project_path);
        tokio::task::spawn_blocking(move || scan_session_directory(&directory))
            .await
            .map_err(|error| CoreError::external("Session index scan failed", error))?
    }
}

fn scan_session_directory(directory: &Path) -> CoreResult<Vec<ResumeEntry>> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
            continue;
        }
        let Some(descriptor) = path.file_stem().map(|stem| stem.to_string_lossy().to_string()) else {
            continue;
        };

        let modified = entry
            .metadata()
            .ok()
            .and_then(|metadata| metadata.modified().ok())
            .map(OffsetDateTime::from);
        let message_count = fs::File::open(path)
            .map(|file| {
                BufReader::new(file)
                    .lines()
                    .map_while(Result::ok)
                    .filter(|line| !line.trim().is_empty())
                    .count() as u32
            })
            .unwrap_or(0);

        found.push((modified, ResumeEntry {
            resume_descriptor: descriptor,
            summary: None,
            first_prompt: None,
            message_count,
            modified_at: modified.and_then(|value| value.format(&Rfc3339).ok()),
        }));
    }

    found.sort_by(|left, right| right.0.cmp(&left.0));
    Ok(found.into_iter().map(|(_, entry)| entry).collect())
}
