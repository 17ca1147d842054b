use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use super::document::{DropPosition, Folder, ItemKind, NewProject, Project, ProjectsDocument};
use super::migration::migrate_document;
use super::persistence::{DebouncedJsonWriter, PersistMode};
use super::tree::ProjectTree;
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::common::json_file::{read_json_value, write_json_document};
use crate::backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};
use crate::workspace::{canonical_path_key, normalize_color, normalize_display_name, normalize_project_path};

/// Answers whether a project still owns running sessions or services.
pub trait LiveResourceProbe: Send + Sync {
    fn project_has_live_resources(&self, project_id: &str) -> bool;
}

impl<F> LiveResourceProbe for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn project_has_live_resources(&self, project_id: &str) -> bool {
        self(project_id)
    }
}

#[derive(Default)]
struct StoreState {
    tree: ProjectTree,
    selected_filter: Option<String>,
}

impl StoreState {
    /// Unfocuses a project that is no longer in the tree.
    fn drop_stale_filter(&mut self) -> bool {
        let stale = self
            .selected_filter
            .as_deref()
            .is_some_and(|id| self.tree.project(id).is_none());
        if stale {
            self.selected_filter = None;
        }
        stale
    }
}

/// Owner of the persisted project/folder tree and the focused project.
pub struct ProjectStore {
    state: Mutex<StoreState>,
    document_path: PathBuf,
    writer: Option<DebouncedJsonWriter<ProjectsDocument>>,
    events: EventBus,
}

impl ProjectStore {
    /// Opens the store at `document_path`. A missing or unreadable document
    /// starts an empty tree; the cause is logged.
    pub fn open(document_path: PathBuf, mode: PersistMode, events: EventBus) -> Self {
        let writer = match mode {
            PersistMode::Immediate => None,
            PersistMode::Debounced(debounce) => {
                Some(DebouncedJsonWriter::spawn(document_path.clone(), debounce))
            }
        };
        let store = ProjectStore {
            state: Mutex::new(StoreState::default()),
            document_path,
            writer,
            events,
        };
        if let Err(error) = store.load() {
            tracing::warn!(
                path = %store.document_path.display(),
                %error,
                "store.load.fallback_empty"
            );
        }
        store
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    /// Re-reads the document from disk, migrating legacy shapes. On failure
    /// the tree is reset to empty and the error is returned.
    pub fn load(&self) -> CoreResult<()> {
        let loaded = read_json_value(&self.document_path);
        let tree = match &loaded {
            Ok(Some(raw)) => build_tree(raw.clone()),
            Ok(None) | Err(_) => ProjectTree::default(),
        };

        let filter_cleared = {
            let mut state = self.lock_state();
            state.tree = tree;
            state.drop_stale_filter()
        };
        self.events.emit(CoreEvent::ProjectsChanged { filter_cleared });
        loaded.map(|_| ())
    }

    /// Writes the current document synchronously, bypassing the debounce.
    pub fn save(&self) -> CoreResult<()> {
        let document = self.snapshot();
        write_json_document(&self.document_path, &document)
    }

    /// Forces any debounced write to disk.
    pub async fn flush(&self) -> CoreResult<()> {
        match &self.writer {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> ProjectsDocument {
        self.lock_state().tree.to_document()
    }

    pub fn project(&self, id: &str) -> CoreResult<Project> {
        self.lock_state()
            .tree
            .project(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("project", id))
    }

    pub fn folder(&self, id: &str) -> CoreResult<Folder> {
        self.lock_state()
            .tree
            .folder(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("folder", id))
    }

    pub fn projects(&self) -> Vec<Project> {
        self.lock_state().tree.projects().cloned().collect()
    }

    pub fn project_by_path(&self, path: &str) -> Option<Project> {
        let key = canonical_path_key(Path::new(path));
        self.lock_state()
            .tree
            .projects()
            .find(|project| canonical_path_key(Path::new(&project.path)) == key)
            .cloned()
    }

    pub fn create_folder(&self, name: &str, parent_id: Option<&str>) -> CoreResult<Folder> {
        let name = normalize_display_name(name, "name")?;
        let folder = Folder::new(&Uuid::new_v4().to_string(), &name, parent_id);
        self.mutate(|tree| {
            tree.insert_folder(folder.clone())?;
            Ok(folder.clone())
        })
    }

    pub fn create_project(&self, fields: NewProject) -> CoreResult<Project> {
        let name = normalize_display_name(&fields.name, "name")?;
        let path = normalize_project_path(&fields.path)?;
        let color = normalize_color(fields.color.as_deref())?;

        let mut project = Project::new(&Uuid::new_v4().to_string(), &name, &path, fields.project_type);
        project.folder_id = fields.folder_id;
        project.color = color;
        project.icon = non_empty(fields.icon);
        project.dev_command = non_empty(fields.dev_command);
        project.run_command = non_empty(fields.run_command);
        project.created_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();

        self.mutate(|tree| {
            let duplicate = tree
                .projects()
                .any(|existing| canonical_path_key(Path::new(&existing.path)) == path);
            if duplicate {
                return Err(CoreError::DuplicatePath { path: path.clone() });
            }
            tree.insert_project(project.clone())?;
            Ok(project.clone())
        })
    }

    pub fn rename_project(&self, id: &str, name: &str) -> CoreResult<Project> {
        let name = normalize_display_name(name, "name")?;
        self.update_project(id, |project| project.name = name)
    }

    pub fn recolor_project(&self, id: &str, color: Option<&str>) -> CoreResult<Project> {
        let color = normalize_color(color)?;
        self.update_project(id, |project| project.color = color)
    }

    pub fn set_project_icon(&self, id: &str, icon: Option<&str>) -> CoreResult<Project> {
        let icon = non_empty(icon.map(str::to_string));
        self.update_project(id, |project| project.icon = icon)
    }

    pub fn set_service_commands(
        &self,
        id: &str,
        dev_command: Option<&str>,
        run_command: Option<&str>,
    ) -> CoreResult<Project> {
        let dev_command = non_empty(dev_command.map(str::to_string));
        let run_command = non_empty(run_command.map(str::to_string));
        self.update_project(id, |project| {
            project.dev_command = dev_command;
            project.run_command = run_command;
        })
    }

    pub fn rename_folder(&self, id: &str, name: &str) -> CoreResult<Folder> {
        let name = normalize_display_name(name, "name")?;
        self.update_folder(id, |folder| folder.name = name)
    }

    pub fn recolor_folder(&self, id: &str, color: Option<&str>) -> CoreResult<Folder> {
        let color = normalize_color(color)?;
        self.update_folder(id, |folder| folder.color = color)
    }

    pub fn set_folder_collapsed(&self, id: &str, collapsed: bool) -> CoreResult<Folder> {
        self.update_folder(id, |folder| folder.collapsed = collapsed)
    }

    /// Deletes the folder and lifts its children one level up. Refused while
    /// any project inside it still has live sessions or services.
    pub fn delete_folder(&self, id: &str, probe: &dyn LiveResourceProbe) -> CoreResult<()> {
        let result = self.mutate(|tree| {
            if tree.folder(id).is_none() {
                return Err(CoreError::not_found("folder", id));
            }
            let busy = tree
                .projects_in_subtree(id)
                .iter()
                .any(|project_id| probe.project_has_live_resources(project_id));
            if busy {
                return Err(CoreError::LiveResources { id: id.to_string() });
            }
            tree.delete_folder(id)?;
            Ok(())
        });
        tracing::debug!(folder_id = id, ok = result.is_ok(), "store.folder.delete");
        result
    }

    pub fn delete_project(&self, id: &str, probe: &dyn LiveResourceProbe) -> CoreResult<Project> {
        if probe.project_has_live_resources(id) {
            return Err(CoreError::LiveResources { id: id.to_string() });
        }
        self.mutate_state(|state| {
            let removed = state.tree.delete_project(id)?;
            Ok((removed, state.drop_stale_filter()))
        })
    }

    pub fn move_item(&self, kind: ItemKind, id: &str, target_folder_id: Option<&str>) -> CoreResult<()> {
        self.mutate(|tree| tree.move_item(kind, id, target_folder_id))
    }

    pub fn reorder_item(
        &self,
        kind: ItemKind,
        id: &str,
        target_id: &str,
        position: DropPosition,
    ) -> CoreResult<()> {
        self.mutate(|tree| tree.reorder_item(kind, id, target_id, position))
    }

    pub fn selected_filter(&self) -> Option<Project> {
        let state = self.lock_state();
        state
            .selected_filter
            .as_deref()
            .and_then(|id| state.tree.project(id))
            .cloned()
    }

    /// Focuses one project, or clears focus with `None`. Notifies only when
    /// the focus actually changes.
    pub fn set_selected_filter(&self, project_id: Option<&str>) -> CoreResult<()> {
        let changed = {
            let mut state = self.lock_state();
            if let Some(id) = project_id {
                if state.tree.project(id).is_none() {
                    return Err(CoreError::not_found("project", id));
                }
            }
            let next = project_id.map(str::to_string);
            let changed = state.selected_filter != next;
            state.selected_filter = next;
            changed
        };
        if changed {
            self.events.emit(CoreEvent::SelectedFilter {
                project_id: project_id.map(str::to_string),
            });
        }
        Ok(())
    }

    fn update_project(&self, id: &str, apply: impl FnOnce(&mut Project)) -> CoreResult<Project> {
        self.mutate(|tree| {
            let project = tree
                .project_mut(id)
                .ok_or_else(|| CoreError::not_found("project", id))?;
            apply(project);
            Ok(project.clone())
        })
    }

    fn update_folder(&self, id: &str, apply: impl FnOnce(&mut Folder)) -> CoreResult<Folder> {
        self.mutate(|tree| {
            let folder = tree
                .folder_mut(id)
                .ok_or_else(|| CoreError::not_found("folder", id))?;
            apply(folder);
            Ok(folder.clone())
        })
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut ProjectTree) -> CoreResult<T>) -> CoreResult<T> {
        self.mutate_state(|state| Ok((apply(&mut state.tree)?, false)))
    }

    /// Runs one validated mutation, then notifies once and persists. The
    /// closure reports whether it cleared the focused project and must leave
    /// the state untouched when it returns an error. A persistence failure is
    /// returned after the in-memory change stands.
    fn mutate_state<T>(&self, apply: impl FnOnce(&mut StoreState) -> CoreResult<(T, bool)>) -> CoreResult<T> {
        let (value, filter_cleared, document) = {
            let mut state = self.lock_state();
            let (value, filter_cleared) = apply(&mut state)?;
            debug_assert!(state.tree.verify().is_ok());
            (value, filter_cleared, state.tree.to_document())
        };

        self.events.emit(CoreEvent::ProjectsChanged { filter_cleared });
        match &self.writer {
            Some(writer) => writer.schedule(document),
            None => {
                if let Err(error) = write_json_document(&self.document_path, &document) {
                    tracing::warn!(path = %self.document_path.display(), %error, "store.persist.failed");
                    return Err(error);
                }
            }
        }
        Ok(value)
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn build_tree(raw: Value) -> ProjectTree {
    let (document, dropped) = migrate_document(raw);
    let (tree, report) = ProjectTree::from_document(document);
    if dropped > 0 || !report.is_clean() {
        tracing::warn!(dropped, ?report, "store.load.repaired");
    }

    let mut seen = std::collections::HashMap::new();
    for project in tree.projects() {
        let key = canonical_path_key(Path::new(&project.path));
        if let Some(first) = seen.insert(key.clone(), project.id.clone()) {
            tracing::warn!(
                path = %key,
                first_id = %first,
                duplicate_id = %project.id,
                "store.load.duplicate_path"
            );
        }
    }
    tree
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
}
