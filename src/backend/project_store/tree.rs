use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::document::{DropPosition, Folder, ItemKind, Project, ProjectsDocument};
use crate::backend::common::errors::{CoreError, CoreResult};

/// Id-indexed arena for the project/folder tree.
///
/// Each item's parent pointer (`folder_id` / `parent_id`) is authoritative;
/// `root_order` and every `Folder::children` list are kept as the ordered,
/// disjoint partition of all ids that matches those pointers.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProjectTree {
    projects: HashMap<String, Project>,
    folders: HashMap<String, Folder>,
    project_order: Vec<String>,
    folder_order: Vec<String>,
    root_order: Vec<String>,
    extra: Map<String, Value>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RepairReport {
    pub dropped_duplicate_ids: usize,
    pub detached_dangling_parents: usize,
    pub broken_cycles: usize,
    pub reordered_containers: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == RepairReport::default()
    }
}

impl ProjectTree {
    /// Builds the arena from a document, repairing anything that would break
    /// the partition or acyclicity invariants.
    pub fn from_document(document: ProjectsDocument) -> (Self, RepairReport) {
        let mut report = RepairReport::default();
        let mut tree = ProjectTree {
            extra: document.extra,
            ..ProjectTree::default()
        };
        let mut listed_children = HashMap::new();

        for mut folder in document.folders {
            if tree.folders.contains_key(&folder.id) || tree.projects.contains_key(&folder.id) {
                report.dropped_duplicate_ids += 1;
                continue;
            }
            listed_children.insert(folder.id.clone(), std::mem::take(&mut folder.children));
            tree.folder_order.push(folder.id.clone());
            tree.folders.insert(folder.id.clone(), folder);
        }
        for project in document.projects {
            if tree.folders.contains_key(&project.id) || tree.projects.contains_key(&project.id) {
                report.dropped_duplicate_ids += 1;
                continue;
            }
            tree.project_order.push(project.id.clone());
            tree.projects.insert(project.id.clone(), project);
        }

        for folder_id in tree.folder_order.clone() {
            let dangling = tree
                .folders
                .get(&folder_id)
                .and_then(|folder| folder.parent_id.as_ref())
                .is_some_and(|parent| !tree.folders.contains_key(parent) || *parent == folder_id);
            if dangling {
                if let Some(folder) = tree.folders.get_mut(&folder_id) {
                    folder.parent_id = None;
                }
                report.detached_dangling_parents += 1;
            }
        }
        for project_id in tree.project_order.clone() {
            if let Some(project) = tree.projects.get_mut(&project_id) {
                if project
                    .folder_id
                    .as_ref()
                    .is_some_and(|parent| !tree.folders.contains_key(parent))
                {
                    project.folder_id = None;
                    report.detached_dangling_parents += 1;
                }
            }
        }

        for folder_id in tree.folder_order.clone() {
            if tree.parent_chain_cycles(&folder_id) {
                if let Some(folder) = tree.folders.get_mut(&folder_id) {
                    folder.parent_id = None;
                }
                report.broken_cycles += 1;
            }
        }

        let rebuilt_root = tree.rebuild_container(None, &document.root_order);
        if rebuilt_root != document.root_order {
            report.reordered_containers += 1;
        }
        tree.root_order = rebuilt_root;
        for folder_id in tree.folder_order.clone() {
            let listed = listed_children.remove(&folder_id).unwrap_or_default();
            let rebuilt = tree.rebuild_container(Some(&folder_id), &listed);
            if rebuilt != listed {
                report.reordered_containers += 1;
            }
            if let Some(folder) = tree.folders.get_mut(&folder_id) {
                folder.children = rebuilt;
            }
        }

        (tree, report)
    }

    pub fn to_document(&self) -> ProjectsDocument {
        ProjectsDocument {
            folders: self
                .folder_order
                .iter()
                .filter_map(|id| self.folders.get(id).cloned())
                .collect(),
            projects: self
                .project_order
                .iter()
                .filter_map(|id| self.projects.get(id).cloned())
                .collect(),
            root_order: self.root_order.clone(),
            extra: self.extra.clone(),
        }
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    pub fn project_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.get_mut(id)
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn folder_mut(&mut self, id: &str) -> Option<&mut Folder> {
        self.folders.get_mut(id)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.project_order
            .iter()
            .filter_map(|id| self.projects.get(id))
    }

    pub fn root_order(&self) -> &[String] {
        &self.root_order
    }

    pub fn contains(&self, kind: ItemKind, id: &str) -> bool {
        match kind {
            ItemKind::Folder => self.folders.contains_key(id),
            ItemKind::Project => self.projects.contains_key(id),
        }
    }

    pub fn kind_of(&self, id: &str) -> Option<ItemKind> {
        if self.folders.contains_key(id) {
            Some(ItemKind::Folder)
        } else if self.projects.contains_key(id) {
            Some(ItemKind::Project)
        } else {
            None
        }
    }

    /// Container holding `id`: `None` is the root.
    pub fn container_of(&self, kind: ItemKind, id: &str) -> Option<Option<String>> {
        match kind {
            ItemKind::Folder => self.folders.get(id).map(|folder| folder.parent_id.clone()),
            ItemKind::Project => self.projects.get(id).map(|project| project.folder_id.clone()),
        }
    }

    /// Project ids inside `folder_id`, at any depth.
    pub fn projects_in_subtree(&self, folder_id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut pending = vec![folder_id.to_string()];
        while let Some(current) = pending.pop() {
            let Some(folder) = self.folders.get(&current) else {
                continue;
            };
            for child in &folder.children {
                match self.kind_of(child) {
                    Some(ItemKind::Folder) => pending.push(child.clone()),
                    Some(ItemKind::Project) => found.push(child.clone()),
                    None => {}
                }
            }
        }
        found
    }

    /// True when `candidate` is `folder_id` itself or sits anywhere beneath it.
    pub fn is_within_folder(&self, folder_id: &str, candidate: &str) -> bool {
        let mut cursor = Some(candidate.to_string());
        let mut visited = HashSet::new();
        while let Some(current) = cursor {
            if current == folder_id {
                return true;
            }
            if !visited.insert(current.clone()) {
                return false;
            }
            cursor = self
                .folders
                .get(&current)
                .and_then(|folder| folder.parent_id.clone());
        }
        false
    }

    pub fn insert_folder(&mut self, mut folder: Folder) -> CoreResult<()> {
        self.ensure_container(folder.parent_id.as_deref())?;
        folder.children.clear();
        let parent = folder.parent_id.clone();
        let id = folder.id.clone();
        self.folder_order.push(id.clone());
        self.folders.insert(id.clone(), folder);
        self.attach(parent.as_deref(), id, None);
        Ok(())
    }

    pub fn insert_project(&mut self, project: Project) -> CoreResult<()> {
        self.ensure_container(project.folder_id.as_deref())?;
        let parent = project.folder_id.clone();
        let id = project.id.clone();
        self.project_order.push(id.clone());
        self.projects.insert(id.clone(), project);
        self.attach(parent.as_deref(), id, None);
        Ok(())
    }

    pub fn move_item(&mut self, kind: ItemKind, id: &str, target: Option<&str>) -> CoreResult<()> {
        let current = self
            .container_of(kind, id)
            .ok_or_else(|| CoreError::not_found(kind.as_str(), id))?;
        self.ensure_container(target)?;
        self.ensure_acyclic(kind, id, target)?;

        self.detach(current.as_deref(), id);
        self.set_parent(kind, id, target);
        self.attach(target, id.to_string(), None);
        Ok(())
    }

    pub fn reorder_item(
        &mut self,
        kind: ItemKind,
        id: &str,
        target_id: &str,
        position: DropPosition,
    ) -> CoreResult<()> {
        let current = self
            .container_of(kind, id)
            .ok_or_else(|| CoreError::not_found(kind.as_str(), id))?;
        let target_kind = self
            .kind_of(target_id)
            .ok_or_else(|| CoreError::not_found("item", target_id))?;
        if target_id == id {
            return Ok(());
        }
        let target_container = self
            .container_of(target_kind, target_id)
            .ok_or_else(|| CoreError::not_found(target_kind.as_str(), target_id))?;
        self.ensure_acyclic(kind, id, target_container.as_deref())?;

        self.detach(current.as_deref(), id);
        self.set_parent(kind, id, target_container.as_deref());
        let anchor = self
            .children(target_container.as_deref())
            .iter()
            .position(|entry| entry == target_id);
        let index = anchor.map(|index| match position {
            DropPosition::Before => index,
            DropPosition::After => index + 1,
        });
        self.attach(target_container.as_deref(), id.to_string(), index);
        Ok(())
    }

    /// Removes the folder and lifts its direct children into its parent
    /// container, appended in their existing order.
    pub fn delete_folder(&mut self, id: &str) -> CoreResult<Folder> {
        let folder = self
            .folders
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("folder", id))?;
        let parent = folder.parent_id.clone();

        self.detach(parent.as_deref(), id);
        for child in &folder.children {
            if let Some(kind) = self.kind_of(child) {
                self.set_parent(kind, child, parent.as_deref());
                self.attach(parent.as_deref(), child.clone(), None);
            }
        }
        self.folders.remove(id);
        self.folder_order.retain(|entry| entry != id);
        Ok(folder)
    }

    pub fn delete_project(&mut self, id: &str) -> CoreResult<Project> {
        let project = self
            .projects
            .remove(id)
            .ok_or_else(|| CoreError::not_found("project", id))?;
        self.detach(project.folder_id.as_deref(), id);
        self.project_order.retain(|entry| entry != id);
        Ok(project)
    }

    /// Checks the partition and acyclicity invariants.
    pub fn verify(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        let containers = std::iter::once((None, &self.root_order)).chain(
            self.folder_order
                .iter()
                .filter_map(|id| self.folders.get(id))
                .map(|folder| (Some(folder.id.as_str()), &folder.children)),
        );
        for (container, children) in containers {
            for child in children {
                if !seen.insert(child.as_str()) {
                    return Err(format!("id {child} appears more than once"));
                }
                let kind = self
                    .kind_of(child)
                    .ok_or_else(|| format!("id {child} is listed but unknown"))?;
                let parent = self.container_of(kind, child).flatten();
                if parent.as_deref() != container {
                    return Err(format!("id {child} is listed outside its parent"));
                }
            }
        }
        let total = self.folders.len() + self.projects.len();
        if seen.len() != total {
            return Err(format!("{} of {total} ids are listed", seen.len()));
        }
        for id in &self.folder_order {
            if self.parent_chain_cycles(id) {
                return Err(format!("folder {id} is its own ancestor"));
            }
        }
        Ok(())
    }

    fn ensure_container(&self, container: Option<&str>) -> CoreResult<()> {
        match container {
            Some(folder_id) if !self.folders.contains_key(folder_id) => {
                Err(CoreError::not_found("folder", folder_id))
            }
            _ => Ok(()),
        }
    }

    fn ensure_acyclic(&self, kind: ItemKind, id: &str, target: Option<&str>) -> CoreResult<()> {
        match (kind, target) {
            (ItemKind::Folder, Some(target)) if self.is_within_folder(id, target) => {
                Err(CoreError::Cycle {
                    folder_id: id.to_string(),
                    target_id: target.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn parent_chain_cycles(&self, folder_id: &str) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(folder_id.to_string());
        while let Some(current) = cursor {
            if !visited.insert(current.clone()) {
                return true;
            }
            cursor = self
                .folders
                .get(&current)
                .and_then(|folder| folder.parent_id.clone());
        }
        false
    }

    fn children(&self, container: Option<&str>) -> &[String] {
        match container {
            None => &self.root_order,
            Some(folder_id) => self
                .folders
                .get(folder_id)
                .map(|folder| folder.children.as_slice())
                .unwrap_or_default(),
        }
    }

    fn children_mut(&mut self, container: Option<&str>) -> Option<&mut Vec<String>> {
        match container {
            None => Some(&mut self.root_order),
            Some(folder_id) => self.folders.get_mut(folder_id).map(|folder| &mut folder.children),
        }
    }

    fn attach(&mut self, container: Option<&str>, id: String, index: Option<usize>) {
        if let Some(children) = self.children_mut(container) {
            match index {
                Some(index) if index <= children.len() => children.insert(index, id),
                _ => children.push(id),
            }
        }
    }

    fn detach(&mut self, container: Option<&str>, id: &str) {
        if let Some(children) = self.children_mut(container) {
            children.retain(|entry| entry != id);
        }
    }

    fn set_parent(&mut self, kind: ItemKind, id: &str, parent: Option<&str>) {
        let parent = parent.map(str::to_string);
        match kind {
            ItemKind::Folder => {
                if let Some(folder) = self.folders.get_mut(id) {
                    folder.parent_id = parent;
                }
            }
            ItemKind::Project => {
                if let Some(project) = self.projects.get_mut(id) {
                    project.folder_id = parent;
                }
            }
        }
    }

    /// Ordered ids for `container`: the listed order filtered to items whose
    /// parent pointer agrees, then any remaining members in document order.
    fn rebuild_container(&self, container: Option<&str>, listed: &[String]) -> Vec<String> {
        let belongs = |id: &str| {
            self.kind_of(id)
                .and_then(|kind| self.container_of(kind, id))
                .is_some_and(|parent| parent.as_deref() == container)
        };

        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        for id in listed {
            if belongs(id) && seen.insert(id.clone()) {
                ordered.push(id.clone());
            }
        }
        for id in self.folder_order.iter().chain(self.project_order.iter()) {
            if belongs(id) && seen.insert(id.clone()) {
                ordered.push(id.clone());
            }
        }
        ordered
    }
}
