use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

use super::document::{Folder, Project, ProjectsDocument};

/// Upgrades any on-disk shape into the current document.
///
/// Legacy files are a bare array of projects. Records missing `id`, `type`
/// or `folderId` get deterministic values so repeated loads of the same file
/// agree. Records that still fail to parse are dropped and counted.
pub(crate) fn migrate_document(raw: Value) -> (ProjectsDocument, usize) {
    let (mut object, legacy) = match raw {
        Value::Array(projects) => {
            let mut object = Map::new();
            object.insert("projects".to_string(), Value::Array(projects));
            (object, true)
        }
        Value::Object(object) => (object, false),
        _ => (Map::new(), false),
    };
    if legacy {
        tracing::info!("store.migrate.legacy_list");
    }

    let raw_folders = take_array(&mut object, "folders");
    let raw_projects = take_array(&mut object, "projects");
    let root_order = take_array(&mut object, "rootOrder")
        .into_iter()
        .filter_map(|entry| entry.as_str().map(str::to_string))
        .collect();

    let mut dropped = 0;
    let mut folders = Vec::new();
    for (index, entry) in raw_folders.into_iter().enumerate() {
        match upgrade_folder(entry, index) {
            Some(folder) => folders.push(folder),
            None => dropped += 1,
        }
    }
    let mut projects = Vec::new();
    for (index, entry) in raw_projects.into_iter().enumerate() {
        match upgrade_project(entry, index) {
            Some(project) => projects.push(project),
            None => dropped += 1,
        }
    }

    (
        ProjectsDocument {
            folders,
            projects,
            root_order,
            extra: object,
        },
        dropped,
    )
}

pub(crate) fn deterministic_id(prefix: &str, seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let hex = digest
        .iter()
        .take(6)
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("{prefix}-{hex}")
}

fn take_array(object: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match object.remove(key) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    }
}

fn has_text(object: &Map<String, Value>, key: &str) -> bool {
    object
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|value| !value.trim().is_empty())
}

fn upgrade_project(entry: Value, index: usize) -> Option<Project> {
    let Value::Object(mut object) = entry else {
        return None;
    };
    let path = object
        .get("path")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())?
        .to_string();

    if !has_text(&object, "id") {
        let id = deterministic_id("project", &format!("{path}#{index}"));
        object.insert("id".to_string(), Value::String(id));
    }
    if !has_text(&object, "name") {
        let name = Path::new(&path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        object.insert("name".to_string(), Value::String(name));
    }
    if !has_text(&object, "type") {
        object.insert("type".to_string(), Value::String("standalone".to_string()));
    }
    object.entry("folderId").or_insert(Value::Null);

    match serde_json::from_value::<Project>(Value::Object(object)) {
        Ok(project) => Some(project),
        Err(error) => {
            tracing::warn!(index, %error, "store.migrate.project_dropped");
            None
        }
    }
}

fn upgrade_folder(entry: Value, index: usize) -> Option<Folder> {
    let Value::Object(mut object) = entry else {
        return None;
    };
    if !has_text(&object, "name") {
        object.insert("name".to_string(), Value::String("Folder".to_string()));
    }
    if !has_text(&object, "id") {
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let id = deterministic_id("folder", &format!("{name}#{index}"));
        object.insert("id".to_string(), Value::String(id));
    }
    object.entry("parentId").or_insert(Value::Null);

    match serde_json::from_value::<Folder>(Value::Object(object)) {
        Ok(folder) => Some(folder),
        Err(error) => {
            tracing::warn!(index, %error, "store.migrate.folder_dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::project_store::project_types::ProjectType;
    use serde_json::json;

    #[test]
    fn legacy_list_becomes_document_with_deterministic_ids() {
        let raw = json!([
            { "name": "api", "path": "/repo/api" },
            { "id": "keep-me", "path": "/repo/web", "type": "webapp" }
        ]);

        let (first, dropped) = migrate_document(raw.clone());
        let (second, _) = migrate_document(raw);
        assert_eq!(dropped, 0);
        assert_eq!(first.projects[0].id, second.projects[0].id);
        assert!(first.projects[0].id.starts_with("project-"));
        assert_eq!(first.projects[0].project_type, ProjectType::Standalone);
        assert_eq!(first.projects[0].folder_id, None);
        assert_eq!(first.projects[1].id, "keep-me");
        assert_eq!(first.projects[1].project_type, ProjectType::Webapp);
    }

    #[test]
    fn fills_missing_names_from_path() {
        let (document, _) = migrate_document(json!({ "projects": [{ "path": "/srv/game-server" }] }));
        assert_eq!(document.projects[0].name, "game-server");
    }

    #[test]
    fn drops_records_without_a_path() {
        let (document, dropped) =
            migrate_document(json!({ "projects": [{ "name": "ghost" }, 7], "folders": [] }));
        assert!(document.projects.is_empty());
        assert_eq!(dropped, 2);
    }

    #[test]
    fn keeps_unknown_top_level_keys() {
        let (document, _) =
            migrate_document(json!({ "projects": [], "rootOrder": [], "theme": "dusk" }));
        assert_eq!(document.extra.get("theme"), Some(&json!("dusk")));
        assert!(!document.extra.contains_key("projects"));
    }

    #[test]
    fn folder_ids_depend_on_name_and_position() {
        let (document, _) =
            migrate_document(json!({ "folders": [{ "name": "Work" }, { "name": "Work" }] }));
        assert_ne!(document.folders[0].id, document.folders[1].id);
        assert_eq!(document.folders[0].id, deterministic_id("folder", "Work#0"));
    }
}
