use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::project_types::ProjectType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    pub fn new(id: &str, name: &str, path: &str, project_type: ProjectType) -> Self {
        Project {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            project_type,
            folder_id: None,
            color: None,
            icon: None,
            dev_command: None,
            run_command: None,
            created_at: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Folder {
    pub fn new(id: &str, name: &str, parent_id: Option<&str>) -> Self {
        Folder {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            collapsed: false,
            color: None,
            children: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// The persisted projects document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsDocument {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub root_order: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields accepted by `create_project`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub dev_command: Option<String>,
    #[serde(default)]
    pub run_command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Project,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Folder => "folder",
            ItemKind::Project => "project",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Before,
    After,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = serde_json::json!({
            "folders": [{ "id": "f1", "name": "Work", "parentId": null, "children": [], "pinned": true }],
            "projects": [{ "id": "p1", "name": "api", "path": "/repo/api", "type": "api", "folderId": "f1", "lastOpened": 42 }],
            "rootOrder": ["f1"],
            "schemaVersion": 3
        });
        let document: ProjectsDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(document.projects[0].extra.get("lastOpened"), Some(&serde_json::json!(42)));

        let encoded = serde_json::to_value(&document).unwrap();
        assert_eq!(encoded["schemaVersion"], 3);
        assert_eq!(encoded["folders"][0]["pinned"], true);
        assert_eq!(encoded["projects"][0]["lastOpened"], 42);
        assert_eq!(encoded["projects"][0]["type"], "api");
    }

    #[test]
    fn root_projects_serialize_null_folder_id() {
        let project = Project::new("p1", "api", "/repo/api", ProjectType::Standalone);
        let encoded = serde_json::to_value(&project).unwrap();
        assert_eq!(encoded["folderId"], serde_json::Value::Null);
        assert!(encoded.get("color").is_none());
    }
}
