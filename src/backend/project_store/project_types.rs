use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use super::document::Project;
use crate::backend::common::dtos::ServiceKind;
use crate::backend::common::errors::CoreError;

/// Known project types. Unknown ids read from disk degrade to `Standalone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProjectType {
    #[default]
    Standalone,
    Webapp,
    Fivem,
    Api,
}

impl ProjectType {
    pub const ALL: [ProjectType; 4] = [
        ProjectType::Standalone,
        ProjectType::Webapp,
        ProjectType::Fivem,
        ProjectType::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Standalone => "standalone",
            ProjectType::Webapp => "webapp",
            ProjectType::Fivem => "fivem",
            ProjectType::Api => "api",
        }
    }

    pub fn from_id(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "webapp" => ProjectType::Webapp,
            "fivem" => ProjectType::Fivem,
            "api" => ProjectType::Api,
            _ => ProjectType::Standalone,
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProjectType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ProjectType::from_id).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardField {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub placeholder: &'static str,
}

/// Type-specific behavior the core dispatches on.
pub trait ProjectTypeCapabilities: Send + Sync {
    fn project_type(&self) -> ProjectType;

    fn service_kinds(&self) -> &'static [ServiceKind];

    /// Command used when the project has none configured for `kind`.
    fn default_service_command(&self, project: &Project, kind: ServiceKind) -> Option<String>;

    fn wizard_fields(&self) -> &'static [WizardField] {
        &[]
    }

    fn dashboard_badge(&self) -> Option<&'static str> {
        None
    }

    /// Service kinds whose supervisor state should be forgotten once the
    /// project is gone.
    fn on_delete(&self, _project: &Project) -> Vec<ServiceKind> {
        self.service_kinds().to_vec()
    }
}

struct StandaloneType;
struct WebappType;
struct FivemType;
struct ApiType;

const WEBAPP_FIELDS: [WizardField; 1] = [WizardField {
    key: "devCommand",
    label: "Dev command",
    required: false,
    placeholder: "npm run dev",
}];

const FIVEM_FIELDS: [WizardField; 1] = [WizardField {
    key: "runCommand",
    label: "Server launch command",
    required: false,
    placeholder: "./run.sh +exec server.cfg",
}];

const API_FIELDS: [WizardField; 2] = [
    WizardField {
        key: "devCommand",
        label: "Dev command",
        required: false,
        placeholder: "npm run dev",
    },
    WizardField {
        key: "runCommand",
        label: "Run command",
        required: false,
        placeholder: "cargo run",
    },
];

impl ProjectTypeCapabilities for StandaloneType {
    fn project_type(&self) -> ProjectType {
        ProjectType::Standalone
    }

    fn service_kinds(&self) -> &'static [ServiceKind] {
        &[]
    }

    fn default_service_command(&self, _project: &Project, _kind: ServiceKind) -> Option<String> {
        None
    }
}

impl ProjectTypeCapabilities for WebappType {
    fn project_type(&self) -> ProjectType {
        ProjectType::Webapp
    }

    fn service_kinds(&self) -> &'static [ServiceKind] {
        &[ServiceKind::Dev]
    }

    fn default_service_command(&self, project: &Project, kind: ServiceKind) -> Option<String> {
        if kind != ServiceKind::Dev {
            return None;
        }
        detect_package_script_command(Path::new(&project.path), &["dev", "start", "serve"])
    }

    fn wizard_fields(&self) -> &'static [WizardField] {
        &WEBAPP_FIELDS
    }

    fn dashboard_badge(&self) -> Option<&'static str> {
        Some("web")
    }
}

impl ProjectTypeCapabilities for FivemType {
    fn project_type(&self) -> ProjectType {
        ProjectType::Fivem
    }

    fn service_kinds(&self) -> &'static [ServiceKind] {
        &[ServiceKind::Game]
    }

    fn default_service_command(&self, _project: &Project, kind: ServiceKind) -> Option<String> {
        if kind != ServiceKind::Game {
            return None;
        }
        if cfg!(target_os = "windows") {
            Some("run.cmd +exec server.cfg".to_string())
        } else {
            Some("./run.sh +exec server.cfg".to_string())
        }
    }

    fn wizard_fields(&self) -> &'static [WizardField] {
        &FIVEM_FIELDS
    }

    fn dashboard_badge(&self) -> Option<&'static str> {
        Some("fivem")
    }
}

impl ProjectTypeCapabilities for ApiType {
    fn project_type(&self) -> ProjectType {
        ProjectType::Api
    }

    fn service_kinds(&self) -> &'static [ServiceKind] {
        &[ServiceKind::Api]
    }

    fn default_service_command(&self, project: &Project, kind: ServiceKind) -> Option<String> {
        if kind != ServiceKind::Api {
            return None;
        }
        let root = Path::new(&project.path);
        if let Some(command) = detect_package_script_command(root, &["dev", "start"]) {
            return Some(command);
        }
        if root.join("Cargo.toml").is_file() {
            return Some("cargo run".to_string());
        }
        if root.join("go.mod").is_file() {
            return Some("go run .".to_string());
        }
        None
    }

    fn wizard_fields(&self) -> &'static [WizardField] {
        &API_FIELDS
    }

    fn dashboard_badge(&self) -> Option<&'static str> {
        Some("api")
    }
}

/// Maps a type id to its capability record.
pub struct ProjectTypeRegistry {
    entries: HashMap<ProjectType, Box<dyn ProjectTypeCapabilities>>,
}

impl ProjectTypeRegistry {
    pub fn with_builtin_types() -> Self {
        let mut registry = ProjectTypeRegistry {
            entries: HashMap::new(),
        };
        registry.register(Box::new(StandaloneType));
        registry.register(Box::new(WebappType));
        registry.register(Box::new(FivemType));
        registry.register(Box::new(ApiType));
        registry
    }

    pub fn register(&mut self, capabilities: Box<dyn ProjectTypeCapabilities>) {
        self.entries.insert(capabilities.project_type(), capabilities);
    }

    pub fn capabilities(&self, project_type: ProjectType) -> &dyn ProjectTypeCapabilities {
        match self.entries.get(&project_type) {
            Some(entry) => entry.as_ref(),
            None => &StandaloneType,
        }
    }

    /// Configured command first, then the type's autodetected default.
    pub fn resolve_service_command(
        &self,
        project: &Project,
        kind: ServiceKind,
    ) -> Result<String, CoreError> {
        if let Some(configured) = configured_service_command(project, kind) {
            return Ok(configured);
        }

        self.capabilities(project.project_type)
            .default_service_command(project, kind)
            .ok_or_else(|| {
                CoreError::InvalidInput(format!(
                    "No {} command is configured for project \"{}\".",
                    kind.banner_label(),
                    project.name
                ))
            })
    }
}

impl Default for ProjectTypeRegistry {
    fn default() -> Self {
        ProjectTypeRegistry::with_builtin_types()
    }
}

fn configured_service_command(project: &Project, kind: ServiceKind) -> Option<String> {
    let candidates = match kind {
        ServiceKind::Dev => [project.dev_command.as_deref(), None],
        ServiceKind::Game => [project.run_command.as_deref(), None],
        ServiceKind::Api => [project.dev_command.as_deref(), project.run_command.as_deref()],
    };
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn detect_package_manager(root: &Path) -> &'static str {
    if root.join("pnpm-lock.yaml").is_file() {
        "pnpm"
    } else if root.join("yarn.lock").is_file() {
        "yarn"
    } else if root.join("bun.lockb").is_file() || root.join("bun.lock").is_file() {
        "bun"
    } else {
        "npm"
    }
}

fn detect_package_script_command(root: &Path, preferred_scripts: &[&str]) -> Option<String> {
    let raw = fs::read_to_string(root.join("package.json")).ok()?;
    let manifest = serde_json::from_str::<serde_json::Value>(&raw).ok()?;
    let scripts = manifest.get("scripts")?.as_object()?;
    let script = preferred_scripts
        .iter()
        .find(|name| scripts.get(**name).and_then(|value| value.as_str()).is_some())?;
    Some(format!("{} run {script}", detect_package_manager(root)))
}
