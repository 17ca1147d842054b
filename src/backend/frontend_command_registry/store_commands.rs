use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tauri::{AppHandle, Manager, Runtime};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::command_entry::{CommandResponse, ProjectPayload};
use crate::backend::app_state_management::workstation::Workstation;
use crate::backend::common::errors::CoreError;
use crate::backend::project_store::document::{
    DropPosition, Folder, ItemKind, NewProject, Project, ProjectsDocument,
};
use crate::backend::project_store::project_types::{ProjectType, WizardField};
use crate::backend::startup_health_checks_binary_validation::binary_runtime::StartupHealth;
use crate::backend::workspace_metadata_settings::settings_runtime::SettingsDocument;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FolderCreatePayload {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemUpdatePayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Present and `null` clears the color.
    #[serde(default, with = "double_option")]
    pub color: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub icon: Option<Option<String>>,
    #[serde(default)]
    pub collapsed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServiceCommandsPayload {
    pub project_id: String,
    #[serde(default)]
    pub dev_command: Option<String>,
    #[serde(default)]
    pub run_command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemMovePayload {
    pub kind: ItemKind,
    pub id: String,
    #[serde(default)]
    pub target_folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemReorderPayload {
    pub kind: ItemKind,
    pub id: String,
    pub target_id: String,
    pub position: DropPosition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SelectedFilterPayload {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdPayload {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeTotalsPayload {
    #[serde(default)]
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectTypeInfo {
    pub id: ProjectType,
    pub wizard_fields: &'static [WizardField],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_badge: Option<&'static str>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[tauri::command]
pub(crate) fn projects_snapshot<R: Runtime>(app: AppHandle<R>) -> CommandResponse<ProjectsDocument> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("projects_snapshot", Ok(workstation.store().snapshot()))
}

#[tauri::command]
pub(crate) fn project_create<R: Runtime>(app: AppHandle<R>, payload: NewProject) -> CommandResponse<Project> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("project_create", workstation.store().create_project(payload))
}

#[tauri::command]
pub(crate) fn folder_create<R: Runtime>(
    app: AppHandle<R>,
    payload: FolderCreatePayload,
) -> CommandResponse<Folder> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "folder_create",
        workstation
            .store()
            .create_folder(&payload.name, payload.parent_id.as_deref()),
    )
}

#[tauri::command]
pub(crate) fn project_update<R: Runtime>(app: AppHandle<R>, payload: ItemUpdatePayload) -> CommandResponse<Project> {
    let workstation = app.state::<Workstation>();
    let store = workstation.store();
    let result = (|| {
        let mut project = store.project(&payload.id)?;
        if let Some(name) = payload.name.as_deref() {
            project = store.rename_project(&payload.id, name)?;
        }
        if let Some(color) = payload.color.as_ref() {
            project = store.recolor_project(&payload.id, color.as_deref())?;
        }
        if let Some(icon) = payload.icon.as_ref() {
            project = store.set_project_icon(&payload.id, icon.as_deref())?;
        }
        Ok::<_, CoreError>(project)
    })();
    CommandResponse::respond("project_update", result)
}

#[tauri::command]
pub(crate) fn project_set_service_commands<R: Runtime>(
    app: AppHandle<R>,
    payload: ServiceCommandsPayload,
) -> CommandResponse<Project> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "project_set_service_commands",
        workstation.store().set_service_commands(
            &payload.project_id,
            payload.dev_command.as_deref(),
            payload.run_command.as_deref(),
        ),
    )
}

#[tauri::command]
pub(crate) fn folder_update<R: Runtime>(app: AppHandle<R>, payload: ItemUpdatePayload) -> CommandResponse<Folder> {
    let workstation = app.state::<Workstation>();
    let store = workstation.store();
    let result = (|| {
        let mut folder = store.folder(&payload.id)?;
        if let Some(name) = payload.name.as_deref() {
            folder = store.rename_folder(&payload.id, name)?;
        }
        if let Some(color) = payload.color.as_ref() {
            folder = store.recolor_folder(&payload.id, color.as_deref())?;
        }
        if let Some(collapsed) = payload.collapsed {
            folder = store.set_folder_collapsed(&payload.id, collapsed)?;
        }
        Ok::<_, CoreError>(folder)
    })();
    CommandResponse::respond("folder_update", result)
}

#[tauri::command]
pub(crate) fn project_delete<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<Project> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("project_delete", workstation.delete_project(&payload.project_id))
}

#[tauri::command]
pub(crate) fn folder_delete<R: Runtime>(app: AppHandle<R>, payload: IdPayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("folder_delete", workstation.delete_folder(&payload.id))
}

#[tauri::command]
pub(crate) fn item_move<R: Runtime>(app: AppHandle<R>, payload: ItemMovePayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "item_move",
        workstation
            .store()
            .move_item(payload.kind, &payload.id, payload.target_folder_id.as_deref()),
    )
}

#[tauri::command]
pub(crate) fn item_reorder<R: Runtime>(app: AppHandle<R>, payload: ItemReorderPayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "item_reorder",
        workstation
            .store()
            .reorder_item(payload.kind, &payload.id, &payload.target_id, payload.position),
    )
}

#[tauri::command]
pub(crate) fn selected_filter_set<R: Runtime>(
    app: AppHandle<R>,
    payload: SelectedFilterPayload,
) -> CommandResponse<Option<Project>> {
    let workstation = app.state::<Workstation>();
    let store = workstation.store();
    let result = store
        .set_selected_filter(payload.project_id.as_deref())
        .map(|()| store.selected_filter());
    CommandResponse::respond("selected_filter_set", result)
}

#[tauri::command]
pub(crate) fn project_types_list<R: Runtime>(app: AppHandle<R>) -> CommandResponse<Vec<ProjectTypeInfo>> {
    let workstation = app.state::<Workstation>();
    let types = ProjectType::ALL
        .into_iter()
        .map(|id| {
            let capabilities = workstation.project_types().capabilities(id);
            ProjectTypeInfo {
                id,
                wizard_fields: capabilities.wizard_fields(),
                dashboard_badge: capabilities.dashboard_badge(),
            }
        })
        .collect();
    CommandResponse::respond("project_types_list", Ok(types))
}

#[tauri::command]
pub(crate) fn settings_get<R: Runtime>(app: AppHandle<R>) -> CommandResponse<SettingsDocument> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("settings_get", workstation.settings().reload())
}

#[tauri::command]
pub(crate) fn settings_update<R: Runtime>(
    app: AppHandle<R>,
    payload: SettingsDocument,
) -> CommandResponse<SettingsDocument> {
    let workstation = app.state::<Workstation>();
    let result = workstation
        .settings()
        .update(|settings| *settings = payload)
        .and_then(|saved| {
            workstation.terminals().set_theme(&saved.terminal_theme)?;
            Ok(saved)
        });
    CommandResponse::respond("settings_update", result)
}

/// Seconds per project, over the whole log or since an RFC 3339 instant.
#[tauri::command]
pub(crate) fn time_totals<R: Runtime>(
    app: AppHandle<R>,
    payload: TimeTotalsPayload,
) -> CommandResponse<BTreeMap<String, u64>> {
    let workstation = app.state::<Workstation>();
    let tracker = workstation.time_tracker();
    let result = match payload.since.as_deref() {
        None => tracker.totals(),
        Some(since) => OffsetDateTime::parse(since, &Rfc3339)
            .map_err(|error| CoreError::InvalidInput(format!("since must be an RFC 3339 timestamp: {error}")))
            .and_then(|since| tracker.totals_since(since)),
    };
    CommandResponse::respond("time_totals", result)
}

#[tauri::command]
pub(crate) fn startup_health<R: Runtime>(app: AppHandle<R>) -> CommandResponse<StartupHealth> {
    let health = app.state::<StartupHealth>();
    CommandResponse::respond("startup_health", Ok(health.inner().clone()))
}
