use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Manager, Runtime};

use super::command_entry::{CommandResponse, ProjectPayload};
use crate::backend::app_state_management::workstation::Workstation;
use crate::backend::common::dtos::{ServiceKind, ServiceStateSnapshot};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServicePayload {
    pub project_id: String,
    pub kind: ServiceKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServiceStartPayload {
    pub project_id: String,
    pub kind: ServiceKind,
    /// Overrides the command stored on the project.
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServiceStateEntry {
    pub kind: ServiceKind,
    #[serde(flatten)]
    pub state: ServiceStateSnapshot,
}

#[tauri::command]
pub(crate) async fn service_start<R: Runtime>(
    app: AppHandle<R>,
    payload: ServiceStartPayload,
) -> CommandResponse<ServiceStateSnapshot> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "service_start",
        workstation
            .start_service(&payload.project_id, payload.kind, payload.command)
            .await,
    )
}

#[tauri::command]
pub(crate) async fn service_stop<R: Runtime>(
    app: AppHandle<R>,
    payload: ServicePayload,
) -> CommandResponse<ServiceStateSnapshot> {
    let workstation = app.state::<Workstation>();
    let services = workstation.services();
    let result = services
        .stop(&payload.project_id, payload.kind)
        .await
        .map(|()| services.state(&payload.project_id, payload.kind));
    CommandResponse::respond("service_stop", result)
}

#[tauri::command]
pub(crate) fn service_states<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<Vec<ServiceStateEntry>> {
    let workstation = app.state::<Workstation>();
    let result = workstation.store().project(&payload.project_id).map(|project| {
        workstation
            .services()
            .states(&project.id)
            .into_iter()
            .map(|(kind, state)| ServiceStateEntry { kind, state })
            .collect()
    });
    CommandResponse::respond("service_states", result)
}

/// ANSI-stripped log tail for the service's status panel.
#[tauri::command]
pub(crate) fn service_tail<R: Runtime>(app: AppHandle<R>, payload: ServicePayload) -> CommandResponse<String> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "service_tail",
        Ok(workstation.services().tail(&payload.project_id, payload.kind)),
    )
}
