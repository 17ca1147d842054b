use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tauri::{AppHandle, Manager, Runtime};

use super::command_entry::{CommandResponse, ProjectPayload, SessionPayload};
use crate::backend::app_state_management::workstation::{OpenTerminalRequest, Workstation};
use crate::backend::common::dtos::{SessionKind, TerminalDims};
use crate::backend::pty_terminal_sessions::theme::TerminalTheme;
use crate::backend::session_registry::registry_runtime::NeighborDirection;
use crate::backend::session_registry::resume_index::ResumeEntry;
use crate::backend::session_registry::session::SessionSnapshot;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminalOpenPayload {
    pub project_id: String,
    pub kind: SessionKind,
    #[serde(default = "default_true")]
    pub run_assistant: bool,
    #[serde(default)]
    pub skip_permissions: Option<bool>,
    #[serde(default)]
    pub resume_descriptor: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub cols: Option<u16>,
    #[serde(default)]
    pub rows: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminalWritePayload {
    pub session_id: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminalResizePayload {
    pub session_id: String,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminalListPayload {
    #[serde(default)]
    pub filter_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminalNeighborPayload {
    pub direction: NeighborDirection,
    #[serde(default)]
    pub filter_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminalThemePayload {
    pub theme_id: String,
}

#[tauri::command]
pub(crate) async fn terminal_open<R: Runtime>(
    app: AppHandle<R>,
    payload: TerminalOpenPayload,
) -> CommandResponse<SessionSnapshot> {
    let workstation = app.state::<Workstation>();
    let mut request = OpenTerminalRequest::new(payload.kind);
    request.run_assistant = payload.run_assistant;
    request.skip_permissions = payload.skip_permissions;
    request.resume_descriptor = payload.resume_descriptor;
    request.cwd_override = payload.cwd;
    request.dims = match (payload.cols, payload.rows) {
        (Some(cols), Some(rows)) => Some(TerminalDims { cols, rows }),
        _ => None,
    };
    CommandResponse::respond(
        "terminal_open",
        workstation.open_terminal(&payload.project_id, request).await,
    )
}

#[tauri::command]
pub(crate) async fn terminal_write<R: Runtime>(
    app: AppHandle<R>,
    payload: TerminalWritePayload,
) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_write",
        workstation
            .terminals()
            .write_input(&payload.session_id, payload.data.as_bytes())
            .await,
    )
}

#[tauri::command]
pub(crate) async fn terminal_resize<R: Runtime>(
    app: AppHandle<R>,
    payload: TerminalResizePayload,
) -> CommandResponse<TerminalDims> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_resize",
        workstation
            .terminals()
            .resize(&payload.session_id, payload.cols, payload.rows)
            .await,
    )
}

#[tauri::command]
pub(crate) async fn terminal_terminate<R: Runtime>(app: AppHandle<R>, payload: SessionPayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_terminate",
        workstation.terminals().terminate(&payload.session_id).await,
    )
}

#[tauri::command]
pub(crate) async fn terminal_close<R: Runtime>(app: AppHandle<R>, payload: SessionPayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_close",
        workstation.terminals().close_terminal(&payload.session_id).await,
    )
}

#[tauri::command]
pub(crate) fn terminal_list<R: Runtime>(
    app: AppHandle<R>,
    payload: TerminalListPayload,
) -> CommandResponse<Vec<SessionSnapshot>> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_list",
        Ok(workstation.terminals().list_sessions(payload.filter_path.as_deref())),
    )
}

#[tauri::command]
pub(crate) fn terminal_activate<R: Runtime>(app: AppHandle<R>, payload: SessionPayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("terminal_activate", workstation.registry().activate(&payload.session_id))
}

#[tauri::command]
pub(crate) fn terminal_neighbor<R: Runtime>(
    app: AppHandle<R>,
    payload: TerminalNeighborPayload,
) -> CommandResponse<Option<String>> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_neighbor",
        Ok(workstation
            .registry()
            .neighbor(payload.direction, payload.filter_path.as_deref())),
    )
}

/// Base64 of the whole scrollback, replayed by a newly mounted view.
#[tauri::command]
pub(crate) fn terminal_scrollback<R: Runtime>(app: AppHandle<R>, payload: SessionPayload) -> CommandResponse<String> {
    let workstation = app.state::<Workstation>();
    let result = workstation
        .terminals()
        .scrollback(&payload.session_id)
        .map(|bytes| STANDARD.encode(bytes));
    CommandResponse::respond("terminal_scrollback", result)
}

#[tauri::command]
pub(crate) fn terminal_set_theme<R: Runtime>(
    app: AppHandle<R>,
    payload: TerminalThemePayload,
) -> CommandResponse<TerminalTheme> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("terminal_set_theme", workstation.set_terminal_theme(&payload.theme_id))
}

#[tauri::command]
pub(crate) async fn terminal_resumable<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<Vec<ResumeEntry>> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "terminal_resumable",
        workstation.resumable_sessions(&payload.project_id).await,
    )
}
