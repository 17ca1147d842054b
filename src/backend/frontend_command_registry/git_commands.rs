use serde::Deserialize;
use std::collections::HashMap;
use tauri::{AppHandle, Manager, Runtime};

use super::command_entry::{CommandResponse, ProjectPayload};
use crate::backend::app_state_management::workstation::Workstation;
use crate::backend::common::dtos::GitCommandOutcome;
use crate::backend::git_workspace_engine::commit_message::GeneratedMessage;
use crate::backend::git_workspace_engine::snapshot::{BranchList, GitStatusSnapshot, QuickStatus, RemoteRepo};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FilePayload {
    pub project_id: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommitPayload {
    pub project_id: String,
    pub message: String,
    /// Defaults to the current staging selection.
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessagePayload {
    pub project_id: String,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub use_ai: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BranchPayload {
    pub project_id: String,
    pub branch: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClonePayload {
    pub repo_url: String,
    pub target_path: String,
}

#[tauri::command]
pub(crate) async fn git_status_quick<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<QuickStatus> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().status_quick(&project).await
    }
    .await;
    CommandResponse::respond("git_status_quick", result)
}

#[tauri::command]
pub(crate) async fn git_status_detailed<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<GitStatusSnapshot> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().status_detailed(&project).await
    }
    .await;
    CommandResponse::respond("git_status_detailed", result)
}

/// Last cached snapshot right away; a refresh lands as `git:statusUpdated`.
#[tauri::command]
pub(crate) fn git_status_cached<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<Option<GitStatusSnapshot>> {
    let workstation = app.state::<Workstation>();
    let result = workstation
        .project_ref(&payload.project_id)
        .map(|project| workstation.git().refresh(&project));
    CommandResponse::respond("git_status_cached", result)
}

#[tauri::command]
pub(crate) async fn git_scan_all<R: Runtime>(app: AppHandle<R>) -> CommandResponse<HashMap<String, QuickStatus>> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond("git_scan_all", Ok(workstation.startup_scan().await))
}

#[tauri::command]
pub(crate) fn git_select<R: Runtime>(app: AppHandle<R>, payload: FilePayload) -> CommandResponse<Vec<String>> {
    let workstation = app.state::<Workstation>();
    let result = workstation.project_ref(&payload.project_id).and_then(|project| {
        workstation.git().select(&project, &payload.path)?;
        Ok(workstation.git().selection(&project))
    });
    CommandResponse::respond("git_select", result)
}

#[tauri::command]
pub(crate) fn git_deselect<R: Runtime>(app: AppHandle<R>, payload: FilePayload) -> CommandResponse<Vec<String>> {
    let workstation = app.state::<Workstation>();
    let result = workstation.project_ref(&payload.project_id).map(|project| {
        workstation.git().deselect(&project, &payload.path);
        workstation.git().selection(&project)
    });
    CommandResponse::respond("git_deselect", result)
}

#[tauri::command]
pub(crate) fn git_select_all<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<Vec<String>> {
    let workstation = app.state::<Workstation>();
    let result = workstation.project_ref(&payload.project_id).map(|project| {
        workstation.git().select_all(&project);
        workstation.git().selection(&project)
    });
    CommandResponse::respond("git_select_all", result)
}

#[tauri::command]
pub(crate) fn git_clear_selection<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<()> {
    let workstation = app.state::<Workstation>();
    let result = workstation
        .project_ref(&payload.project_id)
        .map(|project| workstation.git().clear_selection(&project));
    CommandResponse::respond("git_clear_selection", result)
}

#[tauri::command]
pub(crate) async fn git_commit<R: Runtime>(app: AppHandle<R>, payload: CommitPayload) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        match payload.files.as_deref() {
            Some(files) => workstation.git().commit(&project, &payload.message, files).await,
            None => workstation.git().commit_selection(&project, &payload.message).await,
        }
    }
    .await;
    CommandResponse::respond("git_commit", result)
}

#[tauri::command]
pub(crate) async fn git_generate_message<R: Runtime>(
    app: AppHandle<R>,
    payload: MessagePayload,
) -> CommandResponse<GeneratedMessage> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let files = match payload.files {
            Some(files) => files,
            None => {
                let project = workstation.project_ref(&payload.project_id)?;
                workstation.git().selection(&project)
            }
        };
        workstation
            .generate_commit_message(&payload.project_id, &files, payload.use_ai)
            .await
    }
    .await;
    CommandResponse::respond("git_generate_message", result)
}

#[tauri::command]
pub(crate) async fn git_pull<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().pull(&project).await
    }
    .await;
    CommandResponse::respond("git_pull", result)
}

#[tauri::command]
pub(crate) async fn git_push<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().push(&project).await
    }
    .await;
    CommandResponse::respond("git_push", result)
}

#[tauri::command]
pub(crate) async fn git_merge<R: Runtime>(app: AppHandle<R>, payload: BranchPayload) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().merge(&project, &payload.branch).await
    }
    .await;
    CommandResponse::respond("git_merge", result)
}

#[tauri::command]
pub(crate) async fn git_merge_abort<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().merge_abort(&project).await
    }
    .await;
    CommandResponse::respond("git_merge_abort", result)
}

#[tauri::command]
pub(crate) async fn git_branches<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<BranchList> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().branches(&project).await
    }
    .await;
    CommandResponse::respond("git_branches", result)
}

#[tauri::command]
pub(crate) async fn git_current_branch<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<Option<String>> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().current_branch(&project).await
    }
    .await;
    CommandResponse::respond("git_current_branch", result)
}

#[tauri::command]
pub(crate) async fn git_checkout<R: Runtime>(
    app: AppHandle<R>,
    payload: BranchPayload,
) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().checkout(&project, &payload.branch).await
    }
    .await;
    CommandResponse::respond("git_checkout", result)
}

#[tauri::command]
pub(crate) async fn git_create_branch<R: Runtime>(
    app: AppHandle<R>,
    payload: BranchPayload,
) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().create_branch(&project, &payload.branch).await
    }
    .await;
    CommandResponse::respond("git_create_branch", result)
}

#[tauri::command]
pub(crate) async fn git_delete_branch<R: Runtime>(
    app: AppHandle<R>,
    payload: BranchPayload,
) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().delete_branch(&project, &payload.branch).await
    }
    .await;
    CommandResponse::respond("git_delete_branch", result)
}

#[tauri::command]
pub(crate) async fn git_clone<R: Runtime>(app: AppHandle<R>, payload: ClonePayload) -> CommandResponse<GitCommandOutcome> {
    let workstation = app.state::<Workstation>();
    CommandResponse::respond(
        "git_clone",
        workstation
            .git()
            .clone_repository(&payload.repo_url, &payload.target_path)
            .await,
    )
}

#[tauri::command]
pub(crate) async fn git_remote_repo<R: Runtime>(
    app: AppHandle<R>,
    payload: ProjectPayload,
) -> CommandResponse<Option<RemoteRepo>> {
    let workstation = app.state::<Workstation>();
    let result = async {
        let project = workstation.project_ref(&payload.project_id)?;
        workstation.git().remote_repo(&project).await
    }
    .await;
    CommandResponse::respond("git_remote_repo", result)
}

#[tauri::command]
pub(crate) fn git_merge_in_progress<R: Runtime>(app: AppHandle<R>, payload: ProjectPayload) -> CommandResponse<bool> {
    let workstation = app.state::<Workstation>();
    let result = workstation
        .project_ref(&payload.project_id)
        .map(|project| workstation.git().merge_in_progress(&project));
    CommandResponse::respond("git_merge_in_progress", result)
}
