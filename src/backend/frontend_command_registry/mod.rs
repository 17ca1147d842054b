pub(crate) mod command_entry;
pub(crate) mod event_bridge;
pub(crate) mod git_commands;
pub(crate) mod service_commands;
pub(crate) mod store_commands;
pub(crate) mod terminal_commands;

use serde_json::json;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Emitter, Manager, RunEvent, Runtime};

use crate::backend::app_state_management::workstation::Workstation;
use crate::backend::common::telemetry::init_tracing;

const PLUGIN_NAME: &str = "termdeck";
const SCAN_COMPLETE_EVENT: &str = "git:scanComplete";

use git_commands::*;
use service_commands::*;
use store_commands::*;
use terminal_commands::*;

/// Tauri plugin exposing the workstation core to the webview. Commands are
/// invoked as `plugin:termdeck|<name>` and core events are re-emitted under
/// their channel names.
pub fn plugin<R: Runtime>() -> TauriPlugin<R> {
    Builder::new(PLUGIN_NAME)
        .invoke_handler(tauri::generate_handler![
            projects_snapshot,
            project_create,
            folder_create,
            project_update,
            project_set_service_commands,
            folder_update,
            project_delete,
            folder_delete,
            item_move,
            item_reorder,
            selected_filter_set,
            project_types_list,
            settings_get,
            settings_update,
            time_totals,
            startup_health,
            terminal_open,
            terminal_write,
            terminal_resize,
            terminal_terminate,
            terminal_close,
            terminal_list,
            terminal_activate,
            terminal_neighbor,
            terminal_scrollback,
            terminal_set_theme,
            terminal_resumable,
            git_status_quick,
            git_status_detailed,
            git_status_cached,
            git_scan_all,
            git_select,
            git_deselect,
            git_select_all,
            git_clear_selection,
            git_commit,
            git_generate_message,
            git_pull,
            git_push,
            git_merge,
            git_merge_abort,
            git_branches,
            git_current_branch,
            git_checkout,
            git_create_branch,
            git_delete_branch,
            git_clone,
            git_remote_repo,
            git_merge_in_progress,
            service_start,
            service_stop,
            service_states,
            service_tail
        ])
        .setup(|app, _api| {
            init_tracing();
            let (workstation, health) = tauri::async_runtime::block_on(async { Workstation::open_native() })?;
            if !health.is_healthy() {
                tracing::warn!(
                    git = health.git.available,
                    assistant = health.assistant.available,
                    "plugin.startup.degraded"
                );
            }
            event_bridge::spawn_event_forwarder(app.clone(), workstation.events());
            app.manage(workstation);
            app.manage(health);

            let handle = app.clone();
            tauri::async_runtime::spawn(async move {
                let workstation = handle.state::<Workstation>();
                let statuses = workstation.startup_scan().await;
                if let Err(error) = handle.emit(SCAN_COMPLETE_EVENT, json!({ "statuses": statuses })) {
                    tracing::warn!(%error, "plugin.scan.emit_failed");
                }
            });
            Ok(())
        })
        .on_event(|app, event| {
            if let RunEvent::Exit = event {
                if let Some(workstation) = app.try_state::<Workstation>() {
                    if let Err(error) = tauri::async_runtime::block_on(workstation.shutdown()) {
                        tracing::error!(%error, "plugin.shutdown.failed");
                    }
                }
            }
        })
        .build()
}
