use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tauri::{AppHandle, Emitter, Manager, Runtime};
use tokio::sync::broadcast::error::RecvError;

use crate::backend::app_state_management::workstation::Workstation;
use crate::backend::event_polling_emission_pipeline::event_scope::SESSION_RESYNC_EVENT;
use crate::backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};

/// JSON body sent to the webview for a core event.
pub(crate) fn event_payload(event: &CoreEvent) -> Value {
    match event {
        CoreEvent::ProjectsChanged { filter_cleared } => json!({ "filterCleared": filter_cleared }),
        CoreEvent::SelectedFilter { project_id } => json!({ "projectId": project_id }),
        CoreEvent::SessionAdded {
            session_id,
            project_id,
            kind,
        } => json!({
            "sessionId": session_id,
            "projectId": project_id,
            "kind": kind.as_str(),
        }),
        CoreEvent::SessionRemoved { session_id } | CoreEvent::SessionActivated { session_id } => {
            json!({ "sessionId": session_id })
        }
        CoreEvent::SessionExited { session_id, exit_code } => json!({
            "sessionId": session_id,
            "exitCode": exit_code,
        }),
        CoreEvent::SessionData { session_id, chunk } => json!({
            "sessionId": session_id,
            "data": STANDARD.encode(chunk),
        }),
        CoreEvent::GitStatusUpdated { project_id } => json!({ "projectId": project_id }),
        CoreEvent::GitOpComplete { project_id, op, result } => json!({
            "projectId": project_id,
            "op": op,
            "result": result,
        }),
        CoreEvent::ServiceState {
            project_id,
            kind,
            state,
        } => json!({
            "projectId": project_id,
            "kind": kind,
            "state": state,
        }),
    }
}

/// Body of `session:resync`. Dropped events may include output chunks, so
/// the webview re-reads scrollback for every live session.
pub(crate) fn resync_payload(skipped: u64, session_ids: &[String]) -> Value {
    json!({
        "skipped": skipped,
        "sessionIds": session_ids,
    })
}

fn live_session_ids<R: Runtime>(app: &AppHandle<R>) -> Vec<String> {
    app.try_state::<Workstation>()
        .map(|workstation| {
            workstation
                .registry()
                .list()
                .iter()
                .map(|session| session.id().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Forwards every core event to the webview until the bus closes. Falling
/// behind the bus triggers a resync instead of silently losing output.
pub(crate) fn spawn_event_forwarder<R: Runtime>(app: AppHandle<R>, events: &EventBus) {
    let mut receiver = events.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(error) = app.emit(event.name(), event_payload(&event)) {
                        tracing::warn!(event = event.name(), %error, "event.forward.failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    let session_ids = live_session_ids(&app);
                    tracing::warn!(skipped, sessions = session_ids.len(), "event.forward.lagged");
                    if let Err(error) = app.emit(SESSION_RESYNC_EVENT, resync_payload(skipped, &session_ids)) {
                        tracing::warn!(event = SESSION_RESYNC_EVENT, %error, "event.forward.failed");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::common::dtos::{ServiceKind, ServiceStateSnapshot, SessionKind};
    use crate::backend::event_polling_emission_pipeline::event_scope::EVENT_BUS_CAPACITY;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn session_data_is_base64_encoded() {
        let payload = event_payload(&CoreEvent::SessionData {
            session_id: "s1".to_string(),
            chunk: b"hi".to_vec(),
        });
        assert_eq!(payload["sessionId"], "s1");
        assert_eq!(payload["data"], "aGk=");
    }

    #[test]
    fn session_added_carries_kind_label() {
        let payload = event_payload(&CoreEvent::SessionAdded {
            session_id: "s1".to_string(),
            project_id: "p1".to_string(),
            kind: SessionKind::Service(ServiceKind::Dev),
        });
        assert_eq!(payload["kind"], "service:dev");
        assert_eq!(payload["projectId"], "p1");
    }

    #[test]
    fn resync_lists_sessions_to_redraw() {
        let payload = resync_payload(12, &["s1".to_string(), "s2".to_string()]);
        assert_eq!(payload["skipped"], 12);
        assert_eq!(payload["sessionIds"], json!(["s1", "s2"]));
    }

    #[test]
    fn lagged_receiver_learns_how_much_it_missed() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        for index in 0..EVENT_BUS_CAPACITY + 3 {
            bus.emit(CoreEvent::SessionData {
                session_id: "s1".to_string(),
                chunk: vec![index as u8],
            });
        }
        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Lagged(3))));
    }

    #[test]
    fn service_state_serializes_snapshot() {
        let payload = event_payload(&CoreEvent::ServiceState {
            project_id: "p1".to_string(),
            kind: ServiceKind::Api,
            state: ServiceStateSnapshot::default(),
        });
        assert_eq!(payload["kind"], "api");
        assert_eq!(payload["state"]["status"], "stopped");
    }
}
