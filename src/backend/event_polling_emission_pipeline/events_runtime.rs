use tokio::sync::broadcast;

use super::event_scope::*;
use crate::backend::common::dtos::{GitCommandOutcome, ServiceKind, ServiceStateSnapshot, SessionKind};

/// Notifications the core publishes to observers. Observers never mutate
/// core state through these; they re-read snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// `filter_cleared` is set when the change also unfocused the selected
    /// project.
    ProjectsChanged {
        filter_cleared: bool,
    },
    SelectedFilter {
        project_id: Option<String>,
    },
    SessionAdded {
        session_id: String,
        project_id: String,
        kind: SessionKind,
    },
    SessionRemoved {
        session_id: String,
    },
    SessionActivated {
        session_id: String,
    },
    SessionExited {
        session_id: String,
        exit_code: Option<i32>,
    },
    SessionData {
        session_id: String,
        chunk: Vec<u8>,
    },
    GitStatusUpdated {
        project_id: String,
    },
    GitOpComplete {
        project_id: String,
        op: String,
        result: GitCommandOutcome,
    },
    ServiceState {
        project_id: String,
        kind: ServiceKind,
        state: ServiceStateSnapshot,
    },
}

impl CoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::ProjectsChanged { .. } => PROJECTS_CHANGED_EVENT,
            CoreEvent::SelectedFilter { .. } => PROJECT_SELECTED_FILTER_EVENT,
            CoreEvent::SessionAdded { .. } => SESSION_ADDED_EVENT,
            CoreEvent::SessionRemoved { .. } => SESSION_REMOVED_EVENT,
            CoreEvent::SessionActivated { .. } => SESSION_ACTIVATED_EVENT,
            CoreEvent::SessionExited { .. } => SESSION_EXITED_EVENT,
            CoreEvent::SessionData { .. } => SESSION_DATA_EVENT,
            CoreEvent::GitStatusUpdated { .. } => GIT_STATUS_UPDATED_EVENT,
            CoreEvent::GitOpComplete { .. } => GIT_OP_COMPLETE_EVENT,
            CoreEvent::ServiceState { .. } => SERVICE_STATE_EVENT,
        }
    }
}

/// Fan-out channel shared by every component. Emitting with no subscribers
/// is not an error; lagging subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        EventBus { sender }
    }

    pub fn emit(&self, event: CoreEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

#[cfg(test)]
pub(crate) fn drain_events(receiver: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
