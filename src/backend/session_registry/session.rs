use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::common::dtos::{SessionKind, SessionStatus, TerminalDims};
use crate::backend::project_store::document::Project;
use crate::backend::pty_terminal_sessions::pty_service::PtyHandle;
use crate::backend::pty_terminal_sessions::scrollback::ScrollbackBuffer;
use crate::backend::pty_terminal_sessions::terminal_view::{SessionObserver, TerminalView};

/// Project binding captured when the session was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub project_id: String,
    pub path: String,
}

impl From<&Project> for ProjectRef {
    fn from(project: &Project) -> Self {
        ProjectRef {
            project_id: project.id.clone(),
            path: project.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub project_ref: ProjectRef,
    pub kind: SessionKind,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub dims: TerminalDims,
    pub skip_permissions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_descriptor: Option<String>,
    pub command: String,
    pub cwd: String,
    pub created_at: String,
    pub attached: bool,
}

pub(crate) struct SessionRuntime {
    pub status: SessionStatus,
    pub exit_code: Option<i32>,
    pub dims: TerminalDims,
    pub pty_handle: Option<PtyHandle>,
    pub scrollback: ScrollbackBuffer,
    pub view: Option<Box<dyn TerminalView>>,
    pub observers: Vec<Arc<dyn SessionObserver>>,
}

/// One terminal instance. Identity fields are fixed at creation; everything
/// the PTY pump touches lives behind `runtime`.
pub struct Session {
    id: String,
    project_ref: ProjectRef,
    kind: SessionKind,
    skip_permissions: bool,
    resume_descriptor: Option<String>,
    command: String,
    cwd: String,
    created_at: String,
    runtime: Mutex<SessionRuntime>,
    pub(crate) outbound: tokio::sync::Mutex<()>,
}

pub(crate) struct SessionInit {
    pub id: String,
    pub project_ref: ProjectRef,
    pub kind: SessionKind,
    pub skip_permissions: bool,
    pub resume_descriptor: Option<String>,
    pub command: String,
    pub cwd: String,
    pub created_at: String,
    pub dims: TerminalDims,
    pub scrollback: ScrollbackBuffer,
    pub observers: Vec<Arc<dyn SessionObserver>>,
}

impl Session {
    pub(crate) fn new(init: SessionInit) -> Self {
        Session {
            id: init.id,
            project_ref: init.project_ref,
            kind: init.kind,
            skip_permissions: init.skip_permissions,
            resume_descriptor: init.resume_descriptor,
            command: init.command,
            cwd: init.cwd,
            created_at: init.created_at,
            runtime: Mutex::new(SessionRuntime {
                status: SessionStatus::Backgrounded,
                exit_code: None,
                dims: init.dims,
                pty_handle: None,
                scrollback: init.scrollback,
                view: None,
                observers: init.observers,
            }),
            outbound: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_ref(&self) -> &ProjectRef {
        &self.project_ref
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn status(&self) -> SessionStatus {
        self.runtime().status
    }

    pub fn is_live(&self) -> bool {
        self.status() != SessionStatus::Exited
    }

    pub fn scrollback(&self) -> Vec<u8> {
        self.runtime().scrollback.contents()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let runtime = self.runtime();
        SessionSnapshot {
            id: self.id.clone(),
            project_ref: self.project_ref.clone(),
            kind: self.kind,
            status: runtime.status,
            exit_code: runtime.exit_code,
            dims: runtime.dims,
            skip_permissions: self.skip_permissions,
            resume_descriptor: self.resume_descriptor.clone(),
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            created_at: self.created_at.clone(),
            attached: runtime.view.is_some(),
        }
    }

    pub(crate) fn runtime(&self) -> MutexGuard<'_, SessionRuntime> {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Focus bookkeeping; an exited session keeps its status.
    pub(crate) fn set_focus(&self, active: bool) {
        let mut runtime = self.runtime();
        if runtime.status != SessionStatus::Exited {
            runtime.status = if active {
                SessionStatus::Active
            } else {
                SessionStatus::Backgrounded
            };
        }
    }
}

#[cfg(test)]
pub(crate) fn test_session(id: &str, project_id: &str, path: &str, kind: SessionKind) -> Session {
    Session::new(SessionInit {
        id: id.to_string(),
        project_ref: ProjectRef {
            project_id: project_id.to_string(),
            path: path.to_string(),
        },
        kind,
        skip_permissions: false,
        resume_descriptor: None,
        command: "sh".to_string(),
        cwd: path.to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        dims: TerminalDims { cols: 120, rows: 30 },
        scrollback: ScrollbackBuffer::new(100, 4096),
        observers: Vec::new(),
    })
}
