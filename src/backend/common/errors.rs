use std::io;

/// Error kinds surfaced by the workstation core.
///
/// Operational Git failures are not errors; they travel as
/// [`GitCommandOutcome`](crate::GitCommandOutcome) values.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{kind} \"{id}\" was not found")]
    NotFound { kind: &'static str, id: String },

    #[error("moving folder \"{folder_id}\" under \"{target_id}\" would create a cycle")]
    Cycle { folder_id: String, target_id: String },

    #[error("a project already exists at path \"{path}\"")]
    DuplicatePath { path: String },

    #[error("service {kind} for project \"{project_id}\" is already running")]
    AlreadyRunning { project_id: String, kind: String },

    #[error("{operation} refused at \"{path}\": a merge is in progress")]
    ConflictState { path: String, operation: String },

    #[error("\"{id}\" still has live sessions or services")]
    LiveResources { id: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("external failure: {0}")]
    ExternalFailure(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl CoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn external(context: &str, error: impl std::fmt::Display) -> Self {
        CoreError::ExternalFailure(format!("{context}: {error}"))
    }

    /// Stable identifier handed to the UI bridge.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "not_found",
            CoreError::Cycle { .. } => "cycle_error",
            CoreError::DuplicatePath { .. } => "duplicate_path",
            CoreError::AlreadyRunning { .. } => "already_running",
            CoreError::ConflictState { .. } => "conflict_state",
            CoreError::LiveResources { .. } => "live_resources",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::ExternalFailure(_) => "external_failure",
            CoreError::Persistence(_) => "persistence",
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(error: io::Error) -> Self {
        CoreError::ExternalFailure(error.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
