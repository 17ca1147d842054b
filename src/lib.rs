pub mod backend;
pub mod git_gh;
pub mod terminal;
pub mod workspace;

pub use backend::app_state_management::workstation::{OpenTerminalRequest, Workstation, WorkstationDeps};
pub use backend::common::dtos::{
    GitCommandOutcome, ServiceKind, ServiceStateSnapshot, ServiceStatus, SessionKind, SessionStatus,
    TerminalDims,
};
pub use backend::common::errors::{CoreError, CoreResult};
pub use backend::common::telemetry::init_tracing;
pub use backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};
pub use backend::startup_health_checks_binary_validation::binary_runtime::StartupHealth;
pub use backend::workspace_metadata_settings::core_config::CoreConfig;

#[cfg(feature = "desktop")]
pub use backend::frontend_command_registry::plugin;
