pub mod app_state_management;
pub mod common;
pub mod event_polling_emission_pipeline;
#[cfg(feature = "desktop")]
pub mod frontend_command_registry;
pub mod git_workspace_engine;
pub mod project_store;
pub mod pty_terminal_sessions;
pub mod runtime_cache_dedupe;
pub mod service_supervisor;
pub mod session_registry;
pub mod startup_health_checks_binary_validation;
pub mod time_tracking;
pub mod workspace_metadata_settings;

#[cfg(test)]
pub(crate) mod test_support;
