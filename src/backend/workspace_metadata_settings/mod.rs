pub mod core_config;
pub mod settings_runtime;
