pub mod registry_runtime;
pub mod resume_index;
pub mod session;
