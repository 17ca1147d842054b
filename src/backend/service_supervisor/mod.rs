pub(crate) mod log_tail;
pub(crate) mod port_detection;
pub mod supervisor_runtime;
