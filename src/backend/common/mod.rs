pub(crate) mod constants;
pub mod dtos;
pub mod errors;
pub(crate) mod json_file;
pub mod process_command;
pub mod telemetry;
