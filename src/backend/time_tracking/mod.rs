pub mod time_runtime;
