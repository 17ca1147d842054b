pub mod commit_message;
pub mod executor;
pub mod git_runtime;
pub mod snapshot;
pub mod staging;
pub mod task_queue;
