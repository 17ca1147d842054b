pub(crate) mod event_scope;
pub mod events_runtime;
