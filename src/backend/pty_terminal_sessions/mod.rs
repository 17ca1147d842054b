pub mod native_pty;
pub mod pty_service;
pub mod scrollback;
pub mod session_runtime;
pub(crate) mod terminal_scope;
pub mod terminal_view;
pub mod theme;
