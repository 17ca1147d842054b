use super::theme::TerminalTheme;
use crate::backend::session_registry::session::Session;

/// A front-end VT emulator attached to one session.
pub trait TerminalView: Send {
    /// Feeds the accumulated stream before live output is enabled.
    fn replay(&mut self, scrollback: &[u8]);

    fn write(&mut self, chunk: &[u8]);

    /// Recolors without resetting the emulator.
    fn apply_theme(&mut self, theme: &TerminalTheme);
}

/// Receives a session's lifecycle and output alongside the scrollback.
pub trait SessionObserver: Send + Sync {
    fn on_started(&self, _session: &Session) {}

    fn on_data(&self, _session_id: &str, _chunk: &[u8]) {}

    fn on_exit(&self, _session_id: &str, _exit_code: Option<i32>) {}

    /// The session was removed from the registry.
    fn on_closed(&self, _session_id: &str) {}
}
