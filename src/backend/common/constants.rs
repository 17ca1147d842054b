use std::time::Duration;

pub(crate) const PROJECTS_DOCUMENT_FILE: &str = "projects.json";
pub(crate) const SETTINGS_DOCUMENT_FILE: &str = "settings.json";
pub(crate) const TIME_TRACKING_LOG_FILE: &str = "time-tracking.jsonl";
pub(crate) const DATA_DIR_ENV: &str = "TERMDECK_DATA_DIR";
pub(crate) const ASSISTANT_BIN_ENV: &str = "TERMDECK_ASSISTANT_BIN";
pub(crate) const ASSISTANT_HOME_ENV: &str = "TERMDECK_ASSISTANT_HOME";
pub(crate) const LOG_FILTER_ENV: &str = "TERMDECK_LOG";
pub(crate) const DEFAULT_DATA_DIR_NAME: &str = ".termdeck";
pub(crate) const DEFAULT_ASSISTANT_BIN: &str = "claude";
pub(crate) const DEFAULT_ASSISTANT_HOME_DIR: &str = ".claude";
pub(crate) const DEFAULT_LANGUAGE: &str = "en";

pub(crate) const PERSIST_DEBOUNCE: Duration = Duration::from_millis(250);
pub(crate) const STARTUP_SCAN_CONCURRENCY: usize = 5;

pub(crate) const DEFAULT_TERMINAL_COLS: u16 = 120;
pub(crate) const DEFAULT_TERMINAL_ROWS: u16 = 30;
pub(crate) const MIN_TERMINAL_DIMENSION: u16 = 2;
pub(crate) const MAX_TERMINAL_DIMENSION: u16 = 500;
pub(crate) const DEFAULT_SCROLLBACK_LINES: usize = 10_000;
pub(crate) const MAX_SCROLLBACK_BYTES: usize = 8 * 1024 * 1024;
pub(crate) const PTY_READ_BUFFER_BYTES: usize = 4096;

pub(crate) const DEFAULT_SERVICE_LOG_BYTES: usize = 10 * 1024;
pub(crate) const PORT_SCAN_CARRY_BYTES: usize = 256;

pub(crate) const ASSISTANT_RESUME_FLAG: &str = "--resume";
pub(crate) const ASSISTANT_SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";
pub(crate) const ASSISTANT_PRINT_FLAG: &str = "-p";

pub(crate) const DEFAULT_TERMINAL_THEME: &str = "claude";
pub(crate) const SUPPORTED_TERMINAL_THEMES: [&str; 5] =
    ["claude", "dark", "light", "dracula", "solarized-dark"];

pub(crate) const NOTHING_SELECTED_MESSAGE: &str = "nothing selected";
pub(crate) const MAX_COMMIT_SUBJECT_CHARS: usize = 100;
pub(crate) const MAX_COMMIT_BODY_CHARS: usize = 2000;
pub(crate) const MAX_ORACLE_DIFF_BYTES: usize = 200 * 1024;
pub(crate) const MAX_OUTPUT_SNIPPET_CHARS: usize = 4000;
