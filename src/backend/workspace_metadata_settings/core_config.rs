use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::common::constants::{
    ASSISTANT_BIN_ENV, ASSISTANT_HOME_ENV, DATA_DIR_ENV, DEFAULT_ASSISTANT_BIN, DEFAULT_ASSISTANT_HOME_DIR,
    DEFAULT_DATA_DIR_NAME, DEFAULT_SCROLLBACK_LINES, DEFAULT_SERVICE_LOG_BYTES, MAX_SCROLLBACK_BYTES,
    PERSIST_DEBOUNCE, PROJECTS_DOCUMENT_FILE, SETTINGS_DOCUMENT_FILE, STARTUP_SCAN_CONCURRENCY,
    TIME_TRACKING_LOG_FILE,
};
use crate::backend::common::dtos::TerminalDims;
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::terminal::{default_shell, normalize_terminal_dims};
use crate::workspace::dirs_home;

/// Process-level configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub assistant_bin: String,
    /// Root of the Assistant CLI's own data (`~/.claude`).
    pub assistant_home: PathBuf,
    pub git_bin: String,
    pub shell: String,
    pub scrollback_lines: usize,
    pub scrollback_bytes: usize,
    pub service_log_bytes: usize,
    pub persist_debounce: Duration,
    pub scan_concurrency: usize,
    pub default_dims: TerminalDims,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl CoreConfig {
    /// All paths under `data_dir`; everything else at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let assistant_home = dirs_home()
            .map(|home| home.join(DEFAULT_ASSISTANT_HOME_DIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSISTANT_HOME_DIR));
        CoreConfig {
            data_dir: data_dir.into(),
            assistant_bin: DEFAULT_ASSISTANT_BIN.to_string(),
            assistant_home,
            git_bin: "git".to_string(),
            shell: default_shell(),
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            scrollback_bytes: MAX_SCROLLBACK_BYTES,
            service_log_bytes: DEFAULT_SERVICE_LOG_BYTES,
            persist_debounce: PERSIST_DEBOUNCE,
            scan_concurrency: STARTUP_SCAN_CONCURRENCY,
            default_dims: normalize_terminal_dims(None, None),
        }
    }

    /// `TERMDECK_DATA_DIR`, else `$HOME/.termdeck`; the Assistant binary and
    /// home come from `TERMDECK_ASSISTANT_BIN` / `TERMDECK_ASSISTANT_HOME`.
    pub fn from_env() -> CoreResult<Self> {
        let data_dir = match env_value(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs_home()
                .map(|home| home.join(DEFAULT_DATA_DIR_NAME))
                .ok_or_else(|| {
                    CoreError::InvalidInput(format!(
                        "Could not resolve a data directory: set {DATA_DIR_ENV} or HOME."
                    ))
                })?,
        };

        let mut config = CoreConfig::with_data_dir(data_dir);
        if let Some(bin) = env_value(ASSISTANT_BIN_ENV) {
            config.assistant_bin = bin;
        }
        if let Some(home) = env_value(ASSISTANT_HOME_ENV) {
            config.assistant_home = PathBuf::from(home);
        }
        tracing::debug!(
            data_dir = %config.data_dir.display(),
            assistant_bin = %config.assistant_bin,
            "config.resolved"
        );
        Ok(config)
    }

    pub fn projects_path(&self) -> PathBuf {
        self.data_dir.join(PROJECTS_DOCUMENT_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_DOCUMENT_FILE)
    }

    pub fn time_log_path(&self) -> PathBuf {
        self.data_dir.join(TIME_TRACKING_LOG_FILE)
    }

    /// Where the Assistant keeps one directory of session files per project.
    pub fn assistant_projects_dir(&self) -> PathBuf {
        self.assistant_home.join("projects")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
