use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::backend::common::constants::{DEFAULT_LANGUAGE, DEFAULT_TERMINAL_THEME, SUPPORTED_TERMINAL_THEMES};
use crate::backend::common::errors::CoreResult;
use crate::backend::common::json_file::{read_json_value, write_json_document};
use crate::workspace::{normalize_color, normalize_theme_id};

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_terminal_theme() -> String {
    DEFAULT_TERMINAL_THEME.to_string()
}

fn default_true() -> bool {
    true
}

/// User preferences. The core reads them; the UI writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
    #[serde(default = "default_terminal_theme")]
    pub terminal_theme: String,
    /// Default for new Assistant sessions.
    #[serde(default)]
    pub skip_permissions: bool,
    /// Default `useAi` for commit-message synthesis.
    #[serde(default = "default_true")]
    pub ai_commit_messages: bool,
    #[serde(default)]
    pub shortcuts: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        SettingsDocument {
            language: default_language(),
            accent_color: None,
            terminal_theme: default_terminal_theme(),
            skip_permissions: false,
            ai_commit_messages: true,
            shortcuts: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

/// Repairs fields a hand edit may have broken. Returns whether anything
/// changed.
fn repair_settings(settings: &mut SettingsDocument) -> bool {
    let mut repaired = false;

    match normalize_theme_id(&settings.terminal_theme, &SUPPORTED_TERMINAL_THEMES) {
        Ok(theme) if theme == settings.terminal_theme => {}
        Ok(theme) => {
            settings.terminal_theme = theme;
            repaired = true;
        }
        Err(_) => {
            settings.terminal_theme = default_terminal_theme();
            repaired = true;
        }
    }

    let accent = normalize_color(settings.accent_color.as_deref()).unwrap_or(None);
    if accent != settings.accent_color {
        settings.accent_color = accent;
        repaired = true;
    }

    let language = settings.language.trim().to_lowercase();
    let language = if language.is_empty() { default_language() } else { language };
    if language != settings.language {
        settings.language = language;
        repaired = true;
    }

    repaired
}

/// Reads the document, filling defaults. A missing file is created; an
/// unreadable one is replaced with defaults.
fn ensure_settings(path: &Path) -> CoreResult<SettingsDocument> {
    let parsed = match read_json_value(path) {
        Ok(Some(value)) => value,
        Ok(None) => {
            let settings = SettingsDocument::default();
            write_json_document(path, &settings)?;
            return Ok(settings);
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "settings.load.recovered");
            let settings = SettingsDocument::default();
            write_json_document(path, &settings)?;
            return Ok(settings);
        }
    };

    let mut settings = match serde_json::from_value::<SettingsDocument>(parsed) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "settings.load.recovered");
            let settings = SettingsDocument::default();
            write_json_document(path, &settings)?;
            return Ok(settings);
        }
    };

    if repair_settings(&mut settings) {
        tracing::info!(path = %path.display(), "settings.load.repaired");
        write_json_document(path, &settings)?;
    }
    Ok(settings)
}

pub struct SettingsStore {
    path: PathBuf,
    current: Mutex<SettingsDocument>,
}

impl SettingsStore {
    pub fn open(path: PathBuf) -> CoreResult<Self> {
        let settings = ensure_settings(&path)?;
        Ok(SettingsStore {
            path,
            current: Mutex::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> SettingsDocument {
        self.lock_current().clone()
    }

    /// Rereads the file, picking up edits made by the UI.
    pub fn reload(&self) -> CoreResult<SettingsDocument> {
        let settings = ensure_settings(&self.path)?;
        *self.lock_current() = settings.clone();
        Ok(settings)
    }

    /// Applies `edit`, validates the result and writes it out.
    pub fn update(&self, edit: impl FnOnce(&mut SettingsDocument)) -> CoreResult<SettingsDocument> {
        let mut next = self.get();
        edit(&mut next);
        next.terminal_theme = normalize_theme_id(&next.terminal_theme, &SUPPORTED_TERMINAL_THEMES)?;
        next.accent_color = normalize_color(next.accent_color.as_deref())?;

        write_json_document(&self.path, &next)?;
        *self.lock_current() = next.clone();
        tracing::info!(path = %self.path.display(), "settings.saved");
        Ok(next)
    }

    fn lock_current(&self) -> MutexGuard<'_, SettingsDocument> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
