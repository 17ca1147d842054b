use std::path::{Component, Path, PathBuf};

use crate::backend::common::errors::CoreError;

const MAX_DISPLAY_NAME_CHARS: usize = 120;

/// Key under which per-directory state (Git FIFO, staging, merge tracking) is
/// stored. Two project ids that point at the same directory share one key.
pub(crate) fn canonical_path_key(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| lexically_normalize(path))
        .display()
        .to_string()
}

pub(crate) fn lexically_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Project paths must be absolute; they are stored canonicalized when the
/// directory exists and lexically normalized otherwise.
pub(crate) fn normalize_project_path(value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(
            "path must be a non-empty string.".to_string(),
        ));
    }
    if trimmed.contains('\0') {
        return Err(CoreError::InvalidInput(
            "path cannot contain null bytes.".to_string(),
        ));
    }

    let candidate = Path::new(trimmed);
    if !candidate.is_absolute() {
        return Err(CoreError::InvalidInput(
            "path must be an absolute path.".to_string(),
        ));
    }

    Ok(canonical_path_key(candidate))
}

pub(crate) fn normalize_display_name(value: &str, field_name: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "{field_name} must be a non-empty string."
        )));
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(CoreError::InvalidInput(format!(
            "{field_name} must be {MAX_DISPLAY_NAME_CHARS} characters or fewer."
        )));
    }
    Ok(trimmed.to_string())
}

/// Accepts `#rgb` / `#rrggbb` (any case); empty clears the color.
pub(crate) fn normalize_color(value: Option<&str>) -> Result<Option<String>, CoreError> {
    let Some(trimmed) = value.map(str::trim).filter(|entry| !entry.is_empty()) else {
        return Ok(None);
    };

    let digits = trimmed.strip_prefix('#').unwrap_or_default();
    let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(CoreError::InvalidInput(format!(
            "color must be a hex value like #3b82f6 (got \"{trimmed}\")."
        )));
    }
    Ok(Some(trimmed.to_lowercase()))
}

pub(crate) fn normalize_theme_id(
    value: &str,
    supported_themes: &[&str],
) -> Result<String, CoreError> {
    let normalized = value.trim().to_lowercase();
    if supported_themes.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(CoreError::InvalidInput(format!(
            "theme must be one of: {}.",
            supported_themes.join(", ")
        )))
    }
}

pub(crate) fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
}
