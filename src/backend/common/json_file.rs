use serde::Serialize;
use std::fs;
use std::path::Path;

use super::errors::CoreError;

/// Pretty JSON with a trailing newline, written through a sibling temp file
/// and renamed into place.
pub(crate) fn write_json_document<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            CoreError::Persistence(format!("Failed to create {}: {error}", parent.display()))
        })?;
    }

    let body = serde_json::to_string_pretty(value)
        .map_err(|error| CoreError::Persistence(format!("Failed to serialize {}: {error}", path.display())))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, format!("{body}\n"))
        .map_err(|error| CoreError::Persistence(format!("Failed to write {}: {error}", tmp_path.display())))?;
    fs::rename(&tmp_path, path)
        .map_err(|error| CoreError::Persistence(format!("Failed to replace {}: {error}", path.display())))
}

/// `Ok(None)` when the file does not exist yet.
pub(crate) fn read_json_value(path: &Path) -> Result<Option<serde_json::Value>, CoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(CoreError::Persistence(format!(
                "Failed to read {}: {error}",
                path.display()
            )))
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|error| CoreError::Persistence(format!("Failed to parse {}: {error}", path.display())))
}
