use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::backend::common::process_command::resolve_binary_on_path;
use crate::backend::workspace_metadata_settings::core_config::CoreConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryCheck {
    pub name: String,
    pub configured: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

/// Whether the external tools the core drives can be launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupHealth {
    pub git: BinaryCheck,
    pub assistant: BinaryCheck,
}

impl StartupHealth {
    pub fn is_healthy(&self) -> bool {
        self.git.available && self.assistant.available
    }
}

fn is_launchable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }

        false
    }

    #[cfg(not(unix))]
    {
        true
    }
}

pub fn check_binary(name: &str, configured: &str) -> BinaryCheck {
    let resolved = resolve_binary_on_path(configured);
    let available = resolved.as_deref().map(is_launchable).unwrap_or(false);
    let issue = match (&resolved, available) {
        (None, _) => Some(format!("{name} binary \"{configured}\" was not found on PATH.")),
        (Some(path), false) => Some(format!("{} is not executable.", path.display())),
        _ => None,
    };

    BinaryCheck {
        name: name.to_string(),
        configured: configured.to_string(),
        resolved_path: resolved.map(|path| path.display().to_string()),
        available,
        issue,
    }
}

/// Resolves git and the Assistant CLI; a missing tool is logged, not fatal.
pub fn check_startup_health(config: &CoreConfig) -> StartupHealth {
    let health = StartupHealth {
        git: check_binary("git", &config.git_bin),
        assistant: check_binary("assistant", &config.assistant_bin),
    };

    for check in [&health.git, &health.assistant] {
        match &check.issue {
            Some(issue) => tracing::warn!(binary = %check.name, %issue, "startup.binary.missing"),
            None => tracing::debug!(
                binary = %check.name,
                path = check.resolved_path.as_deref().unwrap_or_default(),
                "startup.binary.ok"
            ),
        }
    }
    health
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_to_missing_file_is_reported() {
        let check = check_binary("assistant", "/definitely/not/here/claude");
        assert!(!check.available);
        assert!(check.resolved_path.is_none());
        assert!(check.issue.unwrap().contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_not_available() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o644)).unwrap();
        let check = check_binary("tool", tool.to_str().unwrap());
        assert!(check.resolved_path.is_some());
        assert!(!check.available);

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        let check = check_binary("tool", tool.to_str().unwrap());
        assert!(check.available);
        assert!(check.issue.is_none());
    }
}
