use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::constants::MAX_OUTPUT_SNIPPET_CHARS;

/// Captured output of a finished child process. `error` is set only when the
/// process could not be launched or awaited at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    pub fn completed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        CommandResult {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: None,
        }
    }
}

pub(crate) async fn run_capture_command(cwd: &Path, binary: &str, args: &[String]) -> CommandResult {
    run_capture_command_with_input(cwd, binary, args, None).await
}

pub(crate) async fn run_capture_command_with_input(
    cwd: &Path,
    binary: &str,
    args: &[String],
    input: Option<&[u8]>,
) -> CommandResult {
    let mut command = Command::new(binary);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            return CommandResult {
                error: Some(format!("Failed to execute {binary}: {error}")),
                ..CommandResult::default()
            }
        }
    };

    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        if let Err(error) = stdin.write_all(bytes).await {
            tracing::debug!(binary, %error, "process.stdin.write_failed");
        }
        drop(stdin);
    }

    match child.wait_with_output().await {
        Ok(output) => CommandResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            error: None,
        },
        Err(error) => CommandResult {
            error: Some(format!("Failed to wait for {binary}: {error}")),
            ..CommandResult::default()
        },
    }
}

pub(crate) fn first_non_empty_line(value: &str) -> Option<String> {
    value
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
}

/// Combined stdout/stderr, trimmed and capped, for surfacing to the UI.
pub(crate) fn command_output_snippet(result: &CommandResult) -> String {
    let combined = [result.stdout.trim(), result.stderr.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let prefix = combined
        .chars()
        .take(MAX_OUTPUT_SNIPPET_CHARS)
        .collect::<String>();
    if prefix.len() < combined.len() {
        format!("{prefix}...")
    } else {
        combined
    }
}

pub(crate) fn command_error_message(result: &CommandResult, fallback: &str) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    first_non_empty_line(&result.stdout).unwrap_or_else(|| fallback.to_string())
}

/// Looks `binary` up on `PATH` the way a spawned child would.
pub(crate) fn resolve_binary_on_path(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    for directory in std::env::split_paths(&paths) {
        let full = directory.join(binary);
        if full.is_file() {
            return Some(full);
        }
        #[cfg(target_os = "windows")]
        {
            let with_ext = directory.join(format!("{binary}.exe"));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_verbatim_stderr() {
        let result = CommandResult::completed(1, "", "error: pathspec 'x' did not match\nhint: y\n");
        assert_eq!(
            command_error_message(&result, "git add failed"),
            "error: pathspec 'x' did not match\nhint: y"
        );
    }

    #[test]
    fn error_message_falls_back_when_streams_are_empty() {
        let result = CommandResult::completed(1, "", "");
        assert_eq!(command_error_message(&result, "git push failed"), "git push failed");
    }

    #[test]
    fn snippet_joins_both_streams() {
        let result = CommandResult::completed(0, "Already up to date.\n", "From origin\n");
        assert_eq!(command_output_snippet(&result), "Already up to date.\nFrom origin");
    }

    #[tokio::test]
    async fn reports_launch_failure_as_error() {
        let cwd = std::env::temp_dir();
        let result =
            run_capture_command(&cwd, "termdeck-definitely-missing-binary", &[]).await;
        assert!(result.error.is_some());
        assert!(!result.succeeded());
    }
}
