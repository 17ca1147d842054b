use async_trait::async_trait;
use std::path::Path;

use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::common::process_command::{run_capture_command, CommandResult};

/// Runs Git. A result with `error` set means Git could not be launched in
/// `cwd` at all; a non-zero exit is an ordinary outcome.
#[async_trait]
pub trait GitExecutor: Send + Sync {
    async fn run(&self, cwd: &Path, args: &[String]) -> CommandResult;
}

/// Shells out to the `git` binary found on `PATH`.
pub struct CliGitExecutor {
    binary: String,
}

impl CliGitExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        CliGitExecutor {
            binary: binary.into(),
        }
    }
}

impl Default for CliGitExecutor {
    fn default() -> Self {
        CliGitExecutor::new("git")
    }
}

#[async_trait]
impl GitExecutor for CliGitExecutor {
    async fn run(&self, cwd: &Path, args: &[String]) -> CommandResult {
        let started = std::time::Instant::now();
        let result = run_capture_command(cwd, &self.binary, args).await;
        tracing::debug!(
            cwd = %cwd.display(),
            subcommand = args.first().map(String::as_str).unwrap_or_default(),
            exit_code = ?result.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "git.exec.done"
        );
        result
    }
}

/// Convenience wrapper that turns launch failures into environment errors.
pub(crate) async fn run_git(
    executor: &dyn GitExecutor,
    cwd: &Path,
    args: &[&str],
) -> CoreResult<CommandResult> {
    let args = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
    run_git_owned(executor, cwd, &args).await
}

pub(crate) async fn run_git_owned(
    executor: &dyn GitExecutor,
    cwd: &Path,
    args: &[String],
) -> CoreResult<CommandResult> {
    let result = executor.run(cwd, args).await;
    match result.error {
        Some(error) => Err(CoreError::ExternalFailure(error)),
        None => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_is_an_environment_failure() {
        let executor = CliGitExecutor::default();
        let result = run_git(&executor, Path::new("/termdeck/does/not/exist"), &["status"]).await;
        assert!(matches!(result, Err(CoreError::ExternalFailure(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_an_environment_failure() {
        let executor = CliGitExecutor::new("termdeck-no-such-git");
        let cwd = std::env::temp_dir();
        assert!(run_git(&executor, &cwd, &["--version"]).await.is_err());
    }
}
