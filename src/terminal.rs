use regex::Regex;
use std::sync::LazyLock;

use crate::backend::common::constants::{
    ASSISTANT_RESUME_FLAG, ASSISTANT_SKIP_PERMISSIONS_FLAG, DEFAULT_TERMINAL_COLS,
    DEFAULT_TERMINAL_ROWS, MAX_TERMINAL_DIMENSION, MIN_TERMINAL_DIMENSION,
};
use crate::backend::common::dtos::TerminalDims;
use crate::backend::common::errors::CoreError;

/// Program and arguments handed to the PTY service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TerminalLaunch {
    pub program: String,
    pub args: Vec<String>,
}

pub(crate) fn normalize_terminal_dimension(
    value: Option<u16>,
    default: u16,
    min: u16,
    max: u16,
) -> u16 {
    value
        .map(|candidate| candidate.max(min).min(max))
        .unwrap_or(default)
}

pub(crate) fn normalize_terminal_dims(cols: Option<u16>, rows: Option<u16>) -> TerminalDims {
    TerminalDims {
        cols: normalize_terminal_dimension(
            cols,
            DEFAULT_TERMINAL_COLS,
            MIN_TERMINAL_DIMENSION,
            MAX_TERMINAL_DIMENSION,
        ),
        rows: normalize_terminal_dimension(
            rows,
            DEFAULT_TERMINAL_ROWS,
            MIN_TERMINAL_DIMENSION,
            MAX_TERMINAL_DIMENSION,
        ),
    }
}

pub(crate) fn default_shell() -> String {
    let from_env = if cfg!(target_os = "windows") {
        std::env::var("COMSPEC")
    } else {
        std::env::var("SHELL")
    };
    from_env
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            if cfg!(target_os = "windows") {
                "cmd.exe".to_string()
            } else {
                "/bin/sh".to_string()
            }
        })
}

pub(crate) fn plain_shell_launch(shell: &str) -> TerminalLaunch {
    let args = if cfg!(target_os = "windows") {
        Vec::new()
    } else {
        vec!["-l".to_string()]
    };
    TerminalLaunch {
        program: shell.to_string(),
        args,
    }
}

/// The Assistant CLI, optionally resuming an earlier conversation. The
/// descriptor is passed through untouched.
pub(crate) fn assistant_launch(
    assistant_bin: &str,
    resume_descriptor: Option<&str>,
    skip_permissions: bool,
) -> Result<TerminalLaunch, CoreError> {
    let mut args = Vec::new();
    if let Some(descriptor) = resume_descriptor.map(str::trim).filter(|value| !value.is_empty()) {
        if descriptor.starts_with('-') || descriptor.contains('\0') {
            return Err(CoreError::InvalidInput(
                "resumeDescriptor cannot start with '-' or contain null bytes.".to_string(),
            ));
        }
        args.push(ASSISTANT_RESUME_FLAG.to_string());
        args.push(descriptor.to_string());
    }
    if skip_permissions {
        args.push(ASSISTANT_SKIP_PERMISSIONS_FLAG.to_string());
    }
    Ok(TerminalLaunch {
        program: assistant_bin.to_string(),
        args,
    })
}

pub(crate) fn service_command_launch(command: &str) -> Result<TerminalLaunch, CoreError> {
    let mut tokens = parse_command_tokens(command, "service command")?;
    let program = tokens.remove(0);
    Ok(TerminalLaunch {
        program,
        args: tokens,
    })
}

/// Splits a command line on whitespace, honoring single/double quotes and
/// backslash escapes outside single quotes.
pub(crate) fn parse_command_tokens(command: &str, field_name: &str) -> Result<Vec<String>, CoreError> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "{field_name} must be a non-empty command string."
        )));
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escaping = false;

    for ch in trimmed.chars() {
        if escaping {
            current.push(ch);
            escaping = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => escaping = true,
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            ch if ch.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            ch => current.push(ch),
        }
    }

    if escaping {
        return Err(CoreError::InvalidInput(format!(
            "{field_name} ends with an unfinished escape (\\)."
        )));
    }
    if in_single_quote || in_double_quote {
        return Err(CoreError::InvalidInput(format!(
            "{field_name} has an unmatched quote."
        )));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "{field_name} must include an executable command."
        )));
    }

    Ok(tokens)
}

static ANSI_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[@-Z\\-_]")
        .expect("valid ANSI pattern")
});

/// Removes CSI and OSC escape sequences, leaving printable text and control
/// characters in place.
pub(crate) fn strip_ansi_sequences(text: &str) -> String {
    ANSI_SEQUENCE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_and_title_sequences() {
        let raw = "\x1b]0;title\x07\x1b[1;32mready\x1b[0m on \x1b[4mhttp://localhost:3000\x1b[24m";
        assert_eq!(strip_ansi_sequences(raw), "ready on http://localhost:3000");
    }

    #[test]
    fn parses_service_command_with_quotes() {
        let launch = service_command_launch("npm run dev -- --host \"0.0.0.0\"").unwrap();
        assert_eq!(launch.program, "npm");
        assert_eq!(launch.args, vec!["run", "dev", "--", "--host", "0.0.0.0"]);
    }

    #[test]
    fn rejects_unmatched_quotes() {
        assert!(parse_command_tokens("echo 'oops", "service command").is_err());
        assert!(parse_command_tokens("   ", "service command").is_err());
    }

    #[test]
    fn assistant_launch_orders_resume_before_skip_flag() {
        let launch = assistant_launch("claude", Some("abc-123"), true).unwrap();
        assert_eq!(
            launch.args,
            vec!["--resume", "abc-123", "--dangerously-skip-permissions"]
        );
        let bare = assistant_launch("claude", Some("  "), false).unwrap();
        assert!(bare.args.is_empty());
    }

    #[test]
    fn rejects_flag_shaped_resume_descriptor() {
        assert!(assistant_launch("claude", Some("--help"), false).is_err());
    }

    #[test]
    fn normalizes_dims_with_defaults_and_bounds() {
        assert_eq!(
            normalize_terminal_dims(None, Some(1)),
            TerminalDims { cols: 120, rows: 2 }
        );
        assert_eq!(normalize_terminal_dims(Some(900), None).cols, 500);
    }
}
