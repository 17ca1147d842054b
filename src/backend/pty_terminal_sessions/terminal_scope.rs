use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::backend::common::dtos::ServiceKind;

pub(crate) fn render_terminal_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(|value| value.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Dimmed header written into a service console before the process starts.
pub(crate) fn service_banner(kind: ServiceKind, command: &str, cwd: &str, timestamp: &str) -> String {
    format!(
        "\x1b[2m[{timestamp}] starting {}: {command}\r\n[{timestamp}] cwd: {cwd}\x1b[0m\r\n",
        kind.banner_label()
    )
}

pub(crate) fn exit_footer(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("\r\n[exited with code {code}]\r\n"),
        None => "\r\n[exited with code unknown]\r\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_names_exit_code() {
        assert_eq!(exit_footer(Some(2)), "\r\n[exited with code 2]\r\n");
    }

    #[test]
    fn banner_carries_timestamp_and_command() {
        let banner = service_banner(ServiceKind::Dev, "npm run dev", "/repo/web", "2024-05-01T10:00:00Z");
        assert!(banner.contains("[2024-05-01T10:00:00Z] starting dev server: npm run dev"));
        assert!(banner.ends_with("\x1b[0m\r\n"));
    }

    #[test]
    fn renders_program_with_args() {
        let args = vec!["run".to_string(), "dev".to_string()];
        assert_eq!(render_terminal_command("pnpm", &args), "pnpm run dev");
    }
}
