use serde::Serialize;

use crate::backend::common::constants::SUPPORTED_TERMINAL_THEMES;
use crate::backend::common::errors::CoreError;
use crate::workspace::normalize_theme_id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalTheme {
    pub id: String,
    pub foreground: String,
    pub background: String,
    pub cursor: String,
    pub selection: String,
    /// black, red, green, yellow, blue, magenta, cyan, white, then the
    /// bright variants in the same order.
    pub ansi: [String; 16],
}

fn palette(id: &str, base: [&str; 4], ansi: [&str; 16]) -> TerminalTheme {
    TerminalTheme {
        id: id.to_string(),
        foreground: base[0].to_string(),
        background: base[1].to_string(),
        cursor: base[2].to_string(),
        selection: base[3].to_string(),
        ansi: ansi.map(str::to_string),
    }
}

pub fn builtin_theme(id: &str) -> Result<TerminalTheme, CoreError> {
    let id = normalize_theme_id(id, &SUPPORTED_TERMINAL_THEMES)?;
    let theme = match id.as_str() {
        "claude" => palette(
            "claude",
            ["#e8e6e3", "#1f1e1d", "#d97757", "#4a3f38"],
            [
                "#2b2a28", "#e06c5a", "#8fbf7a", "#e5b567", "#6f9fd8", "#c591d4", "#6cc0c0", "#d8d4cf",
                "#5c5a56", "#f08a76", "#a8d596", "#f2c98a", "#8fb7ea", "#d7aae3", "#8ad6d6", "#f5f3f0",
            ],
        ),
        "dark" => palette(
            "dark",
            ["#d4d4d4", "#1e1e1e", "#aeafad", "#264f78"],
            [
                "#000000", "#cd3131", "#0dbc79", "#e5e510", "#2472c8", "#bc3fbc", "#11a8cd", "#e5e5e5",
                "#666666", "#f14c4c", "#23d18b", "#f5f543", "#3b8eea", "#d670d6", "#29b8db", "#ffffff",
            ],
        ),
        "light" => palette(
            "light",
            ["#333333", "#ffffff", "#333333", "#add6ff"],
            [
                "#000000", "#cd3131", "#00bc00", "#949800", "#0451a5", "#bc05bc", "#0598bc", "#555555",
                "#666666", "#cd3131", "#14ce14", "#b5ba00", "#0451a5", "#bc05bc", "#0598bc", "#a5a5a5",
            ],
        ),
        "dracula" => palette(
            "dracula",
            ["#f8f8f2", "#282a36", "#f8f8f2", "#44475a"],
            [
                "#21222c", "#ff5555", "#50fa7b", "#f1fa8c", "#bd93f9", "#ff79c6", "#8be9fd", "#f8f8f2",
                "#6272a4", "#ff6e6e", "#69ff94", "#ffffa5", "#d6acff", "#ff92df", "#a4ffff", "#ffffff",
            ],
        ),
        _ => palette(
            "solarized-dark",
            ["#839496", "#002b36", "#93a1a1", "#073642"],
            [
                "#073642", "#dc322f", "#859900", "#b58900", "#268bd2", "#d33682", "#2aa198", "#eee8d5",
                "#002b36", "#cb4b16", "#586e75", "#657b83", "#839496", "#6c71c4", "#93a1a1", "#fdf6e3",
            ],
        ),
    };
    Ok(theme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_id_has_a_palette() {
        for id in SUPPORTED_TERMINAL_THEMES {
            assert_eq!(builtin_theme(id).unwrap().id, id);
        }
    }

    #[test]
    fn unknown_theme_is_invalid_input() {
        assert!(matches!(builtin_theme("neon"), Err(CoreError::InvalidInput(_))));
    }
}
