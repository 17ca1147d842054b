use regex::Regex;
use std::sync::LazyLock;

use crate::backend::common::constants::PORT_SCAN_CARRY_BYTES;
use crate::terminal::strip_ansi_sequences;

// A port only counts once a non-digit follows it, so a number split across
// two chunks is never read short.
static LOCAL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhttps?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]|[a-z0-9.-]+):(\d{2,5})\D")
        .expect("valid URL pattern")
});
static PORT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bport\s*[:=]?\s*(\d{2,5})\D").expect("valid port pattern")
});

/// Scans service output for the port it listens on.
#[derive(Debug, Default)]
pub(crate) struct PortDetector {
    carry: String,
}

impl PortDetector {
    /// Returns the first plausible port found in the output seen so far.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Option<u16> {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(&String::from_utf8_lossy(chunk));
        let visible = strip_ansi_sequences(&text);

        let found = [&*LOCAL_URL, &*PORT_PHRASE].into_iter().find_map(|pattern| {
            pattern
                .captures_iter(&visible)
                .filter_map(|captures| captures.get(1))
                .filter_map(|port| port.as_str().parse::<u16>().ok())
                .find(|port| *port > 0)
        });
        if found.is_none() {
            self.carry = tail_at_char_boundary(&text, PORT_SCAN_CARRY_BYTES).to_string();
        }
        found
    }
}

fn tail_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_local_urls_through_color_codes() {
        let mut detector = PortDetector::default();
        let port = detector.feed(b"  \x1b[32m\xe2\x9e\x9c\x1b[39m  Local:   \x1b[36mhttp://localhost:\x1b[1m5173\x1b[22m/\x1b[39m\n");
        assert_eq!(port, Some(5173));
    }

    #[test]
    fn waits_for_a_port_split_across_chunks() {
        let mut detector = PortDetector::default();
        assert_eq!(detector.feed(b"ready - started server on http://0.0.0.0:30"), None);
        assert_eq!(detector.feed(b"00, url: http://localhost:3000\n"), Some(3000));
    }

    #[test]
    fn understands_listening_on_port_phrases() {
        let mut detector = PortDetector::default();
        assert_eq!(detector.feed(b"Server listening on port 8080\n"), Some(8080));
    }

    #[test]
    fn ignores_output_without_ports() {
        let mut detector = PortDetector::default();
        assert_eq!(detector.feed(b"compiling 42 modules...\n"), None);
        assert_eq!(detector.feed(b"done in 1.2s\n"), None);
    }

    #[test]
    fn carry_stays_bounded() {
        let mut detector = PortDetector::default();
        detector.feed("é".repeat(400).as_bytes());
        assert!(detector.carry.len() <= PORT_SCAN_CARRY_BYTES);
    }
}
