use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::backend::common::constants::{
    ASSISTANT_PRINT_FLAG, MAX_COMMIT_BODY_CHARS, MAX_COMMIT_SUBJECT_CHARS, MAX_ORACLE_DIFF_BYTES,
};
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::common::process_command::{command_error_message, run_capture_command_with_input};
use crate::git_gh::{GitFileEntry, GitFileStatus};
use crate::terminal::strip_ansi_sequences;

const ORACLE_PROMPT: &str = "Write a git commit message for the diff on stdin. \
Use the imperative mood, keep the first line under 72 characters, add a short body only \
if the change needs one. Output only the commit message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Ai,
    Heuristic,
}

/// Files sharing a top-level directory and status class, with a message of their own for a
/// split commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeGroup {
    pub area: String,
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMessage {
    pub message: String,
    pub source: MessageSource,
    /// More than one group is a hint that the change could be split; it is
    /// never acted on automatically.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<ChangeGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub diff: String,
    pub files: Vec<String>,
}

/// External message suggester. Replies are sanitized before use.
#[async_trait]
pub trait CommitMessageOracle: Send + Sync {
    async fn suggest(&self, cwd: &Path, request: &OracleRequest) -> CoreResult<String>;
}

/// Runs the Assistant CLI in print mode with the diff on stdin.
pub struct AssistantCliOracle {
    binary: String,
}

impl AssistantCliOracle {
    pub fn new(binary: impl Into<String>) -> Self {
        AssistantCliOracle {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl CommitMessageOracle for AssistantCliOracle {
    async fn suggest(&self, cwd: &Path, request: &OracleRequest) -> CoreResult<String> {
        let diff = truncate_diff(&request.diff, MAX_ORACLE_DIFF_BYTES);
        let input = format!(
            "Files:\n{}\n\n<diff>\n{diff}\n</diff>\n",
            request.files.join("\n")
        );
        let args = vec![ASSISTANT_PRINT_FLAG.to_string(), ORACLE_PROMPT.to_string()];
        let result = run_capture_command_with_input(cwd, &self.binary, &args, Some(input.as_bytes())).await;
        if !result.succeeded() {
            return Err(CoreError::ExternalFailure(command_error_message(
                &result,
                "commit message oracle failed",
            )));
        }
        Ok(result.stdout)
    }
}

/// Cuts `content` at a line boundary no later than `max_bytes`.
pub(crate) fn truncate_diff(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &content[..end];
    match truncated.rfind('\n') {
        Some(newline) => truncated[..newline].to_string(),
        None => truncated.to_string(),
    }
}

fn top_level_area(path: &str) -> String {
    match path.split_once('/') {
        Some((area, _)) if !area.is_empty() => area.to_string(),
        _ => "root".to_string(),
    }
}

/// Status class used to split an area into separate groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ChangeKind {
    Add,
    Update,
    Remove,
    Rename,
}

impl ChangeKind {
    fn of(status: GitFileStatus) -> Self {
        match status {
            GitFileStatus::Added | GitFileStatus::Untracked => ChangeKind::Add,
            GitFileStatus::Deleted => ChangeKind::Remove,
            GitFileStatus::Renamed => ChangeKind::Rename,
            GitFileStatus::Modified => ChangeKind::Update,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ChangeKind::Add => "Add",
            ChangeKind::Update => "Update",
            ChangeKind::Remove => "Remove",
            ChangeKind::Rename => "Rename",
        }
    }
}

fn verb_for(statuses: &[GitFileStatus]) -> &'static str {
    let mut kinds = statuses.iter().map(|status| ChangeKind::of(*status));
    match kinds.next() {
        Some(first) if kinds.all(|kind| kind == first) => first.verb(),
        _ => "Update",
    }
}

fn summarize(files: &[&GitFileEntry], area: Option<&str>) -> String {
    let statuses = files.iter().map(|file| file.status).collect::<Vec<_>>();
    let verb = verb_for(&statuses);
    match (files, area) {
        ([single], _) => format!("{verb} {}", single.path),
        (_, Some(area)) if area != "root" => format!("{verb} {} files in {area}", files.len()),
        (_, Some(_)) => format!("{verb} {} top-level files", files.len()),
        (_, None) => format!("{verb} {} files", files.len()),
    }
}

/// Groups files by top-level directory and status class and writes a
/// one-line summary.
pub fn heuristic_message(files: &[GitFileEntry]) -> GeneratedMessage {
    let mut by_group: BTreeMap<(String, ChangeKind), Vec<&GitFileEntry>> = BTreeMap::new();
    for file in files {
        by_group
            .entry((top_level_area(&file.path), ChangeKind::of(file.status)))
            .or_default()
            .push(file);
    }
    let areas = by_group
        .keys()
        .map(|(area, _)| area.as_str())
        .collect::<BTreeSet<_>>();

    let all = files.iter().collect::<Vec<_>>();
    let message = match areas.len() {
        0 => "Update files".to_string(),
        1 => summarize(&all, areas.first().copied()),
        count => {
            let mut listed = areas.iter().take(3).copied().collect::<Vec<_>>().join(", ");
            if count > 3 {
                listed.push_str(&format!(" and {} more", count - 3));
            }
            format!("{} across {listed}", summarize(&all, None))
        }
    };

    let groups = if by_group.len() > 1 {
        by_group
            .iter()
            .map(|((area, _), entries)| ChangeGroup {
                area: area.clone(),
                message: summarize(entries, Some(area.as_str())),
                files: entries.iter().map(|entry| entry.path.clone()).collect(),
            })
            .collect()
    } else {
        Vec::new()
    };

    GeneratedMessage {
        message,
        source: MessageSource::Heuristic,
        groups,
    }
}

fn strip_wrapping(value: &str) -> &str {
    let mut current = value.trim();
    loop {
        let stripped = ['"', '\'', '`'].iter().find_map(|quote| {
            current
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        });
        match stripped {
            Some(inner) => current = inner.trim(),
            None => return current,
        }
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Cleans an oracle reply into `subject[\n\nbody]`. Returns `None` when
/// nothing usable is left.
pub(crate) fn sanitize_oracle_reply(raw: &str) -> Option<String> {
    let without_escapes = strip_ansi_sequences(raw);
    let printable = without_escapes
        .chars()
        .filter_map(|ch| match ch {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            ch if ch.is_control() => None,
            ch => Some(ch),
        })
        .collect::<String>();

    let lines = printable
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>();
    let joined = lines.join("\n");
    let mut text = strip_wrapping(&joined).to_string();

    let label = "commit message:";
    if text
        .get(..label.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(label))
    {
        text = strip_wrapping(&text[label.len()..]).to_string();
    }

    let mut lines = text.lines().map(str::trim_end);
    let subject = lines
        .by_ref()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(strip_wrapping)?;
    let subject = truncate_chars(subject, MAX_COMMIT_SUBJECT_CHARS);
    if subject.is_empty() {
        return None;
    }

    let body = lines.collect::<Vec<_>>().join("\n");
    let body = truncate_chars(body.trim(), MAX_COMMIT_BODY_CHARS);
    if body.is_empty() {
        Some(subject)
    } else {
        Some(format!("{subject}\n\n{body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, status: GitFileStatus) -> GitFileEntry {
        GitFileEntry {
            path: path.to_string(),
            status,
            additions: None,
            deletions: None,
        }
    }

    #[test]
    fn single_file_names_the_file() {
        let generated = heuristic_message(&[entry("src/lib.rs", GitFileStatus::Modified)]);
        assert_eq!(generated.message, "Update src/lib.rs");
        assert_eq!(generated.source, MessageSource::Heuristic);
        assert!(generated.groups.is_empty());
    }

    #[test]
    fn one_area_counts_files() {
        let generated = heuristic_message(&[
            entry("docs/a.md", GitFileStatus::Untracked),
            entry("docs/b.md", GitFileStatus::Added),
        ]);
        assert_eq!(generated.message, "Add 2 files in docs");
    }

    #[test]
    fn several_areas_suggest_a_split() {
        let generated = heuristic_message(&[
            entry("src/x.ts", GitFileStatus::Modified),
            entry("src/y.ts", GitFileStatus::Modified),
            entry("tests/x.test.ts", GitFileStatus::Added),
            entry("README.md", GitFileStatus::Modified),
        ]);
        assert_eq!(generated.message, "Update 4 files across root, src, tests");
        assert_eq!(generated.groups.len(), 3);
        assert_eq!(generated.groups[1].area, "src");
        assert_eq!(generated.groups[1].message, "Update 2 files in src");
        assert_eq!(generated.groups[2].message, "Add tests/x.test.ts");
    }

    #[test]
    fn mixed_statuses_in_one_area_split_by_status() {
        let generated = heuristic_message(&[
            entry("docs/a.md", GitFileStatus::Added),
            entry("docs/b.md", GitFileStatus::Modified),
            entry("docs/c.md", GitFileStatus::Modified),
            entry("docs/old.md", GitFileStatus::Deleted),
        ]);
        assert_eq!(generated.message, "Update 4 files in docs");
        let messages = generated
            .groups
            .iter()
            .map(|group| group.message.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec!["Add docs/a.md", "Update 2 files in docs", "Remove docs/old.md"]
        );
        assert!(generated.groups.iter().all(|group| group.area == "docs"));
    }

    #[test]
    fn sanitizer_strips_fences_labels_and_escapes() {
        let raw = "\x1b[32m```\nCommit message: \"Fix login redirect\"\n\nHandles expired tokens.\n```\x1b[0m\n";
        assert_eq!(
            sanitize_oracle_reply(raw).as_deref(),
            Some("Fix login redirect\n\nHandles expired tokens.")
        );
    }

    #[test]
    fn sanitizer_caps_the_subject() {
        let raw = "x".repeat(150);
        assert_eq!(sanitize_oracle_reply(&raw).unwrap().chars().count(), 100);
    }

    #[test]
    fn sanitizer_rejects_empty_replies() {
        assert_eq!(sanitize_oracle_reply("```\n```\n"), None);
        assert_eq!(sanitize_oracle_reply("  \"\"  "), None);
    }

    #[test]
    fn truncates_diff_on_line_boundary() {
        assert_eq!(truncate_diff("line one\nline two\n", 12), "line one");
        assert_eq!(truncate_diff("short", 100), "short");
    }
}
