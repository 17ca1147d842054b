use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::backend::common::errors::CoreError;

/// Per-file classification shown in the commit panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GitFileStatus {
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "D")]
    Deleted,
    #[serde(rename = "R")]
    Renamed,
    #[serde(rename = "?")]
    Untracked,
}

impl GitFileStatus {
    pub fn code(&self) -> char {
        match self {
            GitFileStatus::Modified => 'M',
            GitFileStatus::Added => 'A',
            GitFileStatus::Deleted => 'D',
            GitFileStatus::Renamed => 'R',
            GitFileStatus::Untracked => '?',
        }
    }
}

impl fmt::Display for GitFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitFileEntry {
    pub path: String,
    pub status: GitFileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GitBranchHeader {
    pub branch: Option<String>,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PorcelainStatus {
    pub header: GitBranchHeader,
    pub files: Vec<GitFileEntry>,
    pub conflicts: Vec<String>,
}

/// Parses `git status --porcelain=v1 --branch`. Files keep Git's order.
pub(crate) fn parse_porcelain_status(output: &str) -> PorcelainStatus {
    let mut status = PorcelainStatus::default();
    let mut seen = HashSet::new();

    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        if let Some(header) = line.strip_prefix("## ") {
            status.header = parse_branch_header(header);
            continue;
        }

        let Some(code) = line.get(..2) else {
            continue;
        };
        let Some(path) = normalize_git_status_path(line.get(3..).unwrap_or_default()) else {
            continue;
        };
        let bytes = code.as_bytes();
        let (x, y) = (bytes[0] as char, bytes[1] as char);

        if is_unmerged(x, y) {
            status.conflicts.push(path.clone());
        }
        let file_status = classify_status_code(x, y);
        if seen.insert(path.clone()) {
            status.files.push(GitFileEntry {
                path,
                status: file_status,
                additions: None,
                deletions: None,
            });
        }
    }

    status
}

fn is_unmerged(x: char, y: char) -> bool {
    matches!(
        (x, y),
        ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A') | ('U', 'U')
    )
}

fn classify_status_code(x: char, y: char) -> GitFileStatus {
    if x == '?' || y == '?' {
        return GitFileStatus::Untracked;
    }
    if is_unmerged(x, y) {
        return GitFileStatus::Modified;
    }
    if matches!(x, 'R' | 'C') || matches!(y, 'R' | 'C') {
        return GitFileStatus::Renamed;
    }
    if x == 'A' {
        return GitFileStatus::Added;
    }
    if x == 'D' || y == 'D' {
        return GitFileStatus::Deleted;
    }
    GitFileStatus::Modified
}

/// `main...origin/main [ahead 2, behind 1]`, `No commits yet on main`,
/// `HEAD (no branch)`.
pub(crate) fn parse_branch_header(header: &str) -> GitBranchHeader {
    let header = header.trim();
    let mut parsed = GitBranchHeader::default();

    let (names, details) = match header.find(" [") {
        Some(index) => (&header[..index], Some(&header[index + 2..])),
        None => (header, None),
    };

    if let Some(branch) = names
        .strip_prefix("No commits yet on ")
        .or_else(|| names.strip_prefix("Initial commit on "))
    {
        parsed.branch = Some(branch.trim().to_string());
    } else if names.starts_with("HEAD (no branch)") {
        parsed.branch = None;
    } else if let Some((local, upstream)) = names.split_once("...") {
        parsed.branch = Some(local.trim().to_string());
        parsed.upstream = Some(upstream.trim().to_string()).filter(|value| !value.is_empty());
    } else if !names.is_empty() {
        parsed.branch = Some(names.to_string());
    }

    if let Some(details) = details {
        let details = details.trim_end_matches(']');
        for part in details.split(',') {
            let token = part.trim();
            if let Some(value) = token.strip_prefix("ahead ") {
                parsed.ahead = value.trim().parse::<u32>().unwrap_or(0);
            } else if let Some(value) = token.strip_prefix("behind ") {
                parsed.behind = value.trim().parse::<u32>().unwrap_or(0);
            } else if token == "gone" {
                parsed.upstream = None;
            }
        }
    }

    parsed
}

/// Parses `git diff --numstat`. Binary files (`-`) carry no counts.
pub(crate) fn parse_numstat(output: &str) -> HashMap<String, (Option<u32>, Option<u32>)> {
    let mut counts = HashMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let path = resolve_numstat_rename(path.trim());
        if path.is_empty() {
            continue;
        }
        counts.insert(path, (added.trim().parse().ok(), deleted.trim().parse().ok()));
    }
    counts
}

/// `src/{old => new}/file.rs` and `old => new` both resolve to the new path.
fn resolve_numstat_rename(path: &str) -> String {
    if let (Some(open), Some(close)) = (path.find('{'), path.find('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((_, new_part)) = inner.split_once(" => ") {
                let joined = format!("{}{}{}", &path[..open], new_part, &path[close + 1..]);
                return joined.replace("//", "/");
            }
        }
    }
    if let Some((_, new_path)) = path.split_once(" => ") {
        return new_path.trim().to_string();
    }
    unquote_git_path(path)
}

/// Local branch names from `git branch --format=%(refname:short)`.
pub(crate) fn parse_local_branches(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('('))
        .map(str::to_string)
        .collect()
}

/// Remote branch names from `git branch -r --format=%(refname:short)`,
/// without symbolic `HEAD` entries or bare remote names.
pub(crate) fn parse_remote_branches(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("->"))
        .filter(|line| line.contains('/') && !line.ends_with("/HEAD"))
        .map(str::to_string)
        .collect()
}

/// Paths passed to `git add`. Entries that Git could read as options are
/// refused.
pub(crate) fn normalize_git_file_list(files: &[String]) -> Result<Vec<String>, CoreError> {
    let mut normalized = Vec::new();
    let mut seen = HashSet::new();

    for file in files {
        let trimmed = file.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidInput(
                "files entries must be non-empty strings.".to_string(),
            ));
        }
        if trimmed.contains('\0') {
            return Err(CoreError::InvalidInput(
                "files entries cannot contain null bytes.".to_string(),
            ));
        }
        if trimmed.starts_with('-') {
            return Err(CoreError::InvalidInput(format!(
                "files entry \"{trimmed}\" cannot start with '-'."
            )));
        }
        if seen.insert(trimmed.to_string()) {
            normalized.push(trimmed.to_string());
        }
    }

    Ok(normalized)
}

pub(crate) fn validate_branch_name(value: &str) -> Result<String, CoreError> {
    let name = value.trim();
    let invalid = name.is_empty()
        || name.starts_with('-')
        || name.starts_with('/')
        || name.ends_with('/')
        || name.ends_with('.')
        || name.ends_with(".lock")
        || name.contains("..")
        || name.contains("@{")
        || name == "@"
        || name.chars().any(|ch| {
            ch.is_whitespace() || ch.is_control() || matches!(ch, '~' | '^' | ':' | '?' | '*' | '[' | '\\')
        });
    if invalid {
        return Err(CoreError::InvalidInput(format!(
            "\"{name}\" is not a valid branch name."
        )));
    }
    Ok(name.to_string())
}

/// Splits a remote into `(host, owner, repo)`; accepts scp-like SSH
/// remotes and scheme URLs.
pub(crate) fn normalize_remote_repo_info(remote_url: &str) -> Option<(String, String, String)> {
    let trimmed = remote_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let sanitized = trimmed
        .split_once('#')
        .map(|(value, _)| value)
        .unwrap_or(trimmed);
    let sanitized = sanitized
        .split_once('?')
        .map(|(value, _)| value)
        .unwrap_or(sanitized)
        .trim_end_matches('/');

    if !sanitized.contains("://") {
        let without_user = sanitized
            .split_once('@')
            .map(|(_, value)| value)
            .unwrap_or(sanitized);
        if let Some((host, path)) = without_user.split_once(':') {
            if !host.contains('/') && path.contains('/') {
                return normalize_remote_host_and_path(host, path);
            }
        }
        return None;
    }

    let parsed = url::Url::parse(sanitized).ok()?;
    let host = parsed.host_str()?;
    normalize_remote_host_and_path(host, parsed.path())
}

/// Accepts scheme URLs Git understands, scp-like remotes and absolute local
/// repository paths.
pub(crate) fn validate_clone_source(value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.contains('\0') {
        return Err(CoreError::InvalidInput(
            "repoUrl must be a repository URL.".to_string(),
        ));
    }

    if trimmed.contains("://") {
        let parsed = url::Url::parse(trimmed).map_err(|error| {
            CoreError::InvalidInput(format!("repoUrl is not a valid URL: {error}"))
        })?;
        return match parsed.scheme() {
            "http" | "https" | "ssh" | "git" | "file" => Ok(trimmed.to_string()),
            other => Err(CoreError::InvalidInput(format!(
                "repoUrl scheme \"{other}\" is not supported."
            ))),
        };
    }

    if normalize_remote_repo_info(trimmed).is_some() || std::path::Path::new(trimmed).is_absolute() {
        return Ok(trimmed.to_string());
    }

    Err(CoreError::InvalidInput(format!(
        "repoUrl \"{trimmed}\" is not a recognizable repository location."
    )))
}

fn normalize_remote_host_and_path(
    host_value: &str,
    path: &str,
) -> Option<(String, String, String)> {
    if host_value.contains('/') || host_value.contains('\\') {
        return None;
    }

    let host = host_value
        .split(':')
        .next()
        .map(str::trim)
        .map(|value| value.trim_matches('[').trim_matches(']'))
        .filter(|value| !value.is_empty())?
        .to_lowercase();

    let normalized_path = path.trim().trim_matches('/').trim_end_matches(".git");
    let segments = normalized_path
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.len() < 2 {
        return None;
    }

    let owner = segments[segments.len() - 2].to_string();
    let repo = segments[segments.len() - 1].to_string();
    Some((host, owner, repo))
}

fn normalize_git_status_path(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let target = trimmed
        .rsplit_once(" -> ")
        .map(|(_, right)| right.trim())
        .unwrap_or(trimmed);
    Some(unquote_git_path(target))
}

/// Undoes Git's C-style quoting of unusual paths (`"a\tb"`, `"\303\251"`).
pub(crate) fn unquote_git_path(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buffer = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some('"') => bytes.push(b'"'),
            Some('\\') => bytes.push(b'\\'),
            Some(first @ '0'..='7') => {
                let mut octal = first.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|next| next.to_digit(8)) {
                        Some(digit) => {
                            octal = octal * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push((octal & 0xff) as u8);
            }
            Some(other) => {
                bytes.push(b'\\');
                let mut buffer = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buffer).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_porcelain_entries_in_order() {
        let output = "## main...origin/main [ahead 2, behind 1]\n M src/a.ts\nA  src/new.ts\n D gone.ts\nR  old.ts -> renamed.ts\n?? notes.md\n";
        let parsed = parse_porcelain_status(output);

        assert_eq!(parsed.header.branch.as_deref(), Some("main"));
        assert_eq!(parsed.header.upstream.as_deref(), Some("origin/main"));
        assert_eq!((parsed.header.ahead, parsed.header.behind), (2, 1));
        let summary = parsed
            .files
            .iter()
            .map(|file| format!("{}:{}", file.path, file.status))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec!["src/a.ts:M", "src/new.ts:A", "gone.ts:D", "renamed.ts:R", "notes.md:?"]
        );
        assert!(parsed.conflicts.is_empty());
    }

    #[test]
    fn lists_unmerged_paths_as_conflicts() {
        let parsed = parse_porcelain_status("## main\nUU src/lib.rs\nAA both.txt\n M clean.rs\n");
        assert_eq!(parsed.conflicts, vec!["src/lib.rs", "both.txt"]);
        assert_eq!(parsed.header.upstream, None);
    }

    #[test]
    fn parses_unborn_and_detached_headers() {
        assert_eq!(
            parse_branch_header("No commits yet on trunk").branch.as_deref(),
            Some("trunk")
        );
        assert_eq!(parse_branch_header("HEAD (no branch)").branch, None);
        let gone = parse_branch_header("feature...origin/feature [gone]");
        assert_eq!(gone.upstream, None);
    }

    #[test]
    fn unquotes_escaped_paths() {
        assert_eq!(unquote_git_path("\"caf\\303\\251.txt\""), "café.txt");
        assert_eq!(unquote_git_path("\"with space\\tand tab\""), "with space\tand tab");
        assert_eq!(unquote_git_path("plain.txt"), "plain.txt");
    }

    #[test]
    fn parses_numstat_including_binary_and_renames() {
        let counts = parse_numstat("3\t1\tsrc/a.ts\n-\t-\tlogo.png\n2\t0\tsrc/{old => new}/mod.rs\n");
        assert_eq!(counts.get("src/a.ts"), Some(&(Some(3), Some(1))));
        assert_eq!(counts.get("logo.png"), Some(&(None, None)));
        assert_eq!(counts.get("src/new/mod.rs"), Some(&(Some(2), Some(0))));
    }

    #[test]
    fn remote_branch_list_skips_symbolic_head() {
        let remote = parse_remote_branches("origin/HEAD -> origin/main\norigin/main\norigin\norigin/feat/x\n");
        assert_eq!(remote, vec!["origin/main", "origin/feat/x"]);
    }

    #[test]
    fn file_list_refuses_option_like_paths() {
        let files = vec!["src/x.ts".to_string(), "--force".to_string()];
        assert!(normalize_git_file_list(&files).is_err());
        let files = vec![" a.ts ".to_string(), "a.ts".to_string()];
        assert_eq!(normalize_git_file_list(&files).unwrap(), vec!["a.ts"]);
    }

    #[test]
    fn validates_branch_names() {
        assert_eq!(validate_branch_name(" feat/login ").unwrap(), "feat/login");
        for bad in ["", "-x", "a..b", "has space", "end.lock", "what?"] {
            assert!(validate_branch_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn parses_remote_forms() {
        let expected = Some(("github.com".to_string(), "owner".to_string(), "repo".to_string()));
        assert_eq!(normalize_remote_repo_info("git@github.com:owner/repo.git"), expected);
        assert_eq!(normalize_remote_repo_info("https://GitHub.com/owner/repo/"), expected);
        assert_eq!(normalize_remote_repo_info("not a remote"), None);
    }

    #[test]
    fn validates_clone_sources() {
        assert!(validate_clone_source("https://example.com/o/r.git").is_ok());
        assert!(validate_clone_source("git@example.com:o/r.git").is_ok());
        assert!(validate_clone_source("/srv/git/r.git").is_ok());
        assert!(validate_clone_source("--upload-pack=evil").is_err());
        assert!(validate_clone_source("javascript://x").is_err());
    }
}
