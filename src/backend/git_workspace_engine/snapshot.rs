use serde::Serialize;

use crate::git_gh::{GitFileEntry, PorcelainStatus};

/// Detailed status of a project's repository as read from disk. Never
/// written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatusSnapshot {
    pub is_repo: bool,
    pub branch: Option<String>,
    pub upstream: Option<String>,
    pub has_upstream: bool,
    pub ahead: u32,
    pub behind: u32,
    pub files: Vec<GitFileEntry>,
    pub merge_in_progress: bool,
    pub conflicts: Vec<String>,
}

impl GitStatusSnapshot {
    pub fn not_a_repo() -> Self {
        GitStatusSnapshot::default()
    }

    pub(crate) fn from_porcelain(status: PorcelainStatus, merge_head_present: bool) -> Self {
        let merge_in_progress = merge_head_present || !status.conflicts.is_empty();
        GitStatusSnapshot {
            is_repo: true,
            branch: status.header.branch,
            has_upstream: status.header.upstream.is_some(),
            upstream: status.header.upstream,
            ahead: status.header.ahead,
            behind: status.header.behind,
            files: status.files,
            merge_in_progress,
            conflicts: status.conflicts,
        }
    }

    pub fn quick(&self) -> QuickStatus {
        QuickStatus {
            is_repo: self.is_repo,
            branch: self.branch.clone(),
        }
    }
}

/// Cheap status used for sidebar badges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickStatus {
    pub is_repo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchList {
    pub local: Vec<String>,
    pub remote: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepo {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_gh::parse_porcelain_status;

    #[test]
    fn conflicts_imply_merge_in_progress() {
        let status = parse_porcelain_status("## main...origin/main [ahead 1]\nUU src/app.ts\n M README.md\n");
        let snapshot = GitStatusSnapshot::from_porcelain(status, false);
        assert!(snapshot.merge_in_progress);
        assert!(snapshot.has_upstream);
        assert_eq!(snapshot.ahead, 1);
        assert_eq!(snapshot.conflicts, vec!["src/app.ts"]);
    }

    #[test]
    fn non_repo_serializes_with_empty_files() {
        let value = serde_json::to_value(GitStatusSnapshot::not_a_repo()).unwrap();
        assert_eq!(value["isRepo"], false);
        assert_eq!(value["files"], serde_json::json!([]));
    }
}
