use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::commit_message::{
    heuristic_message, sanitize_oracle_reply, CommitMessageOracle, GeneratedMessage, MessageSource,
    OracleRequest,
};
use super::executor::{run_git, run_git_owned, GitExecutor};
use super::snapshot::{BranchList, GitStatusSnapshot, QuickStatus, RemoteRepo};
use super::staging::StagingSelection;
use super::task_queue::ProjectTaskQueue;
use crate::backend::common::constants::{NOTHING_SELECTED_MESSAGE, STARTUP_SCAN_CONCURRENCY};
use crate::backend::common::dtos::GitCommandOutcome;
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::common::process_command::{
    command_error_message, command_output_snippet, first_non_empty_line, CommandResult,
};
use crate::backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};
use crate::backend::runtime_cache_dedupe::cache_runtime::GitStatusCache;
use crate::backend::session_registry::session::ProjectRef;
use crate::git_gh::{
    normalize_git_file_list, normalize_remote_repo_info, parse_local_branches, parse_numstat,
    parse_porcelain_status, parse_remote_branches, validate_branch_name, validate_clone_source,
    GitFileEntry, GitFileStatus,
};
use crate::workspace::{canonical_path_key, normalize_project_path};

fn outcome_from(result: &CommandResult, fallback: &str) -> GitCommandOutcome {
    let output = command_output_snippet(result);
    if result.succeeded() {
        GitCommandOutcome::ok(output)
    } else {
        GitCommandOutcome {
            output,
            ..GitCommandOutcome::failed(command_error_message(result, fallback))
        }
    }
}

/// Per-project Git operations. Work on one directory runs strictly in
/// arrival order; different directories proceed in parallel.
pub struct GitWorkspaceEngine {
    executor: Arc<dyn GitExecutor>,
    oracle: Option<Arc<dyn CommitMessageOracle>>,
    queue: ProjectTaskQueue,
    cache: GitStatusCache,
    staging: Mutex<HashMap<String, StagingSelection>>,
    merges: Mutex<HashSet<String>>,
    events: EventBus,
    scan_concurrency: usize,
}

impl GitWorkspaceEngine {
    pub fn new(
        executor: Arc<dyn GitExecutor>,
        oracle: Option<Arc<dyn CommitMessageOracle>>,
        events: EventBus,
    ) -> Self {
        GitWorkspaceEngine {
            executor,
            oracle,
            queue: ProjectTaskQueue::new(),
            cache: GitStatusCache::new(),
            staging: Mutex::new(HashMap::new()),
            merges: Mutex::new(HashSet::new()),
            events,
            scan_concurrency: STARTUP_SCAN_CONCURRENCY,
        }
    }

    pub fn with_scan_concurrency(mut self, limit: usize) -> Self {
        self.scan_concurrency = limit.max(1);
        self
    }

    pub async fn status_quick(&self, project: &ProjectRef) -> CoreResult<QuickStatus> {
        let cwd = Path::new(&project.path);
        self.queue
            .run(&project.path, async {
                if !self.is_repository(cwd).await? {
                    return Ok(QuickStatus::default());
                }
                Ok::<_, CoreError>(QuickStatus {
                    is_repo: true,
                    branch: self.read_current_branch(cwd).await?,
                })
            })
            .await
    }

    /// Reads a fresh snapshot, caches it, reconciles the staging selection
    /// and notifies subscribers.
    pub async fn status_detailed(&self, project: &ProjectRef) -> CoreResult<GitStatusSnapshot> {
        let snapshot = self
            .queue
            .run(&project.path, self.read_snapshot(Path::new(&project.path)))
            .await?;

        let key = canonical_path_key(Path::new(&project.path));
        self.lock_staging()
            .entry(key.clone())
            .or_default()
            .reconcile(snapshot.files.iter().map(|file| file.path.clone()));
        {
            let mut merges = self.lock_merges();
            if snapshot.merge_in_progress {
                merges.insert(key);
            } else {
                merges.remove(&key);
            }
        }
        self.cache.store(&project.project_id, snapshot.clone());

        tracing::debug!(
            project_id = %project.project_id,
            is_repo = snapshot.is_repo,
            files = snapshot.files.len(),
            merge_in_progress = snapshot.merge_in_progress,
            "git.status.refreshed"
        );
        self.events.emit(CoreEvent::GitStatusUpdated {
            project_id: project.project_id.clone(),
        });
        Ok(snapshot)
    }

    /// Cached snapshot, possibly stale. Never touches Git.
    pub fn last_snapshot(&self, project_id: &str) -> Option<GitStatusSnapshot> {
        self.cache.get(project_id)
    }

    /// Returns the cached snapshot right away and refreshes in the
    /// background; `git:statusUpdated` fires when the refresh lands.
    pub fn refresh(self: &Arc<Self>, project: &ProjectRef) -> Option<GitStatusSnapshot> {
        let cached = self.cache.get(&project.project_id);
        if self.cache.begin_refresh(&project.project_id) {
            let engine = Arc::clone(self);
            let project = project.clone();
            tokio::spawn(async move {
                if let Err(error) = engine.status_detailed(&project).await {
                    tracing::warn!(project_id = %project.project_id, %error, "git.status.refresh_failed");
                }
                engine.cache.end_refresh(&project.project_id);
            });
        }
        cached
    }

    /// Quick status for every project, at most `scan_concurrency` at a time.
    /// Projects whose scan fails are logged and left out.
    pub async fn scan_all(&self, projects: &[ProjectRef]) -> HashMap<String, QuickStatus> {
        let results = stream::iter(projects.iter().cloned())
            .map(|project| async move {
                let status = self.status_quick(&project).await;
                (project, status)
            })
            .buffer_unordered(self.scan_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut statuses = HashMap::new();
        for (project, status) in results {
            match status {
                Ok(status) => {
                    statuses.insert(project.project_id, status);
                }
                Err(error) => {
                    tracing::warn!(project_id = %project.project_id, %error, "git.scan.failed");
                }
            }
        }
        tracing::info!(scanned = projects.len(), repos = statuses.values().filter(|s| s.is_repo).count(), "git.scan.done");
        statuses
    }

    pub fn select(&self, project: &ProjectRef, path: &str) -> CoreResult<()> {
        self.with_staging(project, |staging| staging.select(path))
    }

    pub fn deselect(&self, project: &ProjectRef, path: &str) {
        self.with_staging(project, |staging| staging.deselect(path));
    }

    pub fn select_all(&self, project: &ProjectRef) {
        self.with_staging(project, StagingSelection::select_all);
    }

    pub fn clear_selection(&self, project: &ProjectRef) {
        self.with_staging(project, StagingSelection::clear);
    }

    pub fn selection(&self, project: &ProjectRef) -> Vec<String> {
        self.with_staging(project, |staging| staging.selected())
    }

    /// Stages exactly `selected_paths` and commits them. The selection is
    /// cleared only when the commit succeeds.
    pub async fn commit(
        &self,
        project: &ProjectRef,
        message: &str,
        selected_paths: &[String],
    ) -> CoreResult<GitCommandOutcome> {
        let files = normalize_git_file_list(selected_paths)?;
        let message = message.trim();
        if files.is_empty() {
            return Ok(self.finish_op(project, "commit", GitCommandOutcome::failed(NOTHING_SELECTED_MESSAGE)));
        }
        if message.is_empty() {
            return Ok(self.finish_op(
                project,
                "commit",
                GitCommandOutcome::failed("commit message must not be empty"),
            ));
        }

        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                let mut add_args = vec!["add".to_string()];
                add_args.extend(files.iter().cloned());
                let added = run_git_owned(self.executor.as_ref(), cwd, &add_args).await?;
                if !added.succeeded() {
                    return Ok(outcome_from(&added, "git add failed"));
                }
                let committed = run_git(self.executor.as_ref(), cwd, &["commit", "-m", message]).await?;
                Ok::<_, CoreError>(outcome_from(&committed, "git commit failed"))
            })
            .await?;

        if outcome.success {
            self.clear_selection(project);
            // A successful commit concludes any merge that was in progress.
            self.lock_merges().remove(&canonical_path_key(cwd));
        }
        Ok(self.finish_op(project, "commit", outcome))
    }

    /// Commits whatever the staging selection currently holds.
    pub async fn commit_selection(&self, project: &ProjectRef, message: &str) -> CoreResult<GitCommandOutcome> {
        let selected = self.selection(project);
        self.commit(project, message, &selected).await
    }

    /// Suggests a message for `selected_files`. With `use_ai` the oracle is
    /// asked first; any oracle failure falls back to the heuristic.
    pub async fn generate_message(
        &self,
        project: &ProjectRef,
        selected_files: &[String],
        use_ai: bool,
    ) -> CoreResult<GeneratedMessage> {
        let files = normalize_git_file_list(selected_files)?;
        if files.is_empty() {
            return Err(CoreError::InvalidInput(NOTHING_SELECTED_MESSAGE.to_string()));
        }
        let known = self
            .cache
            .get(&project.project_id)
            .map(|snapshot| snapshot.files)
            .unwrap_or_default();
        let entries = files
            .iter()
            .map(|path| {
                known
                    .iter()
                    .find(|entry| &entry.path == path)
                    .cloned()
                    .unwrap_or_else(|| GitFileEntry {
                        path: path.clone(),
                        status: GitFileStatus::Modified,
                        additions: None,
                        deletions: None,
                    })
            })
            .collect::<Vec<_>>();
        let heuristic = heuristic_message(&entries);

        let Some(oracle) = self.oracle.as_ref().filter(|_| use_ai) else {
            return Ok(heuristic);
        };

        let cwd = Path::new(&project.path);
        let mut diff_args = vec!["diff".to_string(), "--no-color".to_string(), "HEAD".to_string(), "--".to_string()];
        diff_args.extend(files.iter().cloned());
        let diff = self
            .queue
            .run(&project.path, run_git_owned(self.executor.as_ref(), cwd, &diff_args))
            .await?;
        let request = OracleRequest {
            diff: if diff.succeeded() { diff.stdout } else { String::new() },
            files,
        };

        match oracle.suggest(cwd, &request).await {
            Ok(reply) => match sanitize_oracle_reply(&reply) {
                Some(message) => Ok(GeneratedMessage {
                    message,
                    source: MessageSource::Ai,
                    groups: heuristic.groups,
                }),
                None => {
                    tracing::warn!(project_id = %project.project_id, "git.message.oracle_empty");
                    Ok(heuristic)
                }
            },
            Err(error) => {
                tracing::warn!(project_id = %project.project_id, %error, "git.message.oracle_failed");
                Ok(heuristic)
            }
        }
    }

    pub async fn pull(&self, project: &ProjectRef) -> CoreResult<GitCommandOutcome> {
        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                let result = run_git(self.executor.as_ref(), cwd, &["pull", "--no-edit"]).await?;
                self.with_conflicts(project, outcome_from(&result, "git pull failed")).await
            })
            .await?;
        Ok(self.finish_op(project, "pull", outcome))
    }

    /// Pushes the current branch, publishing it to `origin` when it has no
    /// upstream yet.
    pub async fn push(&self, project: &ProjectRef) -> CoreResult<GitCommandOutcome> {
        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                let upstream = run_git(
                    self.executor.as_ref(),
                    cwd,
                    &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
                )
                .await?;
                let result = match (upstream.succeeded(), self.read_current_branch(cwd).await?) {
                    (false, Some(branch)) => {
                        run_git(self.executor.as_ref(), cwd, &["push", "-u", "origin", &branch]).await?
                    }
                    _ => run_git(self.executor.as_ref(), cwd, &["push"]).await?,
                };
                Ok::<_, CoreError>(outcome_from(&result, "git push failed"))
            })
            .await?;
        Ok(self.finish_op(project, "push", outcome))
    }

    pub async fn merge_abort(&self, project: &ProjectRef) -> CoreResult<GitCommandOutcome> {
        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                let result = run_git(self.executor.as_ref(), cwd, &["merge", "--abort"]).await?;
                Ok::<_, CoreError>(outcome_from(&result, "git merge --abort failed"))
            })
            .await?;
        if outcome.success {
            self.lock_merges().remove(&canonical_path_key(cwd));
        }
        Ok(self.finish_op(project, "mergeAbort", outcome))
    }

    pub async fn branches(&self, project: &ProjectRef) -> CoreResult<BranchList> {
        let cwd = Path::new(&project.path);
        self.queue
            .run(&project.path, async {
                let local = run_git(self.executor.as_ref(), cwd, &["branch", "--format=%(refname:short)"]).await?;
                let remote =
                    run_git(self.executor.as_ref(), cwd, &["branch", "-r", "--format=%(refname:short)"]).await?;
                Ok::<_, CoreError>(BranchList {
                    local: if local.succeeded() { parse_local_branches(&local.stdout) } else { Vec::new() },
                    remote: if remote.succeeded() { parse_remote_branches(&remote.stdout) } else { Vec::new() },
                })
            })
            .await
    }

    /// `None` on a detached HEAD.
    pub async fn current_branch(&self, project: &ProjectRef) -> CoreResult<Option<String>> {
        self.queue
            .run(&project.path, self.read_current_branch(Path::new(&project.path)))
            .await
    }

    pub async fn checkout(&self, project: &ProjectRef, branch: &str) -> CoreResult<GitCommandOutcome> {
        let branch = validate_branch_name(branch)?;
        self.ensure_no_merge(project, "checkout")?;
        self.run_branch_op(project, "checkout", &["checkout", &branch], "git checkout failed")
            .await
    }

    /// Creates `name` from the current HEAD and switches to it.
    pub async fn create_branch(&self, project: &ProjectRef, name: &str) -> CoreResult<GitCommandOutcome> {
        let name = validate_branch_name(name)?;
        self.ensure_no_merge(project, "createBranch")?;
        self.run_branch_op(project, "createBranch", &["checkout", "-b", &name], "git checkout -b failed")
            .await
    }

    /// Merges `branch` into the current branch. A conflicting merge stays in
    /// progress and is reported through `has_conflicts`.
    pub async fn merge(&self, project: &ProjectRef, branch: &str) -> CoreResult<GitCommandOutcome> {
        let branch = validate_branch_name(branch)?;
        self.ensure_no_merge(project, "merge")?;
        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                let result = run_git(self.executor.as_ref(), cwd, &["merge", "--no-edit", &branch]).await?;
                self.with_conflicts(project, outcome_from(&result, "git merge failed")).await
            })
            .await?;
        Ok(self.finish_op(project, "merge", outcome))
    }

    pub async fn delete_branch(&self, project: &ProjectRef, branch: &str) -> CoreResult<GitCommandOutcome> {
        let branch = validate_branch_name(branch)?;
        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                if self.read_current_branch(cwd).await?.as_deref() == Some(branch.as_str()) {
                    return Ok(GitCommandOutcome::failed(format!(
                        "cannot delete \"{branch}\": it is the current branch"
                    )));
                }
                let result = run_git(self.executor.as_ref(), cwd, &["branch", "-d", &branch]).await?;
                Ok::<_, CoreError>(outcome_from(&result, "git branch -d failed"))
            })
            .await?;
        Ok(self.finish_op(project, "deleteBranch", outcome))
    }

    /// Clones into `target_path`, whose parent directory must exist.
    /// Returns once Git finishes.
    pub async fn clone_repository(&self, repo_url: &str, target_path: &str) -> CoreResult<GitCommandOutcome> {
        let source = validate_clone_source(repo_url)?;
        let target = normalize_project_path(target_path)?;
        let parent = Path::new(&target)
            .parent()
            .ok_or_else(|| CoreError::InvalidInput("targetPath must have a parent directory.".to_string()))?
            .to_path_buf();
        if !parent.is_dir() {
            return Err(CoreError::ExternalFailure(format!(
                "parent directory \"{}\" does not exist",
                parent.display()
            )));
        }

        tracing::info!(target = %target, "git.clone.start");
        let outcome = self
            .queue
            .run(&target, async {
                let result = run_git(self.executor.as_ref(), &parent, &["clone", "--", &source, &target]).await?;
                Ok::<_, CoreError>(outcome_from(&result, "git clone failed"))
            })
            .await?;
        tracing::info!(target = %target, success = outcome.success, "git.clone.done");
        Ok(outcome)
    }

    /// Host, owner and repository of `origin`, when it is a recognizable
    /// remote.
    pub async fn remote_repo(&self, project: &ProjectRef) -> CoreResult<Option<RemoteRepo>> {
        let cwd = Path::new(&project.path);
        let result = self
            .queue
            .run(&project.path, run_git(self.executor.as_ref(), cwd, &["remote", "get-url", "origin"]))
            .await?;
        if !result.succeeded() {
            return Ok(None);
        }
        Ok(first_non_empty_line(&result.stdout)
            .and_then(|url| normalize_remote_repo_info(&url))
            .map(|(host, owner, repo)| RemoteRepo { host, owner, repo }))
    }

    pub fn merge_in_progress(&self, project: &ProjectRef) -> bool {
        self.lock_merges()
            .contains(&canonical_path_key(Path::new(&project.path)))
    }

    async fn run_branch_op(
        &self,
        project: &ProjectRef,
        op: &str,
        args: &[&str],
        fallback: &str,
    ) -> CoreResult<GitCommandOutcome> {
        let cwd = Path::new(&project.path);
        let outcome = self
            .queue
            .run(&project.path, async {
                let result = run_git(self.executor.as_ref(), cwd, args).await?;
                Ok::<_, CoreError>(outcome_from(&result, fallback))
            })
            .await?;
        Ok(self.finish_op(project, op, outcome))
    }

    fn ensure_no_merge(&self, project: &ProjectRef, operation: &str) -> CoreResult<()> {
        if self.merge_in_progress(project) {
            return Err(CoreError::ConflictState {
                path: project.path.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Attaches unmerged paths to a failed pull/merge and records the merge.
    async fn with_conflicts(&self, project: &ProjectRef, mut outcome: GitCommandOutcome) -> CoreResult<GitCommandOutcome> {
        if outcome.success {
            return Ok(outcome);
        }
        let cwd = Path::new(&project.path);
        let status = run_git(self.executor.as_ref(), cwd, &["status", "--porcelain=v1"]).await?;
        if !status.succeeded() {
            return Ok(outcome);
        }
        let conflicts = parse_porcelain_status(&status.stdout).conflicts;
        if !conflicts.is_empty() {
            self.lock_merges().insert(canonical_path_key(cwd));
            outcome.has_conflicts = true;
            outcome.conflicts = conflicts;
        }
        Ok(outcome)
    }

    fn finish_op(&self, project: &ProjectRef, op: &str, outcome: GitCommandOutcome) -> GitCommandOutcome {
        if outcome.success {
            tracing::info!(project_id = %project.project_id, op, "git.op.done");
        } else {
            tracing::warn!(
                project_id = %project.project_id,
                op,
                error = outcome.error.as_deref().unwrap_or_default(),
                has_conflicts = outcome.has_conflicts,
                "git.op.failed"
            );
        }
        self.events.emit(CoreEvent::GitOpComplete {
            project_id: project.project_id.clone(),
            op: op.to_string(),
            result: outcome.clone(),
        });
        outcome
    }

    async fn is_repository(&self, cwd: &Path) -> CoreResult<bool> {
        let result = run_git(self.executor.as_ref(), cwd, &["rev-parse", "--is-inside-work-tree"]).await?;
        Ok(result.succeeded() && result.stdout.trim() == "true")
    }

    async fn read_current_branch(&self, cwd: &Path) -> CoreResult<Option<String>> {
        let result = run_git(self.executor.as_ref(), cwd, &["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        if !result.succeeded() {
            return Ok(None);
        }
        Ok(first_non_empty_line(&result.stdout))
    }

    async fn read_snapshot(&self, cwd: &Path) -> CoreResult<GitStatusSnapshot> {
        if !self.is_repository(cwd).await? {
            return Ok(GitStatusSnapshot::not_a_repo());
        }

        let status = run_git(
            self.executor.as_ref(),
            cwd,
            &["status", "--porcelain=v1", "--branch", "--untracked-files=all"],
        )
        .await?;
        if !status.succeeded() {
            return Err(CoreError::ExternalFailure(command_error_message(&status, "git status failed")));
        }
        let mut porcelain = parse_porcelain_status(&status.stdout);

        let mut counts = HashMap::new();
        for args in [&["diff", "--numstat"][..], &["diff", "--numstat", "--cached"][..]] {
            let numstat = run_git(self.executor.as_ref(), cwd, args).await?;
            if !numstat.succeeded() {
                continue;
            }
            for (path, (added, deleted)) in parse_numstat(&numstat.stdout) {
                let entry = counts.entry(path).or_insert((None, None));
                entry.0 = sum_counts(entry.0, added);
                entry.1 = sum_counts(entry.1, deleted);
            }
        }
        for file in &mut porcelain.files {
            if let Some((added, deleted)) = counts.get(&file.path) {
                file.additions = *added;
                file.deletions = *deleted;
            }
        }

        let merge_head = run_git(self.executor.as_ref(), cwd, &["rev-parse", "-q", "--verify", "MERGE_HEAD"]).await?;
        Ok(GitStatusSnapshot::from_porcelain(porcelain, merge_head.succeeded()))
    }

    fn with_staging<T>(&self, project: &ProjectRef, apply: impl FnOnce(&mut StagingSelection) -> T) -> T {
        let key = canonical_path_key(Path::new(&project.path));
        apply(self.lock_staging().entry(key).or_default())
    }

    fn lock_staging(&self) -> MutexGuard<'_, HashMap<String, StagingSelection>> {
        self.staging
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_merges(&self) -> MutexGuard<'_, HashSet<String>> {
        self.merges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sum_counts(current: Option<u32>, next: Option<u32>) -> Option<u32> {
    match (current, next) {
        (Some(left), Some(right)) => Some(left + right),
        (left, right) => left.or(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::event_polling_emission_pipeline::events_runtime::drain_events;
    use crate::backend::test_support::{wait_until, FakeOracle, ScriptedGitExecutor};

    fn project() -> ProjectRef {
        ProjectRef {
            project_id: "p1".to_string(),
            path: "/repo/api".to_string(),
        }
    }

    fn engine_with(executor: Arc<ScriptedGitExecutor>) -> (Arc<GitWorkspaceEngine>, EventBus) {
        let events = EventBus::new();
        let engine = GitWorkspaceEngine::new(executor, None, events.clone());
        (Arc::new(engine), events)
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn non_repo_directory_is_a_value_not_an_error() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(
            &["rev-parse", "--is-inside-work-tree"],
            CommandResult::completed(128, "", "fatal: not a git repository"),
        );
        let (engine, _) = engine_with(executor);
        let snapshot = engine.status_detailed(&project()).await.unwrap();
        assert!(!snapshot.is_repo);
        assert!(snapshot.files.is_empty());
        assert_eq!(engine.status_quick(&project()).await.unwrap(), QuickStatus::default());
    }

    #[tokio::test]
    async fn detailed_status_merges_numstat_counts() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status(
            "## main...origin/main [behind 2]\n M src/app.ts\nA  src/new.ts\n?? notes.md\n",
        ));
        executor.respond(&["diff", "--numstat"], CommandResult::completed(0, "3\t1\tsrc/app.ts\n", ""));
        executor.respond(&["diff", "--numstat", "--cached"], CommandResult::completed(0, "10\t0\tsrc/new.ts\n", ""));
        let (engine, _) = engine_with(executor);

        let snapshot = engine.status_detailed(&project()).await.unwrap();
        assert_eq!(snapshot.branch.as_deref(), Some("main"));
        assert_eq!(snapshot.behind, 2);
        let codes = snapshot.files.iter().map(|file| file.status.code()).collect::<String>();
        assert_eq!(codes, "MA?");
        assert_eq!(snapshot.files[0].additions, Some(3));
        assert_eq!(snapshot.files[1].additions, Some(10));
        assert_eq!(snapshot.files[2].additions, None);
        assert!(!snapshot.merge_in_progress);
    }

    #[tokio::test]
    async fn staging_survives_refresh_and_drops_reverted_paths() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status(
            "## main\n M a.ts\n M b.ts\n?? c.ts\n",
        ));
        let (engine, _) = engine_with(executor.clone());
        engine.status_detailed(&project()).await.unwrap();
        engine.select(&project(), "a.ts").unwrap();
        engine.select(&project(), "c.ts").unwrap();

        executor.respond(&["status"], CommandResult::completed(0, "## main\n M a.ts\n M b.ts\n?? c.ts\n?? d.ts\n", ""));
        engine.status_detailed(&project()).await.unwrap();
        assert_eq!(engine.selection(&project()), strings(&["a.ts", "c.ts"]));

        executor.respond(&["status"], CommandResult::completed(0, "## main\n M a.ts\n M b.ts\n?? d.ts\n", ""));
        engine.status_detailed(&project()).await.unwrap();
        assert_eq!(engine.selection(&project()), strings(&["a.ts"]));
    }

    #[tokio::test]
    async fn commit_stages_exactly_the_selection() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status(
            "## main\n M src/x.ts\n M src/y.ts\n M src/z.ts\n",
        ));
        let (engine, events) = engine_with(executor.clone());
        engine.status_detailed(&project()).await.unwrap();
        engine.select(&project(), "src/x.ts").unwrap();
        engine.select(&project(), "src/y.ts").unwrap();
        let mut receiver = events.subscribe();
        let before = executor.calls().len();

        let outcome = engine.commit_selection(&project(), "wip").await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            executor.calls()[before..].to_vec(),
            vec![strings(&["add", "src/x.ts", "src/y.ts"]), strings(&["commit", "-m", "wip"])]
        );
        assert!(engine.selection(&project()).is_empty());
        assert!(drain_events(&mut receiver)
            .iter()
            .any(|event| matches!(event, CoreEvent::GitOpComplete { op, .. } if op == "commit")));
    }

    #[tokio::test]
    async fn failed_commit_keeps_selection_and_reports_stderr() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status("## main\n M a.ts\n"));
        executor.respond(&["commit"], CommandResult::completed(1, "", "error: gpg failed to sign the data\n"));
        let (engine, _) = engine_with(executor);
        engine.status_detailed(&project()).await.unwrap();
        engine.select_all(&project());

        let outcome = engine.commit_selection(&project(), "wip").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("error: gpg failed to sign the data"));
        assert_eq!(engine.selection(&project()), strings(&["a.ts"]));
    }

    #[tokio::test]
    async fn empty_selection_never_touches_the_index() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        let (engine, _) = engine_with(executor.clone());
        let outcome = engine.commit(&project(), "wip", &[]).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("nothing selected"));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn checkout_during_merge_is_refused_without_running_git() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status("## main\nUU src/app.ts\n"));
        let (engine, _) = engine_with(executor.clone());
        assert!(engine.status_detailed(&project()).await.unwrap().merge_in_progress);
        let before = executor.calls().len();

        let result = engine.checkout(&project(), "main").await;
        assert!(matches!(result, Err(CoreError::ConflictState { .. })));
        assert_eq!(executor.calls().len(), before);
    }

    #[tokio::test]
    async fn pull_conflict_records_merge_until_aborted() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(&["pull"], CommandResult::completed(1, "CONFLICT (content): Merge conflict in a.ts\n", "Automatic merge failed\n"));
        executor.respond(&["status", "--porcelain=v1"], CommandResult::completed(0, "UU a.ts\n", ""));
        let (engine, _) = engine_with(executor.clone());

        let outcome = engine.pull(&project()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.has_conflicts);
        assert_eq!(outcome.conflicts, strings(&["a.ts"]));
        assert!(engine.merge_in_progress(&project()));

        assert!(engine.merge_abort(&project()).await.unwrap().success);
        assert!(!engine.merge_in_progress(&project()));
    }

    #[tokio::test]
    async fn committing_the_resolution_ends_the_merge() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(&["pull"], CommandResult::completed(1, "CONFLICT (content): Merge conflict in a.ts\n", ""));
        executor.respond(&["status", "--porcelain=v1"], CommandResult::completed(0, "UU a.ts\n", ""));
        let (engine, _) = engine_with(executor.clone());
        let project = project();

        assert!(engine.pull(&project).await.unwrap().has_conflicts);
        assert!(matches!(
            engine.checkout(&project, "main").await,
            Err(CoreError::ConflictState { .. })
        ));

        let resolved = strings(&["a.ts"]);
        assert!(engine.commit(&project, "Merge origin/main", &resolved).await.unwrap().success);
        assert!(!engine.merge_in_progress(&project));
        assert!(engine.checkout(&project, "main").await.unwrap().success);
        assert_eq!(
            executor.calls().last().cloned().unwrap(),
            strings(&["checkout", "main"])
        );
    }

    #[tokio::test]
    async fn push_publishes_branch_without_upstream() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(&["rev-parse", "--abbrev-ref"], CommandResult::completed(128, "", "fatal: no upstream"));
        executor.respond(&["symbolic-ref"], CommandResult::completed(0, "feature/login\n", ""));
        let (engine, _) = engine_with(executor.clone());

        assert!(engine.push(&project()).await.unwrap().success);
        assert_eq!(
            executor.calls().last().cloned().unwrap(),
            strings(&["push", "-u", "origin", "feature/login"])
        );
    }

    #[tokio::test]
    async fn refuses_to_delete_the_current_branch() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(&["symbolic-ref"], CommandResult::completed(0, "main\n", ""));
        let (engine, _) = engine_with(executor.clone());
        let outcome = engine.delete_branch(&project(), "main").await.unwrap();
        assert!(!outcome.success);
        assert!(!executor.calls().iter().any(|call| call[0] == "branch"));
    }

    #[tokio::test]
    async fn lists_local_and_remote_branches() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(&["branch", "--format=%(refname:short)"], CommandResult::completed(0, "main\nfeature/a\n", ""));
        executor.respond(&["branch", "-r"], CommandResult::completed(0, "origin/HEAD\norigin/main\n", ""));
        let (engine, _) = engine_with(executor);
        let branches = engine.branches(&project()).await.unwrap();
        assert_eq!(branches.local, strings(&["main", "feature/a"]));
        assert_eq!(branches.remote, strings(&["origin/main"]));
    }

    #[tokio::test]
    async fn stale_snapshot_is_returned_immediately_then_refreshed() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status("## main\n M a.ts\n"));
        let (engine, events) = engine_with(executor.clone());
        assert_eq!(engine.refresh(&project()), None);
        wait_until(|| engine.last_snapshot("p1").is_some()).await;
        wait_until(|| {
            let idle = engine.cache.begin_refresh("p1");
            if idle {
                engine.cache.end_refresh("p1");
            }
            idle
        })
        .await;

        executor.respond(&["status"], CommandResult::completed(0, "## main\n M a.ts\n M b.ts\n", ""));
        let mut receiver = events.subscribe();
        let stale = engine.refresh(&project()).unwrap();
        assert_eq!(stale.files.len(), 1);
        wait_until(|| engine.last_snapshot("p1").is_some_and(|snapshot| snapshot.files.len() == 2)).await;
        let updated = CoreEvent::GitStatusUpdated {
            project_id: "p1".to_string(),
        };
        let mut seen = Vec::new();
        wait_until(|| {
            seen.extend(drain_events(&mut receiver));
            seen.contains(&updated)
        })
        .await;
    }

    #[tokio::test]
    async fn generate_message_falls_back_when_the_oracle_fails() {
        let executor = Arc::new(ScriptedGitExecutor::repo_with_status("## main\n M src/a.ts\n"));
        let events = EventBus::new();
        let failing = GitWorkspaceEngine::new(
            executor.clone(),
            Some(Arc::new(FakeOracle::failing("oracle offline"))),
            events.clone(),
        );
        let generated = failing.generate_message(&project(), &strings(&["src/a.ts"]), true).await.unwrap();
        assert_eq!(generated.source, MessageSource::Heuristic);
        assert_eq!(generated.message, "Update src/a.ts");

        let replying = GitWorkspaceEngine::new(
            executor,
            Some(Arc::new(FakeOracle::replying("```\nFix token refresh\n```"))),
            events,
        );
        let generated = replying.generate_message(&project(), &strings(&["src/a.ts"]), true).await.unwrap();
        assert_eq!(generated.source, MessageSource::Ai);
        assert_eq!(generated.message, "Fix token refresh");

        let offline = replying.generate_message(&project(), &strings(&["src/a.ts"]), false).await.unwrap();
        assert_eq!(offline.source, MessageSource::Heuristic);
    }

    #[tokio::test]
    async fn scan_all_collects_quick_status_per_project() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        executor.respond(&["rev-parse", "--is-inside-work-tree"], CommandResult::completed(0, "true\n", ""));
        executor.respond(&["symbolic-ref"], CommandResult::completed(0, "main\n", ""));
        let (engine, _) = engine_with(executor);
        let projects = (0..7)
            .map(|index| ProjectRef {
                project_id: format!("p{index}"),
                path: format!("/repo/{index}"),
            })
            .collect::<Vec<_>>();

        let statuses = engine.scan_all(&projects).await;
        assert_eq!(statuses.len(), 7);
        assert_eq!(statuses["p3"].branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn commits_on_one_path_run_in_arrival_order() {
        let executor = Arc::new(ScriptedGitExecutor::new());
        let (engine, _) = engine_with(executor.clone());
        let project = project();
        let first_files = strings(&["a.ts"]);
        let second_files = strings(&["b.ts"]);
        let first = engine.commit(&project, "first", &first_files);
        let second = engine.commit(&project, "second", &second_files);
        let (first, second) = tokio::join!(first, second);
        assert!(first.unwrap().success && second.unwrap().success);

        let commits = executor
            .calls()
            .into_iter()
            .filter(|call| call[0] != "rev-parse")
            .collect::<Vec<_>>();
        assert_eq!(
            commits,
            vec![
                strings(&["add", "a.ts"]),
                strings(&["commit", "-m", "first"]),
                strings(&["add", "b.ts"]),
                strings(&["commit", "-m", "second"]),
            ]
        );
    }
}
