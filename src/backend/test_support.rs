use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::backend::common::dtos::TerminalDims;
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::common::process_command::CommandResult;
use crate::backend::git_workspace_engine::commit_message::{CommitMessageOracle, OracleRequest};
use crate::backend::git_workspace_engine::executor::GitExecutor;
use crate::backend::pty_terminal_sessions::pty_service::{
    PtyEvent, PtyHandle, PtyService, PtySpawnRequest, PtySpawned,
};
use crate::backend::pty_terminal_sessions::terminal_view::TerminalView;
use crate::backend::pty_terminal_sessions::theme::TerminalTheme;
use crate::backend::session_registry::resume_index::{AssistantSessionIndex, ResumeEntry};

/// Yields to the runtime until `condition` holds. Panics after a bounded
/// number of rounds so a broken pump fails the test instead of hanging it.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[derive(Default)]
struct FakePtyState {
    next_id: u32,
    fail_next_spawn: bool,
    spawn_delay: Option<Duration>,
    spawned: Vec<PtySpawnRequest>,
    handles: Vec<String>,
    senders: HashMap<String, mpsc::UnboundedSender<PtyEvent>>,
    writes: Vec<(String, Vec<u8>)>,
    resizes: Vec<(String, TerminalDims)>,
    closed: Vec<String>,
}

/// In-memory PTY. Tests push output and exits by handle.
#[derive(Default)]
pub(crate) struct FakePtyService {
    state: Mutex<FakePtyState>,
}

impl FakePtyService {
    fn lock(&self) -> MutexGuard<'_, FakePtyState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn fail_next_spawn(&self) {
        self.lock().fail_next_spawn = true;
    }

    /// Makes every later spawn sleep before the child exists.
    pub(crate) fn delay_spawns(&self, delay: Duration) {
        self.lock().spawn_delay = Some(delay);
    }

    pub(crate) fn spawned(&self) -> Vec<PtySpawnRequest> {
        self.lock().spawned.clone()
    }

    pub(crate) fn last_handle(&self) -> String {
        self.lock().handles.last().cloned().unwrap()
    }

    pub(crate) fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().writes.clone()
    }

    pub(crate) fn resizes(&self) -> Vec<(String, TerminalDims)> {
        self.lock().resizes.clone()
    }

    pub(crate) fn closed(&self) -> Vec<String> {
        self.lock().closed.clone()
    }

    pub(crate) fn emit_data(&self, handle: &str, bytes: &[u8]) {
        if let Some(sender) = self.lock().senders.get(handle) {
            let _ = sender.send(PtyEvent::Data(bytes.to_vec()));
        }
    }

    pub(crate) fn emit_exit(&self, handle: &str, exit_code: Option<i32>) {
        if let Some(sender) = self.lock().senders.remove(handle) {
            let _ = sender.send(PtyEvent::Exit(exit_code));
        }
    }
}

#[async_trait]
impl PtyService for FakePtyService {
    async fn spawn(&self, request: PtySpawnRequest) -> CoreResult<PtySpawned> {
        let delay = self.lock().spawn_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next_spawn) {
            return Err(CoreError::ExternalFailure(format!(
                "failed to spawn {}",
                request.program
            )));
        }
        state.next_id += 1;
        let handle = format!("pty-{}", state.next_id);
        let (sender, events) = mpsc::unbounded_channel();
        state.spawned.push(request);
        state.handles.push(handle.clone());
        state.senders.insert(handle.clone(), sender);
        Ok(PtySpawned {
            handle: PtyHandle(handle),
            events,
        })
    }

    async fn write(&self, handle: &PtyHandle, bytes: &[u8]) -> CoreResult<()> {
        self.lock().writes.push((handle.0.clone(), bytes.to_vec()));
        Ok(())
    }

    async fn resize(&self, handle: &PtyHandle, dims: TerminalDims) -> CoreResult<()> {
        self.lock().resizes.push((handle.0.clone(), dims));
        Ok(())
    }

    async fn close(&self, handle: &PtyHandle) -> CoreResult<()> {
        self.lock().closed.push(handle.0.clone());
        self.emit_exit(&handle.0, Some(143));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ViewOp {
    Replay(Vec<u8>),
    Write(Vec<u8>),
    Theme(String),
}

#[derive(Default)]
pub(crate) struct RecordingView {
    pub(crate) ops: Arc<Mutex<Vec<ViewOp>>>,
}

impl TerminalView for RecordingView {
    fn replay(&mut self, scrollback: &[u8]) {
        self.ops.lock().unwrap().push(ViewOp::Replay(scrollback.to_vec()));
    }

    fn write(&mut self, chunk: &[u8]) {
        self.ops.lock().unwrap().push(ViewOp::Write(chunk.to_vec()));
    }

    fn apply_theme(&mut self, theme: &TerminalTheme) {
        self.ops.lock().unwrap().push(ViewOp::Theme(theme.id.clone()));
    }
}

#[derive(Default)]
struct ScriptState {
    rules: Vec<(Vec<String>, CommandResult)>,
    calls: Vec<Vec<String>>,
}

/// Git stand-in answering by argument prefix. The most recently added
/// matching rule wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct ScriptedGitExecutor {
    state: Mutex<ScriptState>,
}

impl ScriptedGitExecutor {
    pub(crate) fn new() -> Self {
        ScriptedGitExecutor::default()
    }

    /// A clean repository whose `git status` prints `porcelain`.
    pub(crate) fn repo_with_status(porcelain: &str) -> Self {
        let executor = ScriptedGitExecutor::new();
        executor.respond(
            &["rev-parse", "--is-inside-work-tree"],
            CommandResult::completed(0, "true\n", ""),
        );
        executor.respond(&["status"], CommandResult::completed(0, porcelain, ""));
        executor.respond(
            &["rev-parse", "-q", "--verify", "MERGE_HEAD"],
            CommandResult::completed(1, "", ""),
        );
        executor
    }

    pub(crate) fn respond(&self, prefix: &[&str], result: CommandResult) {
        let prefix = prefix.iter().map(|arg| arg.to_string()).collect();
        self.state.lock().unwrap().rules.push((prefix, result));
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl GitExecutor for ScriptedGitExecutor {
    async fn run(&self, _cwd: &Path, args: &[String]) -> CommandResult {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.to_vec());
        state
            .rules
            .iter()
            .rev()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| CommandResult::completed(0, "", ""))
    }
}

pub(crate) struct FakeOracle {
    reply: Result<String, String>,
}

impl FakeOracle {
    pub(crate) fn replying(message: &str) -> Self {
        FakeOracle {
            reply: Ok(message.to_string()),
        }
    }

    pub(crate) fn failing(error: &str) -> Self {
        FakeOracle {
            reply: Err(error.to_string()),
        }
    }
}

#[async_trait]
impl CommitMessageOracle for FakeOracle {
    async fn suggest(&self, _cwd: &Path, _request: &OracleRequest) -> CoreResult<String> {
        self.reply.clone().map_err(CoreError::ExternalFailure)
    }
}

/// Reports one resumable conversation for any directory.
#[derive(Default)]
pub(crate) struct FakeSessionIndex;

#[async_trait]
impl AssistantSessionIndex for FakeSessionIndex {
    async fn list_sessions(&self, _project_path: &Path) -> CoreResult<Vec<ResumeEntry>> {
        Ok(vec![ResumeEntry {
            resume_descriptor: "conv-1".to_string(),
            summary: Some("Fix login".to_string()),
            first_prompt: None,
            message_count: 4,
            modified_at: None,
        }])
    }
}
