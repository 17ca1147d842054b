use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::pty_service::{PtyEvent, PtyService, PtySpawnRequest};
use super::scrollback::ScrollbackBuffer;
use super::terminal_scope::{exit_footer, now_rfc3339, render_terminal_command, service_banner};
use super::terminal_view::{SessionObserver, TerminalView};
use super::theme::{builtin_theme, TerminalTheme};
use crate::backend::common::constants::{
    DEFAULT_SCROLLBACK_LINES, DEFAULT_TERMINAL_THEME, MAX_SCROLLBACK_BYTES,
};
use crate::backend::common::dtos::{SessionKind, SessionStatus, TerminalDims};
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};
use crate::backend::project_store::document::Project;
use crate::backend::project_store::project_types::ProjectTypeRegistry;
use crate::backend::session_registry::registry_runtime::SessionRegistry;
use crate::backend::session_registry::session::{ProjectRef, Session, SessionInit, SessionSnapshot};
use crate::terminal::{
    assistant_launch, default_shell, normalize_terminal_dims, plain_shell_launch,
    service_command_launch, TerminalLaunch,
};
use crate::workspace::normalize_project_path;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub assistant_bin: String,
    pub shell: String,
    pub scrollback_lines: usize,
    pub scrollback_bytes: usize,
    pub default_dims: TerminalDims,
    pub theme_id: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            assistant_bin: "claude".to_string(),
            shell: default_shell(),
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            scrollback_bytes: MAX_SCROLLBACK_BYTES,
            default_dims: normalize_terminal_dims(None, None),
            theme_id: DEFAULT_TERMINAL_THEME.to_string(),
        }
    }
}

pub struct CreateTerminalOptions {
    pub kind: SessionKind,
    /// For assistant sessions: `false` opens a shell in the project instead
    /// of launching the Assistant CLI.
    pub run_assistant: bool,
    pub skip_permissions: bool,
    pub resume_descriptor: Option<String>,
    pub cwd_override: Option<String>,
    pub dims: Option<TerminalDims>,
    /// Overrides the configured/autodetected command of a service console.
    pub service_command: Option<String>,
    pub observers: Vec<Arc<dyn SessionObserver>>,
}

impl CreateTerminalOptions {
    pub fn new(kind: SessionKind) -> Self {
        CreateTerminalOptions {
            kind,
            run_assistant: true,
            skip_permissions: false,
            resume_descriptor: None,
            cwd_override: None,
            dims: None,
            service_command: None,
            observers: Vec::new(),
        }
    }
}

/// Creates terminal sessions and bridges them to the PTY service.
pub struct TerminalOrchestrator {
    pty: Arc<dyn PtyService>,
    registry: Arc<SessionRegistry>,
    project_types: Arc<ProjectTypeRegistry>,
    events: EventBus,
    config: OrchestratorConfig,
    theme: Mutex<TerminalTheme>,
    last_dims: Mutex<HashMap<SessionKind, TerminalDims>>,
}

impl TerminalOrchestrator {
    pub fn new(
        pty: Arc<dyn PtyService>,
        registry: Arc<SessionRegistry>,
        project_types: Arc<ProjectTypeRegistry>,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> CoreResult<Self> {
        let theme = builtin_theme(&config.theme_id)?;
        Ok(TerminalOrchestrator {
            pty,
            registry,
            project_types,
            events,
            config,
            theme: Mutex::new(theme),
            last_dims: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn create_terminal(
        &self,
        project: &Project,
        options: CreateTerminalOptions,
    ) -> CoreResult<SessionSnapshot> {
        let cwd = match options.cwd_override.as_deref() {
            Some(path) if !path.trim().is_empty() => normalize_project_path(path)?,
            _ => project.path.clone(),
        };
        let launch = self.resolve_launch(project, &options)?;
        let command_rendered = render_terminal_command(&launch.program, &launch.args);
        let dims = options
            .dims
            .map(|dims| normalize_terminal_dims(Some(dims.cols), Some(dims.rows)))
            .or_else(|| self.lock_last_dims().get(&options.kind).copied())
            .unwrap_or(self.config.default_dims);
        let is_assistant = options.kind == SessionKind::Assistant;

        let mut scrollback = ScrollbackBuffer::new(self.config.scrollback_lines, self.config.scrollback_bytes);
        if let SessionKind::Service(service_kind) = options.kind {
            scrollback.append(service_banner(service_kind, &command_rendered, &cwd, &now_rfc3339()).as_bytes());
        }

        let session = Arc::new(Session::new(SessionInit {
            id: Uuid::new_v4().to_string(),
            project_ref: ProjectRef::from(project),
            kind: options.kind,
            skip_permissions: is_assistant && options.skip_permissions,
            resume_descriptor: options.resume_descriptor.clone().filter(|_| is_assistant),
            command: command_rendered.clone(),
            cwd: cwd.clone(),
            created_at: now_rfc3339(),
            dims,
            scrollback,
            observers: options.observers,
        }));
        let session_id = session.id().to_string();

        tracing::info!(
            session_id = %session_id,
            project_id = %project.id,
            kind = %options.kind,
            command = %command_rendered,
            cwd = %cwd,
            "terminal.open.start"
        );
        self.registry.add(session.clone())?;
        let observers = session.runtime().observers.clone();
        for observer in &observers {
            observer.on_started(&session);
        }

        let request = PtySpawnRequest {
            cwd: PathBuf::from(&cwd),
            program: launch.program,
            args: launch.args,
            env: vec![
                ("TERM".to_string(), "xterm-256color".to_string()),
                ("COLORTERM".to_string(), "truecolor".to_string()),
                ("TERMDECK_PROJECT_ID".to_string(), project.id.clone()),
                ("TERMDECK_SESSION_ID".to_string(), session_id.clone()),
            ],
            dims,
        };
        let spawned = match self.pty.spawn(request).await {
            Ok(spawned) => spawned,
            Err(error) => {
                tracing::warn!(session_id = %session_id, %error, "terminal.open.spawn_error");
                let _ = self.registry.remove(&session_id);
                for observer in &observers {
                    observer.on_closed(&session_id);
                }
                return Err(error);
            }
        };

        session.runtime().pty_handle = Some(spawned.handle);
        tokio::spawn(pump_session_output(session.clone(), spawned.events, self.events.clone()));

        if !options.kind.is_service() {
            self.registry.activate(&session_id)?;
        }
        tracing::info!(session_id = %session_id, "terminal.open.created");
        Ok(session.snapshot())
    }

    /// Forwards input verbatim. Writes to one session keep their call order.
    pub async fn write_input(&self, session_id: &str, bytes: &[u8]) -> CoreResult<()> {
        let session = self.registry.get(session_id)?;
        let handle = session
            .runtime()
            .pty_handle
            .clone()
            .ok_or_else(|| exited_error(session_id))?;
        let _outbound = session.outbound.lock().await;
        self.pty.write(&handle, bytes).await
    }

    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> CoreResult<TerminalDims> {
        let session = self.registry.get(session_id)?;
        let dims = normalize_terminal_dims(Some(cols), Some(rows));
        let handle = {
            let mut runtime = session.runtime();
            runtime.dims = dims;
            runtime.pty_handle.clone()
        };
        self.lock_last_dims().insert(session.kind(), dims);

        if let Some(handle) = handle {
            let _outbound = session.outbound.lock().await;
            self.pty.resize(&handle, dims).await?;
        }
        Ok(dims)
    }

    /// Attaches a view: applies the current theme, replays the scrollback,
    /// then enables live output. Replaces any previously attached view.
    pub fn attach(&self, session_id: &str, mut view: Box<dyn TerminalView>) -> CoreResult<()> {
        let session = self.registry.get(session_id)?;
        let theme = self.current_theme();
        let mut runtime = session.runtime();
        view.apply_theme(&theme);
        let contents = runtime.scrollback.contents();
        view.replay(&contents);
        runtime.view = Some(view);
        tracing::debug!(session_id, replayed = contents.len(), "terminal.view.attached");
        Ok(())
    }

    /// Detaches the view; the session keeps accumulating scrollback.
    pub fn detach(&self, session_id: &str) -> CoreResult<Option<Box<dyn TerminalView>>> {
        let session = self.registry.get(session_id)?;
        let view = session.runtime().view.take();
        Ok(view)
    }

    pub fn add_observer(&self, session_id: &str, observer: Arc<dyn SessionObserver>) -> CoreResult<()> {
        let session = self.registry.get(session_id)?;
        session.runtime().observers.push(observer);
        Ok(())
    }

    /// Terminates the child but keeps the session and its scrollback.
    pub async fn terminate(&self, session_id: &str) -> CoreResult<()> {
        let session = self.registry.get(session_id)?;
        let handle = session.runtime().pty_handle.clone();
        match handle {
            Some(handle) => self.pty.close(&handle).await,
            None => Ok(()),
        }
    }

    /// Terminates the child if alive and removes the session.
    pub async fn close_terminal(&self, session_id: &str) -> CoreResult<()> {
        let session = self.registry.get(session_id)?;
        if let Err(error) = self.terminate(session_id).await {
            tracing::warn!(session_id, %error, "terminal.close.terminate_failed");
        }
        self.registry.remove(session_id)?;

        let observers = {
            let mut runtime = session.runtime();
            runtime.view = None;
            runtime.observers.clone()
        };
        for observer in &observers {
            observer.on_closed(session_id);
        }
        tracing::info!(session_id, "terminal.session.closed");
        Ok(())
    }

    /// Recolors every attached view in place. Scrollback and emulator state
    /// are left alone.
    pub fn set_theme(&self, theme_id: &str) -> CoreResult<TerminalTheme> {
        let theme = builtin_theme(theme_id)?;
        *self.lock_theme() = theme.clone();
        self.registry.for_each(|session| {
            if let Some(view) = session.runtime().view.as_mut() {
                view.apply_theme(&theme);
            }
        });
        tracing::info!(theme = %theme.id, "terminal.theme.applied");
        Ok(theme)
    }

    pub fn current_theme(&self) -> TerminalTheme {
        self.lock_theme().clone()
    }

    pub fn snapshot(&self, session_id: &str) -> CoreResult<SessionSnapshot> {
        Ok(self.registry.get(session_id)?.snapshot())
    }

    pub fn list_sessions(&self, filter_path: Option<&str>) -> Vec<SessionSnapshot> {
        self.registry
            .list_visible(filter_path)
            .iter()
            .map(|session| session.snapshot())
            .collect()
    }

    pub fn scrollback(&self, session_id: &str) -> CoreResult<Vec<u8>> {
        Ok(self.registry.get(session_id)?.scrollback())
    }

    fn resolve_launch(&self, project: &Project, options: &CreateTerminalOptions) -> CoreResult<TerminalLaunch> {
        match options.kind {
            SessionKind::Assistant if options.run_assistant => assistant_launch(
                &self.config.assistant_bin,
                options.resume_descriptor.as_deref(),
                options.skip_permissions,
            ),
            SessionKind::Assistant | SessionKind::Plain | SessionKind::FileView => {
                Ok(plain_shell_launch(&self.config.shell))
            }
            SessionKind::Service(kind) => {
                let command = match options
                    .service_command
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                {
                    Some(command) => command.to_string(),
                    None => self.project_types.resolve_service_command(project, kind)?,
                };
                service_command_launch(&command)
            }
        }
    }

    fn lock_theme(&self) -> MutexGuard<'_, TerminalTheme> {
        self.theme.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_last_dims(&self) -> MutexGuard<'_, HashMap<SessionKind, TerminalDims>> {
        self.last_dims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn exited_error(session_id: &str) -> CoreError {
    CoreError::InvalidInput(format!("session \"{session_id}\" has exited."))
}

/// Single consumer of a session's PTY events, so scrollback receives bytes
/// in the order the PTY produced them.
async fn pump_session_output(
    session: Arc<Session>,
    mut events: mpsc::UnboundedReceiver<PtyEvent>,
    bus: EventBus,
) {
    while let Some(event) = events.recv().await {
        match event {
            PtyEvent::Data(chunk) => {
                let observers = {
                    let mut runtime = session.runtime();
                    runtime.scrollback.append(&chunk);
                    if let Some(view) = runtime.view.as_mut() {
                        view.write(&chunk);
                    }
                    runtime.observers.clone()
                };
                for observer in &observers {
                    observer.on_data(session.id(), &chunk);
                }
                bus.emit(CoreEvent::SessionData {
                    session_id: session.id().to_string(),
                    chunk,
                });
            }
            PtyEvent::Exit(exit_code) => {
                finish_session(&session, exit_code, &bus);
                return;
            }
        }
    }
    finish_session(&session, None, &bus);
}

fn finish_session(session: &Session, exit_code: Option<i32>, bus: &EventBus) {
    let footer = exit_footer(exit_code);
    let observers = {
        let mut runtime = session.runtime();
        if runtime.status == SessionStatus::Exited {
            return;
        }
        runtime.status = SessionStatus::Exited;
        runtime.exit_code = exit_code;
        runtime.pty_handle = None;
        runtime.scrollback.append(footer.as_bytes());
        if let Some(view) = runtime.view.as_mut() {
            view.write(footer.as_bytes());
        }
        runtime.observers.clone()
    };

    tracing::info!(session_id = session.id(), ?exit_code, "terminal.session.exited");
    bus.emit(CoreEvent::SessionData {
        session_id: session.id().to_string(),
        chunk: footer.into_bytes(),
    });
    bus.emit(CoreEvent::SessionExited {
        session_id: session.id().to_string(),
        exit_code,
    });
    for observer in &observers {
        observer.on_exit(session.id(), exit_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::common::dtos::ServiceKind;
    use crate::backend::event_polling_emission_pipeline::events_runtime::drain_events;
    use crate::backend::project_store::project_types::ProjectType;
    use crate::backend::test_support::{wait_until, FakePtyService, RecordingView, ViewOp};

    struct Harness {
        pty: Arc<FakePtyService>,
        orchestrator: TerminalOrchestrator,
        events: EventBus,
    }

    fn harness() -> Harness {
        let events = EventBus::new();
        let pty = Arc::new(FakePtyService::default());
        let registry = Arc::new(SessionRegistry::new(events.clone()));
        let config = OrchestratorConfig {
            assistant_bin: "assistant".to_string(),
            shell: "/bin/sh".to_string(),
            scrollback_lines: 100,
            ..OrchestratorConfig::default()
        };
        let orchestrator = TerminalOrchestrator::new(
            pty.clone(),
            registry,
            Arc::new(ProjectTypeRegistry::with_builtin_types()),
            events.clone(),
            config,
        )
        .unwrap();
        Harness { pty, orchestrator, events }
    }

    fn project() -> Project {
        Project::new("p1", "api", "/repo/api", ProjectType::Standalone)
    }

    #[tokio::test]
    async fn assistant_session_launches_cli_with_resume_and_becomes_active() {
        let h = harness();
        let mut options = CreateTerminalOptions::new(SessionKind::Assistant);
        options.resume_descriptor = Some("conv-42".to_string());
        options.skip_permissions = true;

        let snapshot = h.orchestrator.create_terminal(&project(), options).await.unwrap();
        let spawned = h.pty.spawned();
        assert_eq!(spawned[0].program, "assistant");
        assert_eq!(
            spawned[0].args,
            vec!["--resume", "conv-42", "--dangerously-skip-permissions"]
        );
        assert_eq!(spawned[0].cwd, PathBuf::from("/repo/api"));
        assert_eq!(spawned[0].dims, TerminalDims { cols: 120, rows: 30 });
        assert_eq!(h.orchestrator.registry().active_id(), Some(snapshot.id.clone()));
        assert_eq!(snapshot.resume_descriptor.as_deref(), Some("conv-42"));
    }

    #[tokio::test]
    async fn service_console_opens_in_background_with_banner() {
        let h = harness();
        let first = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();

        let mut options = CreateTerminalOptions::new(SessionKind::Service(ServiceKind::Dev));
        options.service_command = Some("npm run dev".to_string());
        let service = h.orchestrator.create_terminal(&project(), options).await.unwrap();

        assert_eq!(h.orchestrator.registry().active_id(), Some(first.id));
        let banner = String::from_utf8(h.orchestrator.scrollback(&service.id).unwrap()).unwrap();
        assert!(banner.contains("starting dev server: npm run dev"));
        assert_eq!(h.pty.spawned()[1].program, "npm");
    }

    #[tokio::test]
    async fn output_reaches_scrollback_in_order_and_exit_writes_footer() {
        let h = harness();
        let mut receiver = h.events.subscribe();
        let snapshot = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        let handle = h.pty.last_handle();

        for chunk in ["one ", "two ", "three"] {
            h.pty.emit_data(&handle, chunk.as_bytes());
        }
        h.pty.emit_exit(&handle, Some(3));
        wait_until(|| h.orchestrator.snapshot(&snapshot.id).unwrap().status == SessionStatus::Exited).await;

        let scrollback = String::from_utf8(h.orchestrator.scrollback(&snapshot.id).unwrap()).unwrap();
        assert_eq!(scrollback, "one two three\r\n[exited with code 3]\r\n");
        let exited = drain_events(&mut receiver)
            .into_iter()
            .filter(|event| matches!(event, CoreEvent::SessionExited { .. }))
            .count();
        assert_eq!(exited, 1);
        assert!(h.orchestrator.write_input(&snapshot.id, b"ls\n").await.is_err());
        assert!(h.orchestrator.registry().contains(&snapshot.id));
    }

    #[tokio::test]
    async fn attach_replays_before_live_output_and_theme_is_non_destructive() {
        let h = harness();
        let snapshot = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        let handle = h.pty.last_handle();
        h.pty.emit_data(&handle, b"\x1b[31mred\x1b[0m");
        wait_until(|| !h.orchestrator.scrollback(&snapshot.id).unwrap().is_empty()).await;

        let view = RecordingView::default();
        let ops = view.ops.clone();
        h.orchestrator.attach(&snapshot.id, Box::new(view)).unwrap();
        h.pty.emit_data(&handle, b"live");
        wait_until(|| ops.lock().unwrap().len() >= 3).await;
        h.orchestrator.set_theme("dracula").unwrap();

        let recorded = ops.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                ViewOp::Theme("claude".to_string()),
                ViewOp::Replay(b"\x1b[31mred\x1b[0m".to_vec()),
                ViewOp::Write(b"live".to_vec()),
                ViewOp::Theme("dracula".to_string()),
            ]
        );
        assert_eq!(
            h.orchestrator.scrollback(&snapshot.id).unwrap(),
            b"\x1b[31mred\x1b[0mlive".to_vec()
        );
    }

    #[tokio::test]
    async fn detached_sessions_keep_accumulating() {
        let h = harness();
        let snapshot = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        let handle = h.pty.last_handle();
        h.orchestrator
            .attach(&snapshot.id, Box::new(RecordingView::default()))
            .unwrap();
        assert!(h.orchestrator.detach(&snapshot.id).unwrap().is_some());

        h.pty.emit_data(&handle, b"while away");
        wait_until(|| h.orchestrator.scrollback(&snapshot.id).unwrap() == b"while away").await;
        assert!(!h.orchestrator.snapshot(&snapshot.id).unwrap().attached);
    }

    #[tokio::test]
    async fn resize_is_forwarded_and_remembered_per_kind() {
        let h = harness();
        let first = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        let dims = h.orchestrator.resize(&first.id, 90, 1).await.unwrap();
        assert_eq!(dims, TerminalDims { cols: 90, rows: 2 });
        assert_eq!(h.pty.resizes().len(), 1);

        let second = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        assert_eq!(second.dims, dims);
    }

    #[tokio::test]
    async fn input_is_forwarded_verbatim_in_order() {
        let h = harness();
        let snapshot = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        h.orchestrator.write_input(&snapshot.id, b"l").await.unwrap();
        h.orchestrator.write_input(&snapshot.id, b"s\r").await.unwrap();
        let writes = h.pty.writes().into_iter().map(|(_, bytes)| bytes).collect::<Vec<_>>();
        assert_eq!(writes, vec![b"l".to_vec(), b"s\r".to_vec()]);
    }

    #[tokio::test]
    async fn failed_spawn_unregisters_the_session() {
        let h = harness();
        h.pty.fail_next_spawn();
        let result = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await;
        assert!(matches!(result, Err(CoreError::ExternalFailure(_))));
        assert!(h.orchestrator.registry().list().is_empty());
    }

    #[tokio::test]
    async fn close_terminates_and_removes() {
        let h = harness();
        let mut receiver = h.events.subscribe();
        let snapshot = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Plain))
            .await
            .unwrap();
        h.orchestrator.close_terminal(&snapshot.id).await.unwrap();

        assert_eq!(h.pty.closed(), vec![h.pty.last_handle()]);
        assert!(!h.orchestrator.registry().contains(&snapshot.id));
        assert!(drain_events(&mut receiver).contains(&CoreEvent::SessionRemoved {
            session_id: snapshot.id.clone()
        }));
    }

    #[tokio::test]
    async fn service_without_command_is_rejected_before_spawning() {
        let h = harness();
        let result = h
            .orchestrator
            .create_terminal(&project(), CreateTerminalOptions::new(SessionKind::Service(ServiceKind::Api)))
            .await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
        assert!(h.pty.spawned().is_empty());
    }
}
