use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::common::dtos::{ServiceKind, ServiceStateSnapshot, SessionKind, TerminalDims};
use crate::backend::common::errors::CoreResult;
use crate::backend::event_polling_emission_pipeline::events_runtime::EventBus;
use crate::backend::git_workspace_engine::commit_message::{
    AssistantCliOracle, CommitMessageOracle, GeneratedMessage,
};
use crate::backend::git_workspace_engine::executor::{CliGitExecutor, GitExecutor};
use crate::backend::git_workspace_engine::git_runtime::GitWorkspaceEngine;
use crate::backend::git_workspace_engine::snapshot::QuickStatus;
use crate::backend::project_store::document::{Folder, Project};
use crate::backend::project_store::persistence::PersistMode;
use crate::backend::project_store::project_types::ProjectTypeRegistry;
use crate::backend::project_store::store_runtime::{LiveResourceProbe, ProjectStore};
use crate::backend::pty_terminal_sessions::native_pty::NativePtyService;
use crate::backend::pty_terminal_sessions::pty_service::PtyService;
use crate::backend::pty_terminal_sessions::session_runtime::{
    CreateTerminalOptions, OrchestratorConfig, TerminalOrchestrator,
};
use crate::backend::pty_terminal_sessions::theme::TerminalTheme;
use crate::backend::service_supervisor::supervisor_runtime::ServiceSupervisor;
use crate::backend::session_registry::registry_runtime::SessionRegistry;
use crate::backend::session_registry::resume_index::{
    AssistantSessionIndex, DirectorySessionIndex, ResumeEntry, ResumeIndex,
};
use crate::backend::session_registry::session::{ProjectRef, SessionSnapshot};
use crate::backend::startup_health_checks_binary_validation::binary_runtime::{
    check_startup_health, StartupHealth,
};
use crate::backend::time_tracking::time_runtime::TimeTracker;
use crate::backend::workspace_metadata_settings::core_config::CoreConfig;
use crate::backend::workspace_metadata_settings::settings_runtime::SettingsStore;

/// The external services the core drives.
pub struct WorkstationDeps {
    pub pty: Arc<dyn PtyService>,
    pub git: Arc<dyn GitExecutor>,
    pub oracle: Option<Arc<dyn CommitMessageOracle>>,
    pub session_index: Arc<dyn AssistantSessionIndex>,
}

impl WorkstationDeps {
    /// Host PTYs, the git CLI, the Assistant CLI as commit oracle and the
    /// Assistant's on-disk session directory.
    pub fn native(config: &CoreConfig) -> Self {
        WorkstationDeps {
            pty: Arc::new(NativePtyService::new()),
            git: Arc::new(CliGitExecutor::new(config.git_bin.clone())),
            oracle: Some(Arc::new(AssistantCliOracle::new(config.assistant_bin.clone()))),
            session_index: Arc::new(DirectorySessionIndex::new(config.assistant_projects_dir())),
        }
    }
}

/// Options for opening a terminal through the workstation. Unset values
/// come from the settings document.
#[derive(Debug, Clone)]
pub struct OpenTerminalRequest {
    pub kind: SessionKind,
    pub run_assistant: bool,
    pub skip_permissions: Option<bool>,
    pub resume_descriptor: Option<String>,
    pub cwd_override: Option<String>,
    pub dims: Option<TerminalDims>,
}

impl OpenTerminalRequest {
    pub fn new(kind: SessionKind) -> Self {
        OpenTerminalRequest {
            kind,
            run_assistant: true,
            skip_permissions: None,
            resume_descriptor: None,
            cwd_override: None,
            dims: None,
        }
    }
}

struct WorkstationProbe<'a> {
    registry: &'a SessionRegistry,
    supervisor: &'a ServiceSupervisor,
}

impl LiveResourceProbe for WorkstationProbe<'_> {
    fn project_has_live_resources(&self, project_id: &str) -> bool {
        self.registry.project_has_live_sessions(project_id)
            || self.supervisor.project_has_live_services(project_id)
    }
}

/// Composition root: owns every component and the flows that span them.
pub struct Workstation {
    config: CoreConfig,
    events: EventBus,
    store: ProjectStore,
    project_types: Arc<ProjectTypeRegistry>,
    orchestrator: Arc<TerminalOrchestrator>,
    git: Arc<GitWorkspaceEngine>,
    supervisor: ServiceSupervisor,
    settings: SettingsStore,
    time: Arc<TimeTracker>,
    resume: ResumeIndex,
}

impl Workstation {
    /// Must run inside a tokio runtime: the store's debounced writer and the
    /// PTY pumps are tokio tasks.
    pub fn open(config: CoreConfig, deps: WorkstationDeps) -> CoreResult<Self> {
        let events = EventBus::new();
        let settings = SettingsStore::open(config.settings_path())?;
        let preferences = settings.get();

        let store = ProjectStore::open(
            config.projects_path(),
            PersistMode::Debounced(config.persist_debounce),
            events.clone(),
        );
        let project_types = Arc::new(ProjectTypeRegistry::with_builtin_types());
        let registry = Arc::new(SessionRegistry::new(events.clone()));
        let orchestrator = Arc::new(TerminalOrchestrator::new(
            deps.pty,
            registry,
            project_types.clone(),
            events.clone(),
            OrchestratorConfig {
                assistant_bin: config.assistant_bin.clone(),
                shell: config.shell.clone(),
                scrollback_lines: config.scrollback_lines,
                scrollback_bytes: config.scrollback_bytes,
                default_dims: config.default_dims,
                theme_id: preferences.terminal_theme.clone(),
            },
        )?);
        let git = Arc::new(
            GitWorkspaceEngine::new(deps.git, deps.oracle, events.clone())
                .with_scan_concurrency(config.scan_concurrency),
        );
        let supervisor = ServiceSupervisor::new(orchestrator.clone(), events.clone())
            .with_log_bytes(config.service_log_bytes);
        let time = Arc::new(TimeTracker::new(config.time_log_path()));
        let resume = ResumeIndex::new(deps.session_index);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            projects = store.projects().len(),
            theme = %preferences.terminal_theme,
            "workstation.opened"
        );
        Ok(Workstation {
            config,
            events,
            store,
            project_types,
            orchestrator,
            git,
            supervisor,
            settings,
            time,
            resume,
        })
    }

    /// Resolves configuration from the environment, checks the external
    /// binaries and wires the native services.
    pub fn open_native() -> CoreResult<(Self, StartupHealth)> {
        let config = CoreConfig::from_env()?;
        let health = check_startup_health(&config);
        let deps = WorkstationDeps::native(&config);
        Ok((Workstation::open(config, deps)?, health))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn project_types(&self) -> &ProjectTypeRegistry {
        &self.project_types
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.orchestrator.registry()
    }

    pub fn terminals(&self) -> &Arc<TerminalOrchestrator> {
        &self.orchestrator
    }

    pub fn git(&self) -> &Arc<GitWorkspaceEngine> {
        &self.git
    }

    pub fn services(&self) -> &ServiceSupervisor {
        &self.supervisor
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn time_tracker(&self) -> &TimeTracker {
        &self.time
    }

    pub fn project_ref(&self, project_id: &str) -> CoreResult<ProjectRef> {
        Ok(ProjectRef::from(&self.store.project(project_id)?))
    }

    pub async fn open_terminal(&self, project_id: &str, request: OpenTerminalRequest) -> CoreResult<SessionSnapshot> {
        let project = self.store.project(project_id)?;
        let mut options = CreateTerminalOptions::new(request.kind);
        options.run_assistant = request.run_assistant;
        options.skip_permissions = request
            .skip_permissions
            .unwrap_or_else(|| self.settings.get().skip_permissions);
        options.resume_descriptor = request.resume_descriptor;
        options.cwd_override = request.cwd_override;
        options.dims = request.dims;
        options.observers.push(self.time.clone());
        self.orchestrator.create_terminal(&project, options).await
    }

    /// Previous Assistant conversations that can be resumed in `project_id`.
    pub async fn resumable_sessions(&self, project_id: &str) -> CoreResult<Vec<ResumeEntry>> {
        let project = self.store.project(project_id)?;
        self.resume.rebuild(&project.path).await
    }

    /// `use_ai` falls back to the `aiCommitMessages` preference.
    pub async fn generate_commit_message(
        &self,
        project_id: &str,
        selected_files: &[String],
        use_ai: Option<bool>,
    ) -> CoreResult<GeneratedMessage> {
        let project = self.project_ref(project_id)?;
        let use_ai = use_ai.unwrap_or_else(|| self.settings.get().ai_commit_messages);
        self.git.generate_message(&project, selected_files, use_ai).await
    }

    pub async fn start_service(
        &self,
        project_id: &str,
        kind: ServiceKind,
        command: Option<String>,
    ) -> CoreResult<ServiceStateSnapshot> {
        let project = self.store.project(project_id)?;
        self.supervisor.start(&project, kind, command).await
    }

    /// Quick repository status for every project, for sidebar badges.
    pub async fn startup_scan(&self) -> HashMap<String, QuickStatus> {
        let projects = self
            .store
            .projects()
            .iter()
            .map(ProjectRef::from)
            .collect::<Vec<_>>();
        self.git.scan_all(&projects).await
    }

    pub fn set_terminal_theme(&self, theme_id: &str) -> CoreResult<TerminalTheme> {
        let theme = self.orchestrator.set_theme(theme_id)?;
        self.settings
            .update(|settings| settings.terminal_theme = theme.id.clone())?;
        Ok(theme)
    }

    /// Refused while the project has live sessions or services.
    pub fn delete_project(&self, project_id: &str) -> CoreResult<Project> {
        let removed = self.store.delete_project(project_id, &self.probe())?;
        let kinds = self
            .project_types
            .capabilities(removed.project_type)
            .on_delete(&removed);
        self.supervisor.forget(&removed.id, &kinds);
        self.resume.forget(&removed.path);
        Ok(removed)
    }

    /// Refused while any project in the subtree has live sessions or
    /// services.
    pub fn delete_folder(&self, folder_id: &str) -> CoreResult<()> {
        self.store.delete_folder(folder_id, &self.probe())
    }

    pub fn folder(&self, folder_id: &str) -> CoreResult<Folder> {
        self.store.folder(folder_id)
    }

    /// Stops services, closes every session and flushes the projects
    /// document.
    pub async fn shutdown(&self) -> CoreResult<()> {
        for project in self.store.projects() {
            if let Err(error) = self.supervisor.stop_all(&project.id).await {
                tracing::warn!(project_id = %project.id, %error, "workstation.shutdown.stop_failed");
            }
        }
        for session in self.orchestrator.registry().list() {
            if let Err(error) = self.orchestrator.close_terminal(session.id()).await {
                tracing::warn!(session_id = session.id(), %error, "workstation.shutdown.close_failed");
            }
        }
        self.store.flush().await?;
        tracing::info!("workstation.shutdown.done");
        Ok(())
    }

    fn probe(&self) -> WorkstationProbe<'_> {
        WorkstationProbe {
            registry: self.orchestrator.registry(),
            supervisor: &self.supervisor,
        }
    }
}
