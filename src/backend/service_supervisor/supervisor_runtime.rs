use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::log_tail::LogTail;
use super::port_detection::PortDetector;
use crate::backend::common::constants::DEFAULT_SERVICE_LOG_BYTES;
use crate::backend::common::dtos::{ServiceKind, ServiceStateSnapshot, ServiceStatus, SessionKind};
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};
use crate::backend::project_store::document::Project;
use crate::backend::pty_terminal_sessions::session_runtime::{CreateTerminalOptions, TerminalOrchestrator};
use crate::backend::pty_terminal_sessions::terminal_view::SessionObserver;

type ServiceKey = (String, ServiceKind);

struct ServiceEntry {
    state: ServiceStateSnapshot,
    /// Bumped on every start so observers of an earlier run go quiet.
    generation: u64,
    stop_requested: bool,
    tail: LogTail,
    detector: PortDetector,
}

impl ServiceEntry {
    fn new(log_bytes: usize) -> Self {
        ServiceEntry {
            state: ServiceStateSnapshot::default(),
            generation: 0,
            stop_requested: false,
            tail: LogTail::new(log_bytes),
            detector: PortDetector::default(),
        }
    }
}

struct SupervisorShared {
    entries: Mutex<HashMap<ServiceKey, ServiceEntry>>,
    events: EventBus,
}

impl SupervisorShared {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<ServiceKey, ServiceEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `update` to the entry of the current run and publishes the
    /// resulting state when `update` reports a change.
    fn update_run(&self, key: &ServiceKey, generation: u64, update: impl FnOnce(&mut ServiceEntry) -> bool) {
        let changed = {
            let mut entries = self.lock_entries();
            match entries.get_mut(key) {
                Some(entry) if entry.generation == generation => update(entry).then(|| entry.state.clone()),
                _ => None,
            }
        };
        if let Some(state) = changed {
            self.publish(key, state);
        }
    }

    fn publish(&self, key: &ServiceKey, state: ServiceStateSnapshot) {
        tracing::info!(
            project_id = %key.0,
            kind = %key.1,
            status = ?state.status,
            port = ?state.port,
            exit_code = ?state.exit_code,
            "service.state.changed"
        );
        self.events.emit(CoreEvent::ServiceState {
            project_id: key.0.clone(),
            kind: key.1,
            state,
        });
    }
}

/// Follows one service console: first output marks it running, output is
/// tailed and scanned for a port, and the exit settles the final state.
struct ServiceRunObserver {
    shared: Arc<SupervisorShared>,
    key: ServiceKey,
    generation: u64,
}

impl SessionObserver for ServiceRunObserver {
    fn on_data(&self, _session_id: &str, chunk: &[u8]) {
        self.shared.update_run(&self.key, self.generation, |entry| {
            entry.tail.append(chunk);
            let mut changed = false;
            if entry.state.status == ServiceStatus::Starting {
                entry.state.status = ServiceStatus::Running;
                changed = true;
            }
            if entry.state.port.is_none() {
                if let Some(port) = entry.detector.feed(chunk) {
                    entry.state.port = Some(port);
                    changed = true;
                }
            }
            changed
        });
    }

    fn on_exit(&self, _session_id: &str, exit_code: Option<i32>) {
        self.shared.update_run(&self.key, self.generation, |entry| {
            entry.state.status = if entry.stop_requested || exit_code == Some(0) {
                ServiceStatus::Stopped
            } else {
                ServiceStatus::StoppedWithError
            };
            entry.state.exit_code = exit_code;
            true
        });
    }

    fn on_closed(&self, _session_id: &str) {
        self.shared.update_run(&self.key, self.generation, |entry| {
            entry.state.session_id = None;
            if entry.state.status.is_terminal() {
                return false;
            }
            entry.state.status = ServiceStatus::Stopped;
            true
        });
    }
}

/// Tracks long-running project services (dev/game/api servers), each run in
/// its own background terminal session.
pub struct ServiceSupervisor {
    orchestrator: Arc<TerminalOrchestrator>,
    shared: Arc<SupervisorShared>,
    log_bytes: usize,
}

impl ServiceSupervisor {
    pub fn new(orchestrator: Arc<TerminalOrchestrator>, events: EventBus) -> Self {
        ServiceSupervisor {
            orchestrator,
            shared: Arc::new(SupervisorShared {
                entries: Mutex::new(HashMap::new()),
                events,
            }),
            log_bytes: DEFAULT_SERVICE_LOG_BYTES,
        }
    }

    pub fn with_log_bytes(mut self, log_bytes: usize) -> Self {
        self.log_bytes = log_bytes;
        self
    }

    /// Starts `kind` for `project`. `command` overrides the configured or
    /// autodetected command for this run only.
    pub async fn start(
        &self,
        project: &Project,
        kind: ServiceKind,
        command: Option<String>,
    ) -> CoreResult<ServiceStateSnapshot> {
        let key = (project.id.clone(), kind);
        let (generation, previous_session, starting) = {
            let mut entries = self.shared.lock_entries();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| ServiceEntry::new(self.log_bytes));
            if !entry.state.status.is_terminal() {
                return Err(CoreError::AlreadyRunning {
                    project_id: project.id.clone(),
                    kind: kind.to_string(),
                });
            }
            entry.generation += 1;
            entry.stop_requested = false;
            entry.tail.clear();
            entry.detector = PortDetector::default();
            let previous_session = entry.state.session_id.take();
            entry.state = ServiceStateSnapshot {
                status: ServiceStatus::Starting,
                ..ServiceStateSnapshot::default()
            };
            (entry.generation, previous_session, entry.state.clone())
        };
        self.shared.publish(&key, starting);

        if let Some(session_id) = previous_session {
            if let Err(error) = self.orchestrator.close_terminal(&session_id).await {
                tracing::debug!(session_id = %session_id, %error, "service.previous_console.close_failed");
            }
        }

        let mut options = CreateTerminalOptions::new(SessionKind::Service(kind));
        options.service_command = command;
        options.observers.push(Arc::new(ServiceRunObserver {
            shared: self.shared.clone(),
            key: key.clone(),
            generation,
        }));

        match self.orchestrator.create_terminal(project, options).await {
            Ok(session) => {
                let mut state = None;
                let mut stop_requested = false;
                self.shared.update_run(&key, generation, |entry| {
                    entry.state.session_id = Some(session.id.clone());
                    entry.state.command = Some(session.command.clone());
                    stop_requested = entry.stop_requested;
                    state = Some(entry.state.clone());
                    false
                });
                // A stop that landed while the console was spawning had no
                // session to terminate yet.
                if stop_requested {
                    tracing::info!(project_id = %project.id, %kind, "service.start.stopped_while_starting");
                    if let Err(error) = self.orchestrator.terminate(&session.id).await {
                        tracing::warn!(project_id = %project.id, %kind, %error, "service.start.terminate_failed");
                    }
                }
                Ok(state.unwrap_or_else(|| self.state(&project.id, kind)))
            }
            Err(error) => {
                tracing::warn!(project_id = %project.id, %kind, %error, "service.start.failed");
                self.shared.update_run(&key, generation, |entry| {
                    entry.state.status = ServiceStatus::StoppedWithError;
                    true
                });
                Err(error)
            }
        }
    }

    /// Terminates the running process; the state settles when the exit
    /// arrives. Stopping a service that is not running is a no-op.
    pub async fn stop(&self, project_id: &str, kind: ServiceKind) -> CoreResult<()> {
        let session_id = {
            let mut entries = self.shared.lock_entries();
            let Some(entry) = entries.get_mut(&(project_id.to_string(), kind)) else {
                return Ok(());
            };
            if entry.state.status.is_terminal() {
                return Ok(());
            }
            entry.stop_requested = true;
            entry.state.session_id.clone()
        };

        match session_id {
            Some(session_id) => self.orchestrator.terminate(&session_id).await,
            None => Ok(()),
        }
    }

    /// Stops every live service of a project.
    pub async fn stop_all(&self, project_id: &str) -> CoreResult<()> {
        for kind in ServiceKind::ALL {
            self.stop(project_id, kind).await?;
        }
        Ok(())
    }

    pub fn state(&self, project_id: &str, kind: ServiceKind) -> ServiceStateSnapshot {
        self.shared
            .lock_entries()
            .get(&(project_id.to_string(), kind))
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    pub fn states(&self, project_id: &str) -> Vec<(ServiceKind, ServiceStateSnapshot)> {
        ServiceKind::ALL
            .into_iter()
            .map(|kind| (kind, self.state(project_id, kind)))
            .collect()
    }

    /// Recent console output of the service, bounded by the log cap.
    pub fn tail(&self, project_id: &str, kind: ServiceKind) -> String {
        self.shared
            .lock_entries()
            .get(&(project_id.to_string(), kind))
            .map(|entry| entry.tail.text())
            .unwrap_or_default()
    }

    /// Drops the recorded state of `kinds` once their project is gone.
    pub fn forget(&self, project_id: &str, kinds: &[ServiceKind]) {
        let mut entries = self.shared.lock_entries();
        for kind in kinds {
            entries.remove(&(project_id.to_string(), *kind));
        }
    }

    pub fn project_has_live_services(&self, project_id: &str) -> bool {
        self.shared
            .lock_entries()
            .iter()
            .any(|((owner, _), entry)| owner == project_id && !entry.state.status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::event_polling_emission_pipeline::events_runtime::drain_events;
    use crate::backend::project_store::project_types::{ProjectType, ProjectTypeRegistry};
    use crate::backend::pty_terminal_sessions::session_runtime::OrchestratorConfig;
    use crate::backend::session_registry::registry_runtime::SessionRegistry;
    use crate::backend::test_support::{wait_until, FakePtyService};
    use std::time::Duration;

    struct Harness {
        pty: Arc<FakePtyService>,
        orchestrator: Arc<TerminalOrchestrator>,
        supervisor: ServiceSupervisor,
        events: EventBus,
    }

    fn harness() -> Harness {
        let events = EventBus::new();
        let pty = Arc::new(FakePtyService::default());
        let orchestrator = Arc::new(
            TerminalOrchestrator::new(
                pty.clone(),
                Arc::new(SessionRegistry::new(events.clone())),
                Arc::new(ProjectTypeRegistry::with_builtin_types()),
                events.clone(),
                OrchestratorConfig::default(),
            )
            .unwrap(),
        );
        let supervisor = ServiceSupervisor::new(orchestrator.clone(), events.clone()).with_log_bytes(64);
        Harness {
            pty,
            orchestrator,
            supervisor,
            events,
        }
    }

    fn webapp() -> Project {
        let mut project = Project::new("web", "web", "/repo/web", ProjectType::Webapp);
        project.dev_command = Some("npm run dev".to_string());
        project
    }

    #[tokio::test]
    async fn walks_starting_running_stopped() {
        let h = harness();
        let mut receiver = h.events.subscribe();
        let started = h.supervisor.start(&webapp(), ServiceKind::Dev, None).await.unwrap();
        assert_eq!(started.status, ServiceStatus::Starting);
        assert_eq!(started.command.as_deref(), Some("npm run dev"));

        let handle = h.pty.last_handle();
        h.pty.emit_data(&handle, b"  Local:   http://localhost:5173/\n");
        wait_until(|| h.supervisor.state("web", ServiceKind::Dev).port == Some(5173)).await;
        assert_eq!(h.supervisor.state("web", ServiceKind::Dev).status, ServiceStatus::Running);
        assert!(h.supervisor.project_has_live_services("web"));

        h.supervisor.stop("web", ServiceKind::Dev).await.unwrap();
        wait_until(|| h.supervisor.state("web", ServiceKind::Dev).status == ServiceStatus::Stopped).await;
        assert!(!h.supervisor.project_has_live_services("web"));

        let statuses = drain_events(&mut receiver)
            .into_iter()
            .filter_map(|event| match event {
                CoreEvent::ServiceState { state, .. } => Some(state.status),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(statuses.first(), Some(&ServiceStatus::Starting));
        assert_eq!(statuses.last(), Some(&ServiceStatus::Stopped));
        assert!(statuses.contains(&ServiceStatus::Running));
    }

    #[tokio::test]
    async fn second_start_while_live_is_rejected() {
        let h = harness();
        h.supervisor.start(&webapp(), ServiceKind::Dev, None).await.unwrap();
        let again = h.supervisor.start(&webapp(), ServiceKind::Dev, None).await;
        assert!(matches!(again, Err(CoreError::AlreadyRunning { .. })));
        assert_eq!(h.pty.spawned().len(), 1);
    }

    #[tokio::test]
    async fn crash_ends_in_error_and_can_restart() {
        let h = harness();
        h.supervisor.start(&webapp(), ServiceKind::Dev, None).await.unwrap();
        let first = h.pty.last_handle();
        h.pty.emit_data(&first, b"boom\n");
        h.pty.emit_exit(&first, Some(1));
        wait_until(|| h.supervisor.state("web", ServiceKind::Dev).status == ServiceStatus::StoppedWithError).await;
        assert_eq!(h.supervisor.state("web", ServiceKind::Dev).exit_code, Some(1));
        assert!(h.supervisor.tail("web", ServiceKind::Dev).contains("boom"));

        let restarted = h.supervisor.start(&webapp(), ServiceKind::Dev, None).await.unwrap();
        assert_eq!(restarted.status, ServiceStatus::Starting);
        assert_eq!(h.orchestrator.registry().list().len(), 1);
        assert!(h.supervisor.tail("web", ServiceKind::Dev).is_empty());
    }

    #[tokio::test]
    async fn tail_is_bounded() {
        let h = harness();
        h.supervisor.start(&webapp(), ServiceKind::Dev, None).await.unwrap();
        let handle = h.pty.last_handle();
        h.pty.emit_data(&handle, &[b'x'; 100]);
        h.pty.emit_data(&handle, b"END");
        wait_until(|| h.supervisor.tail("web", ServiceKind::Dev).ends_with("END")).await;
        assert_eq!(h.supervisor.tail("web", ServiceKind::Dev).len(), 64);
    }

    #[tokio::test]
    async fn missing_command_fails_the_start() {
        let h = harness();
        let bare = Project::new("api", "api", "/repo/api", ProjectType::Api);
        let result = h.supervisor.start(&bare, ServiceKind::Api, None).await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
        assert_eq!(h.supervisor.state("api", ServiceKind::Api).status, ServiceStatus::StoppedWithError);
    }

    #[tokio::test]
    async fn stop_during_spawn_terminates_the_new_console() {
        let h = harness();
        h.pty.delay_spawns(Duration::from_millis(50));
        let project = webapp();

        let (started, stopped) = tokio::join!(h.supervisor.start(&project, ServiceKind::Dev, None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.supervisor.stop("web", ServiceKind::Dev).await
        });
        assert_eq!(started.unwrap().status, ServiceStatus::Starting);
        stopped.unwrap();

        assert_eq!(h.pty.closed(), vec![h.pty.last_handle()]);
        wait_until(|| h.supervisor.state("web", ServiceKind::Dev).status == ServiceStatus::Stopped).await;
        assert!(!h.supervisor.project_has_live_services("web"));
    }

    #[tokio::test]
    async fn stopping_an_idle_service_is_a_no_op() {
        let h = harness();
        h.supervisor.stop("web", ServiceKind::Game).await.unwrap();
        assert_eq!(h.supervisor.state("web", ServiceKind::Game).status, ServiceStatus::Stopped);
    }
}
