use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::session::Session;
use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::event_polling_emission_pipeline::events_runtime::{CoreEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborDirection {
    Prev,
    Next,
}

#[derive(Default)]
struct RegistryState {
    order: Vec<String>,
    sessions: HashMap<String, Arc<Session>>,
    active_id: Option<String>,
}

/// Live sessions in tab order plus the single active id.
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    events: EventBus,
}

impl SessionRegistry {
    pub fn new(events: EventBus) -> Self {
        SessionRegistry {
            state: Mutex::new(RegistryState::default()),
            events,
        }
    }

    pub fn add(&self, session: Arc<Session>) -> CoreResult<()> {
        let id = session.id().to_string();
        let project_id = session.project_ref().project_id.clone();
        let kind = session.kind();
        {
            let mut state = self.lock_state();
            if state.sessions.contains_key(&id) {
                return Err(CoreError::InvalidInput(format!(
                    "session \"{id}\" is already registered."
                )));
            }
            state.order.push(id.clone());
            state.sessions.insert(id.clone(), session);
        }
        self.events.emit(CoreEvent::SessionAdded {
            session_id: id,
            project_id,
            kind,
        });
        Ok(())
    }

    /// Removes the session. If it was active, focus moves to the session now
    /// occupying its tab slot (or the previous one when it was last).
    pub fn remove(&self, id: &str) -> CoreResult<Arc<Session>> {
        let (removed, next_active) = {
            let mut state = self.lock_state();
            let index = state
                .order
                .iter()
                .position(|entry| entry == id)
                .ok_or_else(|| CoreError::not_found("session", id))?;
            state.order.remove(index);
            let removed = state
                .sessions
                .remove(id)
                .ok_or_else(|| CoreError::not_found("session", id))?;

            let mut next_active = None;
            if state.active_id.as_deref() == Some(id) {
                let successor = state
                    .order
                    .get(index)
                    .or_else(|| index.checked_sub(1).and_then(|prev| state.order.get(prev)))
                    .cloned();
                state.active_id = successor.clone();
                if let Some(successor) = successor.as_ref().and_then(|id| state.sessions.get(id)) {
                    successor.set_focus(true);
                    next_active = Some(successor.id().to_string());
                }
            }
            (removed, next_active)
        };

        self.events.emit(CoreEvent::SessionRemoved {
            session_id: id.to_string(),
        });
        if let Some(session_id) = next_active {
            self.events.emit(CoreEvent::SessionActivated { session_id });
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> CoreResult<Arc<Session>> {
        self.lock_state()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("session", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock_state().sessions.contains_key(id)
    }

    /// Visits sessions in tab order. The callback runs without the registry
    /// lock held.
    pub fn for_each(&self, mut visit: impl FnMut(&Arc<Session>)) {
        for session in self.list() {
            visit(&session);
        }
    }

    pub fn list(&self) -> Vec<Arc<Session>> {
        let state = self.lock_state();
        state
            .order
            .iter()
            .filter_map(|id| state.sessions.get(id).cloned())
            .collect()
    }

    /// Sessions bound to `filter_path`, or all of them when no filter is set.
    pub fn list_visible(&self, filter_path: Option<&str>) -> Vec<Arc<Session>> {
        self.list()
            .into_iter()
            .filter(|session| matches_filter(session, filter_path))
            .collect()
    }

    pub fn active_id(&self) -> Option<String> {
        self.lock_state().active_id.clone()
    }

    /// Focuses `id`; emits only when focus actually moves.
    pub fn activate(&self, id: &str) -> CoreResult<()> {
        let changed = {
            let mut state = self.lock_state();
            let target = state
                .sessions
                .get(id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("session", id))?;
            if state.active_id.as_deref() == Some(id) {
                false
            } else {
                if let Some(previous) = state
                    .active_id
                    .as_ref()
                    .and_then(|previous| state.sessions.get(previous))
                {
                    previous.set_focus(false);
                }
                target.set_focus(true);
                state.active_id = Some(id.to_string());
                true
            }
        };
        if changed {
            self.events.emit(CoreEvent::SessionActivated {
                session_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Tab cycling target among visible sessions, wrapping at both ends.
    /// When the active session is hidden, `Next` starts from the first
    /// visible one and `Prev` from the last.
    pub fn neighbor(&self, direction: NeighborDirection, filter_path: Option<&str>) -> Option<String> {
        let visible = self
            .list_visible(filter_path)
            .into_iter()
            .map(|session| session.id().to_string())
            .collect::<Vec<_>>();
        if visible.is_empty() {
            return None;
        }

        let active = self.active_id();
        let position = active
            .as_deref()
            .and_then(|id| visible.iter().position(|entry| entry == id));
        let index = match (position, direction) {
            (Some(index), NeighborDirection::Next) => (index + 1) % visible.len(),
            (Some(index), NeighborDirection::Prev) => (index + visible.len() - 1) % visible.len(),
            (None, NeighborDirection::Next) => 0,
            (None, NeighborDirection::Prev) => visible.len() - 1,
        };
        visible.get(index).cloned()
    }

    /// True when any non-exited session is bound to `project_id`.
    pub fn project_has_live_sessions(&self, project_id: &str) -> bool {
        self.list()
            .iter()
            .any(|session| session.project_ref().project_id == project_id && session.is_live())
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn matches_filter(session: &Session, filter_path: Option<&str>) -> bool {
    match filter_path {
        None => true,
        Some(path) => trim_trailing_separator(&session.project_ref().path) == trim_trailing_separator(path),
    }
}

fn trim_trailing_separator(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        path
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::common::dtos::{SessionKind, SessionStatus};
    use crate::backend::event_polling_emission_pipeline::events_runtime::drain_events;
    use crate::backend::session_registry::session::test_session;

    fn registry_with(sessions: &[(&str, &str)]) -> SessionRegistry {
        let registry = SessionRegistry::new(EventBus::new());
        for (id, project) in sessions {
            let path = format!("/repo/{project}");
            registry
                .add(Arc::new(test_session(id, project, &path, SessionKind::Assistant)))
                .unwrap();
        }
        registry
    }

    #[test]
    fn tab_cycling_respects_filter_and_wraps() {
        let registry = registry_with(&[("s1", "p"), ("s2", "q"), ("s3", "p")]);
        registry.activate("s1").unwrap();

        let next = registry.neighbor(NeighborDirection::Next, Some("/repo/p")).unwrap();
        assert_eq!(next, "s3");
        registry.activate(&next).unwrap();
        assert_eq!(
            registry.neighbor(NeighborDirection::Next, Some("/repo/p")).as_deref(),
            Some("s1")
        );
        assert_eq!(
            registry.neighbor(NeighborDirection::Prev, None).as_deref(),
            Some("s2")
        );
    }

    #[test]
    fn neighbor_is_none_without_visible_sessions() {
        let registry = registry_with(&[("s1", "p")]);
        assert_eq!(registry.neighbor(NeighborDirection::Next, Some("/repo/other")), None);
        assert_eq!(
            registry.neighbor(NeighborDirection::Next, None).as_deref(),
            Some("s1")
        );
    }

    #[test]
    fn filter_hides_without_removing() {
        let registry = registry_with(&[("s1", "p"), ("s2", "q")]);
        let visible = registry.list_visible(Some("/repo/q/"));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id(), "s2");
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn activation_updates_status_and_emits_once() {
        let events = EventBus::new();
        let registry = SessionRegistry::new(events.clone());
        registry
            .add(Arc::new(test_session("s1", "p", "/repo/p", SessionKind::Plain)))
            .unwrap();
        registry
            .add(Arc::new(test_session("s2", "p", "/repo/p", SessionKind::Plain)))
            .unwrap();
        let mut receiver = events.subscribe();

        registry.activate("s1").unwrap();
        registry.activate("s1").unwrap();
        registry.activate("s2").unwrap();
        assert_eq!(drain_events(&mut receiver).len(), 2);
        assert_eq!(registry.get("s1").unwrap().status(), SessionStatus::Backgrounded);
        assert_eq!(registry.get("s2").unwrap().status(), SessionStatus::Active);

        assert!(matches!(registry.activate("nope"), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn removing_active_session_focuses_its_successor() {
        let registry = registry_with(&[("s1", "p"), ("s2", "p"), ("s3", "p")]);
        registry.activate("s3").unwrap();
        registry.remove("s3").unwrap();
        assert_eq!(registry.active_id().as_deref(), Some("s2"));

        registry.remove("s1").unwrap();
        assert_eq!(registry.active_id().as_deref(), Some("s2"));
        assert!(registry.remove("s1").is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let registry = registry_with(&[("s1", "p")]);
        let duplicate = Arc::new(test_session("s1", "p", "/repo/p", SessionKind::Plain));
        assert!(registry.add(duplicate).is_err());
    }

    #[test]
    fn for_each_visits_in_tab_order() {
        let registry = registry_with(&[("b", "p"), ("a", "p"), ("c", "p")]);
        let mut seen = Vec::new();
        registry.for_each(|session| seen.push(session.id().to_string()));
        assert_eq!(seen, vec!["b", "a", "c"]);
    }
}
