use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Dev,
    Game,
    Api,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Dev, ServiceKind::Game, ServiceKind::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Dev => "dev",
            ServiceKind::Game => "game",
            ServiceKind::Api => "api",
        }
    }

    pub fn banner_label(&self) -> &'static str {
        match self {
            ServiceKind::Dev => "dev server",
            ServiceKind::Game => "game server",
            ServiceKind::Api => "api server",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What runs inside a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Assistant,
    Plain,
    Service(ServiceKind),
    FileView,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Assistant => "assistant",
            SessionKind::Plain => "plain",
            SessionKind::Service(ServiceKind::Dev) => "service:dev",
            SessionKind::Service(ServiceKind::Game) => "service:game",
            SessionKind::Service(ServiceKind::Api) => "service:api",
            SessionKind::FileView => "file-view",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.trim() {
            "assistant" => Ok(SessionKind::Assistant),
            "plain" => Ok(SessionKind::Plain),
            "service:dev" => Ok(SessionKind::Service(ServiceKind::Dev)),
            "service:game" => Ok(SessionKind::Service(ServiceKind::Game)),
            "service:api" => Ok(SessionKind::Service(ServiceKind::Api)),
            "file-view" => Ok(SessionKind::FileView),
            other => Err(CoreError::InvalidInput(format!(
                "kind must be one of assistant, plain, service:dev, service:game, service:api, file-view (got \"{other}\")."
            ))),
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, SessionKind::Service(_))
    }

    pub fn service_kind(&self) -> Option<ServiceKind> {
        match self {
            SessionKind::Service(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SessionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SessionKind::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Backgrounded,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDims {
    pub cols: u16,
    pub rows: u16,
}

/// Result of a Git operation that ran to completion, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommandOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_conflicts: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl GitCommandOutcome {
    pub(crate) fn ok(output: impl Into<String>) -> Self {
        GitCommandOutcome {
            success: true,
            output: output.into(),
            ..GitCommandOutcome::default()
        }
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        GitCommandOutcome {
            success: false,
            error: Some(error.into()),
            ..GitCommandOutcome::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    StoppedWithError,
}

impl ServiceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Stopped | ServiceStatus::StoppedWithError)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStateSnapshot {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for ServiceStateSnapshot {
    fn default() -> Self {
        ServiceStateSnapshot {
            status: ServiceStatus::Stopped,
            port: None,
            exit_code: None,
            session_id: None,
            command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_kind_uses_colon_separated_service_names() {
        let encoded = serde_json::to_string(&SessionKind::Service(ServiceKind::Game)).unwrap();
        assert_eq!(encoded, "\"service:game\"");
        let decoded: SessionKind = serde_json::from_str("\"file-view\"").unwrap();
        assert_eq!(decoded, SessionKind::FileView);
    }

    #[test]
    fn rejects_unknown_session_kind() {
        assert!(SessionKind::parse("service:db").is_err());
    }

    #[test]
    fn outcome_omits_empty_conflict_fields() {
        let value = serde_json::to_value(GitCommandOutcome::ok("done")).unwrap();
        assert_eq!(value, serde_json::json!({ "success": true, "output": "done" }));
    }

    #[test]
    fn service_status_uses_kebab_case() {
        let encoded = serde_json::to_string(&ServiceStatus::StoppedWithError).unwrap();
        assert_eq!(encoded, "\"stopped-with-error\"");
    }
}
