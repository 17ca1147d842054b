use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::common::errors::CoreResult;

fn request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Envelope every command returns. Failures carry the error message and its
/// stable code instead of rejecting the invoke promise.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandResponse<T> {
    pub request_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> CommandResponse<T> {
    pub(crate) fn respond(command: &'static str, result: CoreResult<T>) -> Self {
        let request_id = request_id();
        match result {
            Ok(data) => CommandResponse {
                request_id,
                ok: true,
                data: Some(data),
                error: None,
                code: None,
            },
            Err(error) => {
                tracing::warn!(command, code = error.code(), %error, "command.failed");
                CommandResponse {
                    request_id,
                    ok: false,
                    data: None,
                    error: Some(error.to_string()),
                    code: Some(error.code()),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectPayload {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionPayload {
    pub session_id: String,
}
