use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tether_types::TetherError;

#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Error answered as `{ "error": ..., "code": ... }`.
#[derive(Clone, Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str, slug: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{} '{}' is not monitored", what, slug))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }
}

impl From<TetherError> for ApiError {
    fn from(err: TetherError) -> Self {
        let (status, code) = match &err {
            TetherError::UnknownTarget(_) => (StatusCode::NOT_FOUND, "not_found"),
            TetherError::AlreadyRunning(_) => (StatusCode::CONFLICT, "already_running"),
            TetherError::NotRunning(_) => (StatusCode::CONFLICT, "not_running"),
            TetherError::Config(_) => (StatusCode::BAD_REQUEST, "invalid_target"),
            TetherError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
            TetherError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            TetherError::Process(_) => (StatusCode::INTERNAL_SERVER_ERROR, "process_error"),
            TetherError::LogAccess(_) => (StatusCode::INTERNAL_SERVER_ERROR, "log_access"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessActionResponse {
    pub slug: String,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}
