use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::Instant;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::responses::ApiError;
use super::state::ApiState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated,
    NotRequired,
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

pub struct ApiAuthenticator {
    token: Option<Zeroizing<String>>,
    public_paths: Vec<&'static str>,
}

impl ApiAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Zeroizing::new),
            public_paths: vec!["/v1/health", "/v1/metrics"],
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Authenticator with a random 32-character token, returned so the caller can show it once.
    pub fn with_generated_token() -> (Self, String) {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        (Self::new(Some(token.clone())), token)
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn authenticate(&self, path: &str, auth_header: Option<&str>) -> AuthResult {
        let Some(expected) = self.token.as_ref() else {
            return AuthResult::NotRequired;
        };

        if self.is_public_path(path) {
            return AuthResult::NotRequired;
        }

        let Some(header) = auth_header else {
            return AuthResult::MissingToken;
        };

        let Some(provided) = header.strip_prefix("Bearer ") else {
            return AuthResult::InvalidFormat;
        };

        if bool::from(provided.trim().as_bytes().ct_eq(expected.as_bytes())) {
            AuthResult::Authenticated
        } else {
            AuthResult::InvalidToken
        }
    }

    fn is_public_path(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|&p| path == p || path.starts_with(&format!("{}/", p)))
    }
}

pub async fn require_auth(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.auth.authenticate(request.uri().path(), header) {
        AuthResult::Authenticated | AuthResult::NotRequired => next.run(request).await,
        AuthResult::MissingToken => ApiError::unauthorized("missing bearer token").into_response(),
        AuthResult::InvalidFormat => {
            ApiError::unauthorized("authorization header must use the Bearer scheme").into_response()
        }
        AuthResult::InvalidToken => ApiError::unauthorized("invalid token").into_response(),
    }
}

pub async fn track_requests(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    state
        .metrics
        .record_request(!(status.is_server_error() || status.is_client_error()), started.elapsed());
    response
}
