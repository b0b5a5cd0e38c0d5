mod auth;
mod classify;
mod providers;

pub use auth::{authorization_header, normalize, AuthHeaderError, NormalizedCredential};
pub use classify::{classify_status, parse_retry_after, parse_timestamp, ProbeClass, ProbeIssue};
pub use providers::{profile, ProviderProfile, PROVIDERS};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tether_types::{AuthScheme, TetherError, TetherResult};
use tracing::debug;

use crate::registry::Credentials;

pub const CREDENTIAL_WARNING_DAYS: i64 = 7;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub class: ProbeClass,
    pub issue: Option<ProbeIssue>,
    pub status_code: Option<u16>,
    pub message: String,
    pub response_time_ms: Option<u64>,
    pub rate_limited: bool,
    pub retry_at: Option<DateTime<Utc>>,
    pub credential_expires_at: Option<DateTime<Utc>>,
    pub credential_expiring: bool,
}

impl ProbeOutcome {
    fn failed(class: ProbeClass, issue: ProbeIssue, message: String) -> Self {
        Self {
            class,
            issue: Some(issue),
            status_code: None,
            message,
            response_time_ms: None,
            rate_limited: false,
            retry_at: None,
            credential_expires_at: None,
            credential_expiring: false,
        }
    }
}

pub struct ProbeRequest<'a> {
    pub provider: &'a str,
    pub endpoint: &'a str,
    pub auth: AuthScheme,
    pub credentials: Option<&'a Credentials>,
}

/// Rewrites a generic failure into provider-specific guidance when the table has some.
pub fn enhance_message(profile: &ProviderProfile, issue: ProbeIssue, status: Option<u16>) -> String {
    let generic = issue.generic_message(status);
    match profile
        .guidance_for(issue)
        .or_else(|| providers::GENERIC.guidance_for(issue))
    {
        Some(hint) => format!("{} {}: {}", profile.display_name, generic, hint),
        None => format!("{} {}", profile.display_name, generic),
    }
}

pub struct ExternalProbe {
    client: Client,
}

impl ExternalProbe {
    pub fn new(timeout: Duration) -> TetherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TetherError::Network(format!("Failed to build probe client: {}", e)))?;
        Ok(Self { client })
    }

    /// One authenticated GET, classified. Never fails; every problem becomes an outcome.
    pub async fn probe(&self, request: &ProbeRequest<'_>) -> ProbeOutcome {
        let profile = profile(request.provider);
        let credential = request
            .credentials
            .map(|c| normalize(profile, c))
            .unwrap_or_default();

        let header = match authorization_header(request.auth, &credential) {
            Ok(header) => header,
            Err(_) => {
                return ProbeOutcome::failed(
                    ProbeClass::Error,
                    ProbeIssue::MissingCredentials,
                    enhance_message(profile, ProbeIssue::MissingCredentials, None),
                );
            }
        };

        let mut builder = self.client.get(request.endpoint);
        if let Some(value) = header.as_ref() {
            builder = builder.header(AUTHORIZATION, value.as_str());
        }

        debug!(provider = profile.id, "Probing {}", request.endpoint);
        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let issue = if e.is_timeout() {
                    ProbeIssue::Timeout
                } else {
                    ProbeIssue::Network
                };
                let mut outcome =
                    ProbeOutcome::failed(ProbeClass::Unhealthy, issue, enhance_message(profile, issue, None));
                outcome.response_time_ms = Some(started.elapsed().as_millis() as u64);
                debug!(provider = profile.id, "Probe request failed: {}", e);
                return outcome;
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = response.status().as_u16();
        let now = Utc::now();
        let (class, issue) = classify_status(status);
        let rate_limited = status == 429;
        let retry_at = if rate_limited {
            parse_retry_after(response.headers(), now)
        } else {
            None
        };

        let header_expiry = profile.expiry_header.and_then(|name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_timestamp)
        });
        let credential_expires_at = header_expiry.or(credential.expires_at);
        let credential_expiring = credential_expires_at
            .map(|at| at - now <= ChronoDuration::days(CREDENTIAL_WARNING_DAYS))
            .unwrap_or(false);

        let message = match (issue, credential_expires_at) {
            (Some(issue), _) => enhance_message(profile, issue, Some(status)),
            (None, Some(at)) if credential_expiring => format!(
                "{} reachable (HTTP {}), credentials expire {}",
                profile.display_name,
                status,
                at.format("%Y-%m-%d %H:%M UTC")
            ),
            (None, _) => format!("{} reachable (HTTP {})", profile.display_name, status),
        };

        ProbeOutcome {
            class,
            issue,
            status_code: Some(status),
            message,
            response_time_ms: Some(elapsed_ms),
            rate_limited,
            retry_at,
            credential_expires_at,
            credential_expiring,
        }
    }
}

#[cfg(test)]
mod tests;
