use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ready,
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Ready | HealthStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ready => "ready",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }

    pub fn gauge(&self) -> i8 {
        match self {
            HealthStatus::Ready => 1,
            HealthStatus::Degraded => 0,
            HealthStatus::Down => -1,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Process,
    Http,
    Stdio,
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalState {
    Active,
    Inactive,
    Error,
    Connecting,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalStatus {
    pub state: ExternalState,
    pub message: String,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
}

impl ExternalStatus {
    pub fn connecting() -> Self {
        Self {
            state: ExternalState::Connecting,
            message: "Awaiting first health check".to_string(),
            last_checked: Utc::now(),
            response_time_ms: None,
        }
    }
}
