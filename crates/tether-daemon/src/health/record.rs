use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tether_types::{CheckKind, ExternalStatus, HealthStatus, TargetKind};

use crate::probe::ProbeClass;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub timestamp: DateTime<Utc>,
    pub kind: CheckKind,
    pub success: bool,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a single probe observed, before classification.
#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub kind: CheckKind,
    pub success: bool,
    /// False when the failure should not count toward the consecutive-failure streak.
    pub counts_as_failure: bool,
    pub process_running: bool,
    pub unrecoverable: bool,
    pub impaired: bool,
    pub latency_ms: Option<u64>,
    pub message: String,
    pub error: Option<String>,
    pub handshake_detected: bool,
    pub remote: Option<RemoteObservation>,
}

impl ProbeResult {
    pub fn ok(kind: CheckKind, latency_ms: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            kind,
            success: true,
            counts_as_failure: false,
            process_running: true,
            unrecoverable: false,
            impaired: false,
            latency_ms,
            message: message.into(),
            error: None,
            handshake_detected: false,
            remote: None,
        }
    }

    pub fn impaired(kind: CheckKind, message: impl Into<String>) -> Self {
        Self {
            impaired: true,
            ..Self::ok(kind, None, message)
        }
    }

    pub fn failed(kind: CheckKind, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            kind,
            success: false,
            counts_as_failure: true,
            process_running: true,
            unrecoverable: false,
            impaired: false,
            latency_ms: None,
            message: error.clone(),
            error: Some(error),
            handshake_detected: false,
            remote: None,
        }
    }

    pub fn unrecoverable(kind: CheckKind, error: impl Into<String>) -> Self {
        Self {
            unrecoverable: true,
            ..Self::failed(kind, error)
        }
    }

    pub fn not_running(kind: CheckKind) -> Self {
        Self {
            kind,
            success: false,
            counts_as_failure: false,
            process_running: false,
            unrecoverable: false,
            impaired: false,
            latency_ms: None,
            message: "process is not running".to_string(),
            error: Some("process is not running".to_string()),
            handshake_detected: false,
            remote: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RemoteObservation {
    pub class: ProbeClass,
    pub status_code: Option<u16>,
    pub rate_limited: bool,
    pub retry_at: Option<DateTime<Utc>>,
    pub credential_expiring: bool,
    pub credential_expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHealth {
    pub provider: String,
    pub last_status_code: Option<u16>,
    pub rate_limited: bool,
    pub rate_limit_reset: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub consecutive_rate_limited: u32,
    pub credential_warning: bool,
    pub credential_expires_at: Option<DateTime<Utc>>,
    pub external: ExternalStatus,
}

impl RemoteHealth {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            last_status_code: None,
            rate_limited: false,
            rate_limit_reset: None,
            consecutive_rate_limited: 0,
            credential_warning: false,
            credential_expires_at: None,
            external: ExternalStatus::connecting(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub slug: String,
    pub kind: TargetKind,
    pub status: HealthStatus,
    pub message: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_status_change: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub min_response_ms: Option<u64>,
    pub max_response_ms: Option<u64>,
    pub avg_response_ms: Option<f64>,
    #[serde(skip)]
    response_samples: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub handshake_complete: bool,
    pub history: VecDeque<CheckOutcome>,
    #[serde(skip)]
    history_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteHealth>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub persistent_failure: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

impl HealthRecord {
    pub fn new(slug: &str, kind: TargetKind, history_capacity: usize) -> Self {
        Self {
            slug: slug.to_string(),
            kind,
            status: HealthStatus::Down,
            message: "awaiting first check".to_string(),
            last_checked: None,
            last_status_change: None,
            total_checks: 0,
            total_failures: 0,
            consecutive_failures: 0,
            min_response_ms: None,
            max_response_ms: None,
            avg_response_ms: None,
            response_samples: 0,
            handshake_complete: false,
            history: VecDeque::with_capacity(history_capacity.min(128)),
            history_capacity: history_capacity.max(1),
            remote: None,
        }
    }

    /// Consecutive failures this result would leave behind.
    pub fn next_consecutive(&self, result: &ProbeResult) -> u32 {
        if result.success || !result.counts_as_failure {
            0
        } else {
            self.consecutive_failures.saturating_add(1)
        }
    }

    /// Running average including `latency_ms`, without recording it.
    pub fn projected_average(&self, latency_ms: Option<u64>) -> Option<u64> {
        match (self.avg_response_ms, latency_ms) {
            (Some(avg), Some(ms)) => {
                let n = self.response_samples as f64;
                Some(((avg * n + ms as f64) / (n + 1.0)).round() as u64)
            }
            (None, Some(ms)) => Some(ms),
            (Some(avg), None) => Some(avg.round() as u64),
            (None, None) => None,
        }
    }

    fn record_latency(&mut self, ms: u64) {
        self.min_response_ms = Some(self.min_response_ms.map_or(ms, |m| m.min(ms)));
        self.max_response_ms = Some(self.max_response_ms.map_or(ms, |m| m.max(ms)));
        let n = self.response_samples as f64;
        let avg = self.avg_response_ms.unwrap_or(0.0);
        self.avg_response_ms = Some((avg * n + ms as f64) / (n + 1.0));
        self.response_samples += 1;
    }

    pub fn apply(
        &mut self,
        result: &ProbeResult,
        status: HealthStatus,
        failure_threshold: u32,
        now: DateTime<Utc>,
    ) -> Transition {
        let previous = self.status;
        let consecutive = self.next_consecutive(result);

        self.total_checks += 1;
        if !result.success {
            self.total_failures += 1;
        }
        if result.success {
            if let Some(ms) = result.latency_ms {
                self.record_latency(ms);
            }
        }
        if result.handshake_detected {
            self.handshake_complete = true;
        }

        let persistent_failure = result.counts_as_failure
            && !result.success
            && consecutive == failure_threshold.max(1)
            && self.consecutive_failures < consecutive;
        self.consecutive_failures = consecutive;

        self.status = status;
        self.message = result.message.clone();
        self.last_checked = Some(now);
        if previous != status {
            self.last_status_change = Some(now);
        }

        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(CheckOutcome {
            timestamp: now,
            kind: result.kind,
            success: result.success,
            status,
            latency_ms: result.latency_ms,
            error: result.error.clone(),
        });

        Transition {
            previous,
            current: status,
            persistent_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> ProbeResult {
        ProbeResult::failed(CheckKind::Http, "HTTP 500")
    }

    #[test]
    fn test_history_is_bounded() {
        let mut record = HealthRecord::new("api", TargetKind::LocalHttp, 5);
        for _ in 0..20 {
            record.apply(
                &ProbeResult::ok(CheckKind::Http, Some(10), "ok"),
                HealthStatus::Ready,
                3,
                Utc::now(),
            );
        }
        assert_eq!(record.history.len(), 5);
        assert_eq!(record.total_checks, 20);
    }

    #[test]
    fn test_persistent_failure_fires_once_at_threshold() {
        let mut record = HealthRecord::new("api", TargetKind::LocalHttp, 100);
        let fired: Vec<bool> = (0..6)
            .map(|_| record.apply(&failed(), HealthStatus::Down, 3, Utc::now()).persistent_failure)
            .collect();
        assert_eq!(fired, vec![false, false, true, false, false, false]);
        assert_eq!(record.consecutive_failures, 6);
        assert_eq!(record.total_failures, 6);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut record = HealthRecord::new("api", TargetKind::LocalHttp, 100);
        record.apply(&failed(), HealthStatus::Degraded, 3, Utc::now());
        record.apply(&failed(), HealthStatus::Degraded, 3, Utc::now());
        record.apply(&ProbeResult::ok(CheckKind::Http, Some(5), "ok"), HealthStatus::Ready, 3, Utc::now());
        assert_eq!(record.consecutive_failures, 0);
        let t = record.apply(&failed(), HealthStatus::Degraded, 3, Utc::now());
        assert!(!t.persistent_failure);
        assert_eq!(record.consecutive_failures, 1);
    }

    #[test]
    fn test_not_running_does_not_count() {
        let mut record = HealthRecord::new("api", TargetKind::LocalHttp, 100);
        record.apply(&failed(), HealthStatus::Degraded, 3, Utc::now());
        let t = record.apply(&ProbeResult::not_running(CheckKind::Process), HealthStatus::Down, 3, Utc::now());
        assert!(!t.persistent_failure);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.status, HealthStatus::Down);
    }

    #[test]
    fn test_latency_statistics() {
        let mut record = HealthRecord::new("api", TargetKind::LocalHttp, 100);
        for ms in [100, 300, 200] {
            record.apply(&ProbeResult::ok(CheckKind::Http, Some(ms), "ok"), HealthStatus::Ready, 3, Utc::now());
        }
        assert_eq!(record.min_response_ms, Some(100));
        assert_eq!(record.max_response_ms, Some(300));
        assert_eq!(record.avg_response_ms, Some(200.0));
        assert_eq!(record.projected_average(Some(600)), Some(300));
    }

    #[test]
    fn test_status_change_tracked() {
        let mut record = HealthRecord::new("api", TargetKind::LocalHttp, 100);
        let t = record.apply(&ProbeResult::ok(CheckKind::Http, Some(5), "ok"), HealthStatus::Ready, 3, Utc::now());
        assert!(t.changed());
        assert!(record.last_status_change.is_some());
        let t = record.apply(&ProbeResult::ok(CheckKind::Http, Some(5), "ok"), HealthStatus::Ready, 3, Utc::now());
        assert!(!t.changed());
    }
}
