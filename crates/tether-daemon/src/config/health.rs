use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::constants::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub local_interval_secs: u64,
    pub remote_interval_secs: u64,
    pub local_http_timeout_secs: u64,
    pub http_attempts: u32,
    pub http_retry_delay_ms: u64,
    pub remote_timeout_secs: u64,
    pub latency_threshold_ms: u64,
    pub failure_threshold: u32,
    pub history_capacity: usize,
    pub restart_window_secs: u64,
    pub stdio_tail_bytes: u64,
    pub stdio_fresh_secs: u64,
    pub stdio_stale_secs: u64,
    pub ready_markers: Vec<String>,
    pub notify_queue_size: usize,
    pub recovery_workers: usize,
    pub auto_restart: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            local_interval_secs: DEFAULT_LOCAL_SWEEP_SECS,
            remote_interval_secs: DEFAULT_REMOTE_SWEEP_SECS,
            local_http_timeout_secs: DEFAULT_LOCAL_HTTP_TIMEOUT_SECS,
            http_attempts: DEFAULT_HTTP_ATTEMPTS,
            http_retry_delay_ms: DEFAULT_HTTP_RETRY_DELAY_MS,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            latency_threshold_ms: DEFAULT_LATENCY_THRESHOLD_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            restart_window_secs: DEFAULT_RESTART_WINDOW_SECS,
            stdio_tail_bytes: DEFAULT_STDIO_TAIL_BYTES,
            stdio_fresh_secs: DEFAULT_STDIO_FRESH_SECS,
            stdio_stale_secs: DEFAULT_STDIO_STALE_SECS,
            ready_markers: vec![
                "server initialized".into(),
                "initialized".into(),
                "server ready".into(),
                "is ready".into(),
                "listening on".into(),
                "running on stdio".into(),
                "started successfully".into(),
            ],
            notify_queue_size: 256,
            recovery_workers: 4,
            auto_restart: true,
        }
    }
}

impl HealthConfig {
    pub fn local_interval(&self) -> Duration {
        Duration::from_secs(self.local_interval_secs)
    }

    pub fn remote_interval(&self) -> Duration {
        Duration::from_secs(self.remote_interval_secs)
    }

    pub fn local_http_timeout(&self) -> Duration {
        Duration::from_secs(self.local_http_timeout_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn http_retry_delay(&self) -> Duration {
        Duration::from_millis(self.http_retry_delay_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}
