use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::constants::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub poll_interval_ms: u64,
    pub subscriber_queue: usize,
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub rotation_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_LOG_POLL_MS,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            rotation_interval_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

impl LogsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
