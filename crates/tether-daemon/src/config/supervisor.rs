use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::constants::DEFAULT_RESTART_WINDOW_SECS;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub stop_grace_secs: u64,
    pub restart_window_secs: u64,
    pub max_restarts_in_window: u32,
    pub restart_backoff_base_ms: u64,
    pub restart_backoff_max_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub check_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: 10,
            restart_window_secs: DEFAULT_RESTART_WINDOW_SECS,
            max_restarts_in_window: 5,
            restart_backoff_base_ms: 1000,
            restart_backoff_max_ms: 60_000,
            shutdown_timeout_secs: 30,
            check_interval_secs: 5,
        }
    }
}

impl SupervisorConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
