use async_trait::async_trait;
use std::time::Duration;
use tether_types::TetherResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessStatus {
    pub running: bool,
    /// Time since the current process was started, as seen by the view.
    pub uptime: Option<Duration>,
}

impl ProcessStatus {
    pub fn stopped() -> Self {
        Self {
            running: false,
            uptime: None,
        }
    }
}

/// Read-only view of local process state used by probes.
pub trait ProcessView: Send + Sync {
    fn process_status(&self, slug: &str) -> ProcessStatus;

    fn restarts_in_last(&self, slug: &str, window: Duration) -> usize;
}

/// Receives persistent-failure notifications for local targets.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn on_persistent_failure(&self, slug: &str, consecutive_failures: u32) -> TetherResult<()>;
}
