use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::process::ManagedChild;

pub const MAX_TRACKED_RESTARTS: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    #[default]
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::NotStarted => "not-started",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Time-ordered restart attempts. Counting never mutates; only the owner's window prunes.
#[derive(Debug, Default)]
pub struct RestartWindow {
    timestamps: VecDeque<Instant>,
}

impl RestartWindow {
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    pub(crate) fn record_at(&mut self, at: Instant) {
        self.timestamps.push_back(at);
        while self.timestamps.len() > MAX_TRACKED_RESTARTS {
            self.timestamps.pop_front();
        }
    }

    pub fn restarts_in_last(&self, window: Duration) -> usize {
        let now = Instant::now();
        self.timestamps
            .iter()
            .rev()
            .take_while(|&&at| now.duration_since(at) <= window)
            .count()
    }

    /// Drops attempts older than `window` and returns how many remain.
    pub fn prune(&mut self, window: Duration) -> usize {
        let now = Instant::now();
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        self.timestamps.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

pub(crate) struct ProcessRecord {
    pub state: ProcessState,
    pub child: Option<ManagedChild>,
    pub restarts: RestartWindow,
    pub total_restarts: u32,
    pub started_at: Option<Instant>,
    pub started_wall: Option<DateTime<Utc>>,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    pub memory_bytes: Option<u64>,
    pub cpu_percent: Option<f32>,
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self {
            state: ProcessState::NotStarted,
            child: None,
            restarts: RestartWindow::default(),
            total_restarts: 0,
            started_at: None,
            started_wall: None,
            last_exit_code: None,
            last_error: None,
            memory_bytes: None,
            cpu_percent: None,
        }
    }
}

impl ProcessRecord {
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(ManagedChild::pid)
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running && self.child.is_some()
    }

    pub fn uptime_secs(&self) -> u64 {
        match (self.is_running(), self.started_at) {
            (true, Some(at)) => at.elapsed().as_secs(),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub slug: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub command: String,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub total_restarts: u32,
    pub restarts_in_window: usize,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    pub memory_bytes: Option<u64>,
    pub cpu_percent: Option<f32>,
}
