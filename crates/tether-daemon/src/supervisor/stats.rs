use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStats {
    pub total_targets: usize,
    pub running: usize,
    pub stopped: usize,
    pub total_started: u64,
    pub total_restarts: u64,
    pub rate_limited_restarts: u64,
    pub uptime_secs: u64,
}
