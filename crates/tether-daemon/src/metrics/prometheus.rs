use std::fmt::Write;
use std::sync::Arc;

use super::collector::DaemonMetrics;
use crate::health::{HealthEngine, HealthEngineStats, HealthRecord};
use crate::logs::{LogManager, LogStats};
use crate::supervisor::{ProcessInfo, ProcessState, ProcessSupervisor, SupervisorStats};

/// Point-in-time view of every component, gathered before rendering.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub records: Vec<HealthRecord>,
    pub processes: Vec<ProcessInfo>,
    pub supervisor: SupervisorStats,
    pub health: HealthEngineStats,
    pub logs: LogStats,
}

pub struct PrometheusExporter {
    metrics: Arc<DaemonMetrics>,
    health: Arc<HealthEngine>,
    supervisor: Arc<ProcessSupervisor>,
    logs: Arc<LogManager>,
}

impl PrometheusExporter {
    pub fn new(
        metrics: Arc<DaemonMetrics>,
        health: Arc<HealthEngine>,
        supervisor: Arc<ProcessSupervisor>,
        logs: Arc<LogManager>,
    ) -> Self {
        Self {
            metrics,
            health,
            supervisor,
            logs,
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records: self.health.all_records(),
            processes: self.supervisor.all_process_info(),
            supervisor: self.supervisor.stats(),
            health: self.health.stats(),
            logs: self.logs.stats().await,
        }
    }

    pub async fn export(&self) -> String {
        let snapshot = self.snapshot().await;
        render(&self.metrics, &snapshot)
    }
}

pub fn render(metrics: &DaemonMetrics, snapshot: &MetricsSnapshot) -> String {
    metrics.update_system_metrics();

    let mut output = String::with_capacity(8192);
    write_info_metrics(&mut output, metrics);
    write_api_metrics(&mut output, metrics);
    write_health_metrics(&mut output, &snapshot.records);
    write_remote_metrics(&mut output, &snapshot.records);
    write_process_metrics(&mut output, &snapshot.processes, &snapshot.supervisor);
    write_engine_metrics(&mut output, &snapshot.health);
    write_log_metrics(&mut output, &snapshot.logs);
    output
}

fn header(output: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} {}", name, kind);
}

fn write_info_metrics(output: &mut String, metrics: &DaemonMetrics) {
    header(output, "tether_info", "Daemon information", "gauge");
    let _ = writeln!(output, "tether_info{{version=\"{}\"}} 1\n", env!("CARGO_PKG_VERSION"));

    header(output, "tether_uptime_seconds", "Daemon uptime in seconds", "gauge");
    let _ = writeln!(output, "tether_uptime_seconds {}\n", metrics.uptime_secs());

    header(output, "tether_cpu_usage_percent", "Daemon CPU usage percentage", "gauge");
    let _ = writeln!(output, "tether_cpu_usage_percent {:.2}\n", metrics.cpu_usage());

    header(output, "tether_memory_bytes", "Daemon resident memory in bytes", "gauge");
    let _ = writeln!(output, "tether_memory_bytes {}\n", metrics.memory_usage());
}

fn write_api_metrics(output: &mut String, metrics: &DaemonMetrics) {
    header(output, "tether_api_requests_total", "Total API requests", "counter");
    let _ = writeln!(output, "tether_api_requests_total {}\n", metrics.total_requests());

    header(output, "tether_api_requests_errors_total", "API requests answered with an error", "counter");
    let _ = writeln!(output, "tether_api_requests_errors_total {}\n", metrics.failed_requests());

    header(output, "tether_log_streams_total", "Log streams opened", "counter");
    let _ = writeln!(output, "tether_log_streams_total {}\n", metrics.streams_opened());

    header(output, "tether_api_request_duration_seconds", "API request latency histogram", "histogram");
    let mut cumulative: u64 = 0;
    for (bucket_ms, count) in metrics.latency_histogram() {
        cumulative += count;
        let _ = writeln!(
            output,
            "tether_api_request_duration_seconds_bucket{{le=\"{:.3}\"}} {}",
            bucket_ms as f64 / 1000.0,
            cumulative
        );
    }
    let _ = writeln!(
        output,
        "tether_api_request_duration_seconds_bucket{{le=\"+Inf\"}} {}",
        metrics.total_requests()
    );
    let _ = writeln!(
        output,
        "tether_api_request_duration_seconds_sum {:.6}",
        metrics.total_latency_us() as f64 / 1_000_000.0
    );
    let _ = writeln!(output, "tether_api_request_duration_seconds_count {}\n", metrics.total_requests());
}

fn write_health_metrics(output: &mut String, records: &[HealthRecord]) {
    if records.is_empty() {
        return;
    }

    header(output, "tether_target_status", "Target health (1=ready, 0=degraded, -1=down)", "gauge");
    for r in records {
        let _ = writeln!(
            output,
            "tether_target_status{{target=\"{}\",kind=\"{}\"}} {}",
            r.slug,
            r.kind,
            r.status.gauge()
        );
    }
    output.push('\n');

    header(output, "tether_target_checks_total", "Health checks per target", "counter");
    for r in records {
        let _ = writeln!(output, "tether_target_checks_total{{target=\"{}\"}} {}", r.slug, r.total_checks);
    }
    output.push('\n');

    header(output, "tether_target_failures_total", "Failed health checks per target", "counter");
    for r in records {
        let _ = writeln!(output, "tether_target_failures_total{{target=\"{}\"}} {}", r.slug, r.total_failures);
    }
    output.push('\n');

    header(output, "tether_target_consecutive_failures", "Current failure streak per target", "gauge");
    for r in records {
        let _ = writeln!(
            output,
            "tether_target_consecutive_failures{{target=\"{}\"}} {}",
            r.slug, r.consecutive_failures
        );
    }
    output.push('\n');

    header(output, "tether_target_response_ms", "Average probe response time", "gauge");
    for r in records {
        if let Some(avg) = r.avg_response_ms {
            let _ = writeln!(output, "tether_target_response_ms{{target=\"{}\"}} {:.1}", r.slug, avg);
        }
    }
    output.push('\n');
}

fn write_remote_metrics(output: &mut String, records: &[HealthRecord]) {
    let remote: Vec<_> = records
        .iter()
        .filter_map(|r| r.remote.as_ref().map(|health| (r.slug.as_str(), health)))
        .collect();
    if remote.is_empty() {
        return;
    }

    header(output, "tether_remote_rate_limited", "Remote target is rate limited", "gauge");
    for (slug, health) in &remote {
        let _ = writeln!(
            output,
            "tether_remote_rate_limited{{target=\"{}\",provider=\"{}\"}} {}",
            slug,
            health.provider,
            u8::from(health.rate_limited)
        );
    }
    output.push('\n');

    header(output, "tether_remote_credential_expiring", "Remote credentials expire soon", "gauge");
    for (slug, health) in &remote {
        let _ = writeln!(
            output,
            "tether_remote_credential_expiring{{target=\"{}\",provider=\"{}\"}} {}",
            slug,
            health.provider,
            u8::from(health.credential_warning)
        );
    }
    output.push('\n');
}

fn write_process_metrics(output: &mut String, processes: &[ProcessInfo], stats: &SupervisorStats) {
    header(output, "tether_processes_running", "Supervised processes currently running", "gauge");
    let _ = writeln!(output, "tether_processes_running {}\n", stats.running);

    header(output, "tether_process_starts_total", "Processes started by the supervisor", "counter");
    let _ = writeln!(output, "tether_process_starts_total {}\n", stats.total_started);

    header(output, "tether_restarts_refused_total", "Restarts refused by the rate limit", "counter");
    let _ = writeln!(output, "tether_restarts_refused_total {}\n", stats.rate_limited_restarts);

    if processes.is_empty() {
        return;
    }

    header(output, "tether_process_running", "Process running (1=running, 0=stopped)", "gauge");
    for p in processes {
        let _ = writeln!(
            output,
            "tether_process_running{{target=\"{}\"}} {}",
            p.slug,
            u8::from(p.state == ProcessState::Running)
        );
    }
    output.push('\n');

    header(output, "tether_process_restarts_total", "Restarts per target", "counter");
    for p in processes {
        let _ = writeln!(output, "tether_process_restarts_total{{target=\"{}\"}} {}", p.slug, p.total_restarts);
    }
    output.push('\n');

    header(output, "tether_process_restarts_window", "Restarts inside the sliding window", "gauge");
    for p in processes {
        let _ = writeln!(
            output,
            "tether_process_restarts_window{{target=\"{}\"}} {}",
            p.slug, p.restarts_in_window
        );
    }
    output.push('\n');

    header(output, "tether_process_memory_bytes", "Resident memory per process", "gauge");
    for p in processes {
        if let Some(bytes) = p.memory_bytes {
            let _ = writeln!(output, "tether_process_memory_bytes{{target=\"{}\"}} {}", p.slug, bytes);
        }
    }
    output.push('\n');
}

fn write_engine_metrics(output: &mut String, stats: &HealthEngineStats) {
    header(output, "tether_health_checks_total", "Health checks performed", "counter");
    let _ = writeln!(output, "tether_health_checks_total {}\n", stats.checks);

    header(output, "tether_health_status_changes_total", "Health status transitions", "counter");
    let _ = writeln!(output, "tether_health_status_changes_total {}\n", stats.status_changes);

    header(output, "tether_health_persistent_failures_total", "Persistent failure signals", "counter");
    let _ = writeln!(output, "tether_health_persistent_failures_total {}\n", stats.persistent_failures);

    header(output, "tether_notifications_dropped_total", "Health notifications dropped on a full queue", "counter");
    let _ = writeln!(output, "tether_notifications_dropped_total {}\n", stats.notifications_dropped);

    header(output, "tether_recoveries_total", "Recovery actions by outcome", "counter");
    let _ = writeln!(
        output,
        "tether_recoveries_total{{outcome=\"started\"}} {}",
        stats.recoveries_started
    );
    let _ = writeln!(
        output,
        "tether_recoveries_total{{outcome=\"failed\"}} {}\n",
        stats.recoveries_failed
    );
}

fn write_log_metrics(output: &mut String, stats: &LogStats) {
    header(output, "tether_log_subscribers", "Active log subscribers", "gauge");
    let _ = writeln!(output, "tether_log_subscribers {}\n", stats.subscribers);

    header(output, "tether_log_lines_dropped_total", "Log lines dropped for slow subscribers", "counter");
    let _ = writeln!(output, "tether_log_lines_dropped_total {}\n", stats.dropped_lines);

    header(output, "tether_log_rotations_total", "Log files trimmed by rotation", "counter");
    let _ = writeln!(output, "tether_log_rotations_total {}\n", stats.rotations);

    header(output, "tether_log_bytes_trimmed_total", "Bytes removed by rotation", "counter");
    let _ = writeln!(output, "tether_log_bytes_trimmed_total {}\n", stats.bytes_trimmed);
}
