use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use reqwest::redirect::Policy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tether_types::{CheckKind, ExternalStatus, HealthStatus, Target, TargetKind, TetherError, TetherResult};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::hooks::{ProcessView, RecoveryHandler};
use super::notify::{HealthEvent, Notifier, NotifierDeps};
use super::policy::{classify, ProbeInput, Thresholds};
use super::probes::{
    contains_marker, derive_http_url, evaluate_recency, evaluate_startup, external_state,
    probe_http, remote_result, HttpProbeSettings, StdioWindows,
};
use super::record::{HealthRecord, ProbeResult, RemoteHealth};
use crate::config::HealthConfig;
use crate::logs::LogManager;
use crate::probe::{ExternalProbe, ProbeRequest};
use crate::registry::{CredentialStore, RegistrySync, TargetRegistry};

const RATE_LIMIT_BASE_SECS: i64 = 60;
const RATE_LIMIT_MAX_SECS: i64 = 15 * 60;

/// Reset estimate when the provider sent no header: 60s doubling per consecutive 429, capped.
pub fn estimated_rate_limit_backoff(consecutive: u32) -> ChronoDuration {
    let exponent = consecutive.saturating_sub(1).min(10);
    let secs = (RATE_LIMIT_BASE_SECS << exponent).min(RATE_LIMIT_MAX_SECS);
    ChronoDuration::seconds(secs)
}

pub struct HealthDeps {
    pub registry: Arc<dyn TargetRegistry>,
    pub credentials: Arc<dyn CredentialStore>,
    pub processes: Arc<dyn ProcessView>,
    pub logs: Arc<LogManager>,
    pub recovery: Option<Arc<dyn RecoveryHandler>>,
    pub sync: Arc<dyn RegistrySync>,
}

struct Monitored {
    target: Target,
    check_lock: tokio::sync::Mutex<()>,
    record: Mutex<HealthRecord>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total: usize,
    pub ready: usize,
    pub degraded: usize,
    pub down: usize,
    pub targets: Vec<HealthRecord>,
}

impl HealthSummary {
    fn from_records(targets: Vec<HealthRecord>) -> Self {
        let count = |status: HealthStatus| targets.iter().filter(|r| r.status == status).count();
        Self {
            total: targets.len(),
            ready: count(HealthStatus::Ready),
            degraded: count(HealthStatus::Degraded),
            down: count(HealthStatus::Down),
            targets,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEngineStats {
    pub monitored: usize,
    pub local_sweeps: u64,
    pub remote_sweeps: u64,
    pub checks: u64,
    pub status_changes: u64,
    pub persistent_failures: u64,
    pub notifications_sent: u64,
    pub notifications_dropped: u64,
    pub recoveries_started: u64,
    pub recoveries_failed: u64,
}

pub struct HealthEngine {
    config: HealthConfig,
    thresholds: Thresholds,
    registry: Arc<dyn TargetRegistry>,
    credentials: Arc<dyn CredentialStore>,
    processes: Arc<dyn ProcessView>,
    logs: Arc<LogManager>,
    local_client: reqwest::Client,
    external: ExternalProbe,
    monitored: RwLock<HashMap<String, Arc<Monitored>>>,
    notifier: Notifier,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    local_sweeps: AtomicU64,
    remote_sweeps: AtomicU64,
    checks: AtomicU64,
    status_changes: AtomicU64,
    persistent_failures: AtomicU64,
}

impl HealthEngine {
    /// Must be called inside a tokio runtime; the notification dispatcher starts immediately.
    pub fn new(config: HealthConfig, deps: HealthDeps) -> TetherResult<Self> {
        let local_client = reqwest::Client::builder()
            .timeout(config.local_http_timeout())
            .redirect(Policy::none())
            .build()
            .map_err(|e| TetherError::Network(format!("Failed to build local probe client: {}", e)))?;
        let external = ExternalProbe::new(config.remote_timeout())?;

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let notifier = Notifier::spawn(
            NotifierDeps {
                recovery: deps.recovery,
                sync: deps.sync,
                auto_restart: config.auto_restart,
                queue_size: config.notify_queue_size,
                workers: config.recovery_workers,
            },
            &tracker,
            shutdown.child_token(),
        );

        Ok(Self {
            thresholds: Thresholds::from(&config),
            config,
            registry: deps.registry,
            credentials: deps.credentials,
            processes: deps.processes,
            logs: deps.logs,
            local_client,
            external,
            monitored: RwLock::new(HashMap::new()),
            notifier,
            shutdown,
            tracker,
            local_sweeps: AtomicU64::new(0),
            remote_sweeps: AtomicU64::new(0),
            checks: AtomicU64::new(0),
            status_changes: AtomicU64::new(0),
            persistent_failures: AtomicU64::new(0),
        })
    }

    pub fn add_target(&self, target: Target) -> bool {
        let slug = target.slug.clone();
        let mut record = HealthRecord::new(&slug, target.kind, self.config.history_capacity);
        let connecting = target.remote.as_ref().map(|remote| {
            let health = RemoteHealth::new(&remote.provider);
            let status = health.external.clone();
            record.remote = Some(health);
            status
        });

        {
            let mut monitored = self.monitored.write();
            if monitored.contains_key(&slug) {
                return false;
            }
            monitored.insert(
                slug.clone(),
                Arc::new(Monitored {
                    target,
                    check_lock: tokio::sync::Mutex::new(()),
                    record: Mutex::new(record),
                }),
            );
        }

        if let Some(status) = connecting {
            self.notifier.notify(HealthEvent::ExternalStatus { slug: slug.clone(), status });
        }
        debug!(target_slug = %slug, "Added to health monitoring");
        true
    }

    pub fn remove_target(&self, slug: &str) -> bool {
        self.monitored.write().remove(slug).is_some()
    }

    /// Monitors every registered target not yet monitored. Returns how many were added.
    pub fn sync_with_registry(&self) -> usize {
        self.registry
            .targets()
            .into_iter()
            .filter(|t| self.add_target(t.clone()))
            .count()
    }

    fn entry(&self, slug: &str) -> Option<Arc<Monitored>> {
        self.monitored.read().get(slug).cloned()
    }

    fn entries(&self, remote: bool) -> Vec<Arc<Monitored>> {
        self.monitored
            .read()
            .values()
            .filter(|m| m.target.kind.is_remote() == remote)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self, slug: &str) -> Option<HealthRecord> {
        self.entry(slug).map(|m| m.record.lock().clone())
    }

    pub fn local_snapshot(&self, slug: &str) -> Option<HealthRecord> {
        self.snapshot(slug).filter(|r| r.kind.is_local())
    }

    pub fn external_snapshot(&self, slug: &str) -> Option<HealthRecord> {
        self.snapshot(slug).filter(|r| r.kind.is_remote())
    }

    fn summary(&self, remote: bool) -> HealthSummary {
        let mut records: Vec<HealthRecord> = self
            .entries(remote)
            .iter()
            .map(|m| m.record.lock().clone())
            .collect();
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        HealthSummary::from_records(records)
    }

    pub fn local_summary(&self) -> HealthSummary {
        self.summary(false)
    }

    pub fn external_summary(&self) -> HealthSummary {
        self.summary(true)
    }

    pub fn all_records(&self) -> Vec<HealthRecord> {
        let mut records: Vec<HealthRecord> = self
            .monitored
            .read()
            .values()
            .map(|m| m.record.lock().clone())
            .collect();
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        records
    }

    /// Probes one target immediately and returns the updated record.
    pub async fn check_now(&self, slug: &str) -> TetherResult<HealthRecord> {
        let entry = self
            .entry(slug)
            .ok_or_else(|| TetherError::UnknownTarget(slug.to_string()))?;
        Ok(self.check(&entry).await)
    }

    async fn check(&self, entry: &Monitored) -> HealthRecord {
        let _serial = entry.check_lock.lock().await;
        let result = match entry.target.kind {
            TargetKind::LocalHttp => self.probe_local_http(&entry.target).await,
            TargetKind::LocalStdio => self.probe_stdio(entry).await,
            TargetKind::RemoteProvider => self.probe_remote(&entry.target).await,
        };
        self.evaluate(entry, result)
    }

    async fn probe_local_http(&self, target: &Target) -> ProbeResult {
        if !self.processes.process_status(&target.slug).running {
            return ProbeResult::not_running(CheckKind::Process);
        }
        let url = target
            .launch
            .as_ref()
            .and_then(|launch| derive_http_url(&launch.args, &launch.env));
        let Some(url) = url else {
            return ProbeResult::unrecoverable(CheckKind::Http, "no reachable endpoint configured");
        };

        let settings = HttpProbeSettings {
            attempts: self.config.http_attempts,
            retry_delay: self.config.http_retry_delay(),
        };
        probe_http(&self.local_client, &url, settings, &self.shutdown).await
    }

    async fn probe_stdio(&self, entry: &Monitored) -> ProbeResult {
        let slug = &entry.target.slug;
        let process = self.processes.process_status(slug);
        if !process.running {
            return ProbeResult::not_running(CheckKind::Process);
        }

        let windows = StdioWindows {
            fresh: Duration::from_secs(self.config.stdio_fresh_secs),
            stale: Duration::from_secs(self.config.stdio_stale_secs),
        };

        let handshake_done = entry.record.lock().handshake_complete;
        let mut detected = false;
        if !handshake_done {
            let tail = match self.logs.read_tail(slug, self.config.stdio_tail_bytes).await {
                Ok(tail) => tail.unwrap_or_default(),
                Err(e) => {
                    debug!(target_slug = %slug, "Cannot read log for readiness: {}", e);
                    String::new()
                }
            };
            if !contains_marker(&tail, &self.config.ready_markers) {
                let age = process.uptime.unwrap_or_default();
                return evaluate_startup(age, windows);
            }
            info!(target_slug = %slug, "Readiness marker found, handshake complete");
            detected = true;
        }

        let modified = match self.logs.last_modified(slug).await {
            Ok(modified) => modified,
            Err(e) => {
                return ProbeResult::unrecoverable(CheckKind::Stdio, e.to_string());
            }
        };
        let mut result = evaluate_recency(modified, SystemTime::now(), windows);
        result.handshake_detected = detected;
        result
    }

    async fn probe_remote(&self, target: &Target) -> ProbeResult {
        let Some(remote) = target.remote.as_ref() else {
            return ProbeResult::unrecoverable(CheckKind::External, "no remote endpoint configured");
        };
        let credentials = remote
            .credential_ref
            .as_deref()
            .and_then(|reference| self.credentials.lookup(reference));

        let request = ProbeRequest {
            provider: &remote.provider,
            endpoint: &remote.endpoint,
            auth: remote.auth,
            credentials: credentials.as_ref(),
        };
        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => {
                return ProbeResult::failed(CheckKind::External, TetherError::Cancelled.to_string());
            }
            outcome = self.external.probe(&request) => outcome,
        };
        remote_result(&outcome)
    }

    fn evaluate(&self, entry: &Monitored, result: ProbeResult) -> HealthRecord {
        let slug = entry.target.slug.as_str();
        let kind = entry.target.kind;
        let now = Utc::now();
        let recent_restarts = if kind.is_local() {
            self.processes
                .restarts_in_last(slug, self.config.restart_window())
        } else {
            0
        };

        let mut events = Vec::new();
        let snapshot = {
            let mut record = entry.record.lock();

            let mut rate_limited = false;
            let mut credential_warning = false;
            if let (Some(health), Some(observed)) = (record.remote.as_mut(), result.remote.as_ref()) {
                health.last_status_code = observed.status_code;
                if observed.rate_limited {
                    health.consecutive_rate_limited += 1;
                    let reset = observed.retry_at.unwrap_or_else(|| {
                        now + estimated_rate_limit_backoff(health.consecutive_rate_limited)
                    });
                    health.rate_limited = true;
                    health.rate_limit_reset = Some(reset);
                } else {
                    health.consecutive_rate_limited = 0;
                    health.rate_limited = false;
                    health.rate_limit_reset = None;
                }
                health.credential_warning = observed.credential_expiring;
                health.credential_expires_at = observed.credential_expires_at;
                rate_limited = health.rate_limited;
                credential_warning = health.credential_warning;
            }

            let input = ProbeInput {
                process_running: result.process_running,
                missed_probes: record.next_consecutive(&result),
                unrecoverable: result.unrecoverable,
                latency_ms: result.latency_ms,
                avg_latency_ms: if result.success {
                    record.projected_average(result.latency_ms)
                } else {
                    None
                },
                recent_restarts,
                impaired: result.impaired,
                rate_limited,
                credential_warning,
            };
            let status = classify(&input, &self.thresholds);
            let transition = record.apply(&result, status, self.thresholds.failure_threshold, now);

            if transition.changed() {
                events.push(HealthEvent::StatusChanged {
                    slug: slug.to_string(),
                    kind,
                    previous: transition.previous,
                    current: transition.current,
                    message: record.message.clone(),
                });
            }
            if transition.persistent_failure {
                events.push(HealthEvent::PersistentFailure {
                    slug: slug.to_string(),
                    kind,
                    consecutive_failures: record.consecutive_failures,
                });
            }

            if let Some(observed) = result.remote.as_ref() {
                let outcome_status = ExternalStatus {
                    state: external_state(observed.class),
                    message: result.message.clone(),
                    last_checked: now,
                    response_time_ms: result.latency_ms,
                };
                if let Some(health) = record.remote.as_mut() {
                    let external_changed = health.external.state != outcome_status.state
                        || health.external.message != outcome_status.message;
                    health.external = outcome_status.clone();
                    if external_changed || transition.changed() {
                        events.push(HealthEvent::ExternalStatus {
                            slug: slug.to_string(),
                            status: outcome_status,
                        });
                    }
                }
            }

            if transition.changed() {
                self.status_changes.fetch_add(1, Ordering::Relaxed);
            }
            if transition.persistent_failure {
                self.persistent_failures.fetch_add(1, Ordering::Relaxed);
            }
            record.clone()
        };

        self.checks.fetch_add(1, Ordering::Relaxed);
        trace!(target_slug = slug, status = %snapshot.status, "Check complete: {}", snapshot.message);
        for event in events {
            self.notifier.notify(event);
        }
        snapshot
    }

    fn rate_limit_pending(entry: &Monitored) -> bool {
        let record = entry.record.lock();
        record
            .remote
            .as_ref()
            .and_then(|r| r.rate_limit_reset.filter(|_| r.rate_limited))
            .is_some_and(|reset| reset > Utc::now())
    }

    /// Probes all local targets concurrently and waits for every probe.
    pub async fn run_local_sweep(&self) -> usize {
        let entries = self.entries(false);
        join_all(entries.iter().map(|entry| self.check(entry))).await;
        self.local_sweeps.fetch_add(1, Ordering::Relaxed);
        entries.len()
    }

    /// Probes all remote targets concurrently, skipping those waiting out a rate limit.
    pub async fn run_remote_sweep(&self) -> usize {
        let entries: Vec<Arc<Monitored>> = self
            .entries(true)
            .into_iter()
            .filter(|entry| {
                let pending = Self::rate_limit_pending(entry);
                if pending {
                    debug!(target_slug = %entry.target.slug, "Skipping probe until rate limit resets");
                }
                !pending
            })
            .collect();
        join_all(entries.iter().map(|entry| self.check(entry))).await;
        self.remote_sweeps.fetch_add(1, Ordering::Relaxed);
        entries.len()
    }

    pub fn start(self: &Arc<Self>) {
        let added = self.sync_with_registry();
        info!(
            "Health monitoring {} target(s): local every {:?}, remote every {:?}",
            added,
            self.config.local_interval(),
            self.config.remote_interval()
        );

        let engine = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.local_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        engine.run_local_sweep().await;
                    }
                }
            }
            debug!("Local health sweep stopped");
        });

        let engine = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.remote_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        engine.run_remote_sweep().await;
                    }
                }
            }
            debug!("Remote health sweep stopped");
        });
    }

    pub fn stats(&self) -> HealthEngineStats {
        let counters = self.notifier.counters();
        HealthEngineStats {
            monitored: self.monitored.read().len(),
            local_sweeps: self.local_sweeps.load(Ordering::Relaxed),
            remote_sweeps: self.remote_sweeps.load(Ordering::Relaxed),
            checks: self.checks.load(Ordering::Relaxed),
            status_changes: self.status_changes.load(Ordering::Relaxed),
            persistent_failures: self.persistent_failures.load(Ordering::Relaxed),
            notifications_sent: counters.sent.load(Ordering::Relaxed),
            notifications_dropped: counters.dropped.load(Ordering::Relaxed),
            recoveries_started: counters.recoveries_started.load(Ordering::Relaxed),
            recoveries_failed: counters.recoveries_failed.load(Ordering::Relaxed),
        }
    }

    /// Cancels sweeps, in-flight probes and the dispatcher, then joins them.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!("Health tasks did not stop within {:?}", timeout);
        }
        debug!("Health engine stopped");
    }
}
