use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;
use tether_types::{LaunchSpec, RestartPolicy, Target, TetherError, TetherResult};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::backoff::RestartBackoff;
use super::process::ManagedChild;
use super::stats::SupervisorStats;
use super::types::*;
use crate::config::SupervisorConfig;
use crate::health::{ProcessStatus, ProcessView, RecoveryHandler};
use crate::logs::LogWriteLocks;
use crate::registry::TargetRegistry;

struct ProcessSlot {
    lifecycle: tokio::sync::Mutex<()>,
    record: Mutex<ProcessRecord>,
}

impl ProcessSlot {
    fn new() -> Self {
        Self {
            lifecycle: tokio::sync::Mutex::new(()),
            record: Mutex::new(ProcessRecord::default()),
        }
    }
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    log_dir: PathBuf,
    write_locks: Arc<LogWriteLocks>,
    registry: Arc<dyn TargetRegistry>,
    slots: RwLock<HashMap<String, Arc<ProcessSlot>>>,
    backoff: RestartBackoff,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    system: Mutex<System>,
    total_started: AtomicU64,
    total_restarts: AtomicU64,
    rate_limited_restarts: AtomicU64,
    started_at: Instant,
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        log_dir: impl Into<PathBuf>,
        registry: Arc<dyn TargetRegistry>,
    ) -> Self {
        let backoff = RestartBackoff::exponential(
            Duration::from_millis(config.restart_backoff_base_ms),
            Duration::from_millis(config.restart_backoff_max_ms),
        );

        Self {
            config,
            log_dir: log_dir.into(),
            write_locks: Arc::new(LogWriteLocks::new()),
            registry,
            slots: RwLock::new(HashMap::new()),
            backoff,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            system: Mutex::new(System::new()),
            total_started: AtomicU64::new(0),
            total_restarts: AtomicU64::new(0),
            rate_limited_restarts: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Shares the log manager's write locks so rotation is serialized with output appends.
    pub fn with_write_locks(mut self, write_locks: Arc<LogWriteLocks>) -> Self {
        self.write_locks = write_locks;
        self
    }

    pub fn log_path(&self, slug: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", slug))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn slot(&self, slug: &str) -> Arc<ProcessSlot> {
        if let Some(slot) = self.slots.read().get(slug) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.slots
                .write()
                .entry(slug.to_string())
                .or_insert_with(|| Arc::new(ProcessSlot::new())),
        )
    }

    fn launch_spec(&self, slug: &str) -> TetherResult<LaunchSpec> {
        let target = self
            .registry
            .get(slug)
            .ok_or_else(|| TetherError::UnknownTarget(slug.to_string()))?;
        if !target.is_local() {
            return Err(TetherError::Config(format!(
                "Target '{}' is remote and has no local process",
                slug
            )));
        }
        target
            .launch
            .ok_or_else(|| TetherError::Config(format!("Target '{}' has no launch spec", slug)))
    }

    pub async fn start(&self, slug: &str) -> TetherResult<u32> {
        if self.is_shutting_down() {
            return Err(TetherError::Cancelled);
        }
        let launch = self.launch_spec(slug)?;
        let slot = self.slot(slug);
        let _guard = slot.lifecycle.lock().await;
        self.start_locked(slug, &launch, &slot)
    }

    fn start_locked(&self, slug: &str, launch: &LaunchSpec, slot: &ProcessSlot) -> TetherResult<u32> {
        if self.is_shutting_down() {
            return Err(TetherError::Cancelled);
        }
        {
            let mut record = slot.record.lock();
            if let Some(child) = record.child.as_mut() {
                match child.try_wait()? {
                    None => return Err(TetherError::AlreadyRunning(slug.to_string())),
                    Some(status) => {
                        record.last_exit_code = status.code();
                        record.child = None;
                    }
                }
            }
        }

        std::fs::create_dir_all(&self.log_dir).map_err(|e| {
            TetherError::LogAccess(format!("Cannot create log dir {:?}: {}", self.log_dir, e))
        })?;

        let spawned = ManagedChild::spawn(slug, launch, &self.log_path(slug), &self.write_locks, &self.tracker);

        let mut record = slot.record.lock();
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                record.state = ProcessState::Stopped;
                record.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let pid = child.pid();
        record.child = Some(child);
        record.state = ProcessState::Running;
        record.started_at = Some(Instant::now());
        record.started_wall = Some(Utc::now());
        record.last_error = None;
        record.memory_bytes = None;
        record.cpu_percent = None;
        drop(record);

        self.total_started.fetch_add(1, Ordering::Relaxed);
        info!(target_slug = slug, pid, "Started {}", launch.display_command());
        Ok(pid)
    }

    pub async fn stop(&self, slug: &str, grace: Option<Duration>) -> TetherResult<Option<i32>> {
        self.launch_spec(slug)?;
        let slot = self.slot(slug);
        let _guard = slot.lifecycle.lock().await;
        self.stop_locked(slug, &slot, grace.unwrap_or_else(|| self.config.stop_grace()))
            .await
    }

    async fn stop_locked(
        &self,
        slug: &str,
        slot: &ProcessSlot,
        grace: Duration,
    ) -> TetherResult<Option<i32>> {
        let child = {
            let mut record = slot.record.lock();
            let child = record
                .child
                .take()
                .ok_or_else(|| TetherError::NotRunning(slug.to_string()))?;
            record.state = ProcessState::Stopping;
            child
        };

        let pid = child.pid();
        let code = child.terminate(grace).await;

        {
            let mut record = slot.record.lock();
            record.state = ProcessState::Stopped;
            record.last_exit_code = code;
            record.started_at = None;
            record.memory_bytes = None;
            record.cpu_percent = None;
        }

        info!(target_slug = slug, pid, exit_code = ?code, "Stopped process");
        Ok(code)
    }

    /// Stop followed by start. The attempt is recorded in the restart window before anything
    /// else happens, so failed restarts still count.
    pub async fn restart(&self, slug: &str) -> TetherResult<u32> {
        let launch = self.launch_spec(slug)?;
        let slot = self.slot(slug);
        let _guard = slot.lifecycle.lock().await;

        let prior = {
            let mut record = slot.record.lock();
            let prior = record.restarts.prune(self.config.restart_window());
            record.restarts.record();
            record.total_restarts += 1;
            prior
        };
        self.total_restarts.fetch_add(1, Ordering::Relaxed);

        let delay = self.backoff.delay_for(prior);
        if !delay.is_zero() {
            debug!(target_slug = slug, "Backing off {:?} before restart ({} recent)", delay, prior);
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(TetherError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match self.stop_locked(slug, &slot, self.config.stop_grace()).await {
            Ok(_) | Err(TetherError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        if self.is_shutting_down() {
            debug!(target_slug = slug, "Shutdown began during restart, not starting again");
            return Err(TetherError::Cancelled);
        }

        let result = self.start_locked(slug, &launch, &slot);
        if let Err(e) = &result {
            warn!(target_slug = slug, "Restart failed: {}", e);
        }
        result
    }

    /// Restart on behalf of the daemon (crash or health failure), refused once the
    /// restart rate for the window is used up.
    pub async fn auto_restart(&self, slug: &str, reason: &str) -> TetherResult<u32> {
        let window = self.config.restart_window();
        let slot = self.slot(slug);
        let recent = slot.record.lock().restarts.prune(window);

        if recent >= self.config.max_restarts_in_window as usize {
            let message = format!(
                "restart rate exceeded: {} restarts in {}s",
                recent,
                window.as_secs()
            );
            slot.record.lock().last_error = Some(message.clone());
            self.rate_limited_restarts.fetch_add(1, Ordering::Relaxed);
            warn!(target_slug = slug, "Not restarting: {}", message);
            return Err(TetherError::Process(message));
        }

        info!(target_slug = slug, "Restarting: {}", reason);
        self.restart(slug).await
    }

    pub fn restarts_in_last(&self, slug: &str, window: Duration) -> usize {
        let slot = self.slots.read().get(slug).cloned();
        slot.map(|slot| slot.record.lock().restarts.restarts_in_last(window))
            .unwrap_or(0)
    }

    pub async fn start_autostart(&self) -> usize {
        let mut started = 0;
        for target in self
            .registry
            .targets()
            .into_iter()
            .filter(|t| t.is_local() && t.autostart)
        {
            match self.start(&target.slug).await {
                Ok(_) => started += 1,
                Err(e) => warn!(target_slug = %target.slug, "Autostart failed: {}", e),
            }
        }
        started
    }

    pub fn process_info(&self, slug: &str) -> Option<ProcessInfo> {
        let target = self.registry.get(slug).filter(Target::is_local)?;
        let command = target
            .launch
            .as_ref()
            .map(LaunchSpec::display_command)
            .unwrap_or_default();
        let window = self.config.restart_window();
        let slot = self.slots.read().get(slug).cloned();

        let info = match slot {
            Some(slot) => {
                let record = slot.record.lock();
                ProcessInfo {
                    slug: slug.to_string(),
                    state: record.state,
                    pid: record.pid(),
                    command,
                    started_at: record.started_wall.filter(|_| record.is_running()),
                    uptime_secs: record.uptime_secs(),
                    total_restarts: record.total_restarts,
                    restarts_in_window: record.restarts.restarts_in_last(window),
                    last_exit_code: record.last_exit_code,
                    last_error: record.last_error.clone(),
                    memory_bytes: record.memory_bytes,
                    cpu_percent: record.cpu_percent,
                }
            }
            None => ProcessInfo {
                slug: slug.to_string(),
                state: ProcessState::NotStarted,
                pid: None,
                command,
                started_at: None,
                uptime_secs: 0,
                total_restarts: 0,
                restarts_in_window: 0,
                last_exit_code: None,
                last_error: None,
                memory_bytes: None,
                cpu_percent: None,
            },
        };
        Some(info)
    }

    pub fn all_process_info(&self) -> Vec<ProcessInfo> {
        self.registry
            .targets()
            .iter()
            .filter_map(|t| self.process_info(&t.slug))
            .collect()
    }

    pub fn stats(&self) -> SupervisorStats {
        let total_targets = self
            .registry
            .targets()
            .iter()
            .filter(|t| t.is_local())
            .count();
        let running = self
            .slots
            .read()
            .values()
            .filter(|slot| slot.record.lock().is_running())
            .count();

        SupervisorStats {
            total_targets,
            running,
            stopped: total_targets.saturating_sub(running),
            total_started: self.total_started.load(Ordering::Relaxed),
            total_restarts: self.total_restarts.load(Ordering::Relaxed),
            rate_limited_restarts: self.rate_limited_restarts.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    fn snapshot_slots(&self) -> Vec<(String, Arc<ProcessSlot>)> {
        self.slots
            .read()
            .iter()
            .map(|(slug, slot)| (slug.clone(), Arc::clone(slot)))
            .collect()
    }

    // Slots whose lifecycle lock is held are skipped; they are mid start/stop.
    fn reap_exited(&self) -> Vec<(String, bool)> {
        let mut exited = Vec::new();
        for (slug, slot) in self.snapshot_slots() {
            let Ok(_guard) = slot.lifecycle.try_lock() else {
                continue;
            };
            let mut record = slot.record.lock();
            let Some(child) = record.child.as_mut() else {
                continue;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    record.child = None;
                    record.state = ProcessState::Stopped;
                    record.started_at = None;
                    record.last_exit_code = status.code();
                    if status.success() {
                        info!(target_slug = %slug, "Process exited cleanly");
                    } else {
                        record.last_error = Some(format!("process exited with {}", status));
                        warn!(target_slug = %slug, "Process exited with {}", status);
                    }
                    exited.push((slug, status.success()));
                }
                Ok(None) => {}
                Err(e) => debug!(target_slug = %slug, "try_wait failed: {}", e),
            }
        }
        exited
    }

    fn sample_resources(&self) {
        let running: Vec<(Arc<ProcessSlot>, u32)> = self
            .slots
            .read()
            .values()
            .filter_map(|slot| slot.record.lock().pid().map(|pid| (Arc::clone(slot), pid)))
            .collect();
        if running.is_empty() {
            return;
        }

        let mut system = self.system.lock();
        for (slot, pid) in running {
            let pid = sysinfo::Pid::from_u32(pid);
            let sample = if system.refresh_process(pid) {
                system.process(pid).map(|p| (p.memory(), p.cpu_usage()))
            } else {
                None
            };
            let mut record = slot.record.lock();
            record.memory_bytes = sample.map(|(memory, _)| memory);
            record.cpu_percent = sample.map(|(_, cpu)| cpu);
        }
    }

    pub async fn supervise_once(self: &Arc<Self>) {
        for (slug, success) in self.reap_exited() {
            let policy = self
                .registry
                .get(&slug)
                .and_then(|t| t.launch)
                .map(|l| l.restart_policy)
                .unwrap_or(RestartPolicy::Never);

            if !policy.should_restart(success) || self.is_shutting_down() {
                continue;
            }

            let supervisor = Arc::clone(self);
            self.tracker.spawn(async move {
                if let Err(e) = supervisor.auto_restart(&slug, "process exited").await {
                    if !e.is_cancelled() {
                        warn!(target_slug = %slug, "Automatic restart failed: {}", e);
                    }
                }
            });
        }

        self.sample_resources();
        trace!("Supervision tick: {:?}", self.stats());
    }

    pub fn spawn_supervision_loop(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let period = Duration::from_secs(self.config.check_interval_secs.max(1));

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = supervisor.shutdown.cancelled() => break,
                    _ = ticker.tick() => supervisor.supervise_once().await,
                }
            }
            debug!("Supervision loop ended");
        });
    }

    /// Stops every running process within one shared budget. Individual failures are logged.
    pub async fn shutdown(&self, timeout: Duration) -> TetherResult<()> {
        info!("Stopping supervised processes with {:?} budget", timeout);
        self.shutdown.cancel();

        let deadline = Instant::now() + timeout;

        // Every slot's lifecycle lock is taken, even without a child: a restart holding it
        // may have taken the old child and is about to observe the cancellation.
        for (slug, slot) in self.snapshot_slots() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let grace = remaining.min(self.config.stop_grace());

            let _guard = match tokio::time::timeout(remaining, slot.lifecycle.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(target_slug = %slug, "Lifecycle busy at shutdown, dropping handle");
                    drop(slot.record.lock().child.take());
                    continue;
                }
            };

            if slot.record.lock().child.is_none() {
                continue;
            }

            match self.stop_locked(&slug, &slot, grace).await {
                Ok(code) => debug!(target_slug = %slug, exit_code = ?code, "Stopped at shutdown"),
                Err(TetherError::NotRunning(_)) => {}
                Err(e) => warn!(target_slug = %slug, "Failed to stop at shutdown: {}", e),
            }
        }

        self.tracker.close();
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(100));
        if tokio::time::timeout(remaining, self.tracker.wait()).await.is_err() {
            warn!("Supervisor tasks did not finish within the shutdown budget");
        }

        info!("Supervisor shutdown complete");
        Ok(())
    }
}

impl ProcessView for ProcessSupervisor {
    fn process_status(&self, slug: &str) -> ProcessStatus {
        let slot = self.slots.read().get(slug).cloned();
        let Some(slot) = slot else {
            return ProcessStatus::stopped();
        };
        let mut record = slot.record.lock();
        let alive = match record.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        ProcessStatus {
            running: alive && record.state == ProcessState::Running,
            uptime: record.started_at.map(|at| at.elapsed()),
        }
    }

    fn restarts_in_last(&self, slug: &str, window: Duration) -> usize {
        ProcessSupervisor::restarts_in_last(self, slug, window)
    }
}

#[async_trait]
impl RecoveryHandler for ProcessSupervisor {
    async fn on_persistent_failure(&self, slug: &str, consecutive_failures: u32) -> TetherResult<()> {
        let reason = format!("{} consecutive failed health checks", consecutive_failures);
        self.auto_restart(slug, &reason).await.map(|_| ())
    }
}
