use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tether_types::{TetherError, TetherResult};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cursor::{LogCursor, Subscriber};
use super::rotation::{plan_rotation, trim_front};
use super::types::{LogStats, LogSubscription};
use super::writer::LogWriteLocks;
use crate::config::LogsConfig;

pub struct LogManager {
    config: LogsConfig,
    log_dir: PathBuf,
    cursors: RwLock<HashMap<String, Arc<LogCursor>>>,
    write_locks: Arc<LogWriteLocks>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    dropped_lines: Arc<AtomicU64>,
    rotations: AtomicU64,
    bytes_trimmed: AtomicU64,
}

impl LogManager {
    pub fn new(config: LogsConfig, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            log_dir: log_dir.into(),
            cursors: RwLock::new(HashMap::new()),
            write_locks: Arc::new(LogWriteLocks::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            dropped_lines: Arc::new(AtomicU64::new(0)),
            rotations: AtomicU64::new(0),
            bytes_trimmed: AtomicU64::new(0),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Locks the supervisor's output pumps must share so rotation never races an append.
    pub fn write_locks(&self) -> Arc<LogWriteLocks> {
        Arc::clone(&self.write_locks)
    }

    pub fn log_path(&self, slug: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", slug))
    }

    fn cursor(&self, slug: &str) -> TetherResult<Arc<LogCursor>> {
        if self.shutdown.is_cancelled() {
            return Err(TetherError::Cancelled);
        }
        if let Some(cursor) = self.cursors.read().get(slug) {
            return Ok(Arc::clone(cursor));
        }

        let mut cursors = self.cursors.write();
        if let Some(cursor) = cursors.get(slug) {
            return Ok(Arc::clone(cursor));
        }

        let cursor = Arc::new(LogCursor::new(
            slug,
            self.log_path(slug),
            self.shutdown.child_token(),
        ));
        cursors.insert(slug.to_string(), Arc::clone(&cursor));
        self.spawn_watcher(Arc::clone(&cursor));
        debug!(target_slug = slug, "Started log watcher");
        Ok(cursor)
    }

    fn spawn_watcher(&self, cursor: Arc<LogCursor>) {
        let period = self.config.poll_interval();
        let dropped_lines = Arc::clone(&self.dropped_lines);

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cursor.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match cursor.poll().await {
                    Ok(report) if report.dropped > 0 => {
                        dropped_lines.fetch_add(report.dropped, Ordering::Relaxed);
                        debug!(target_slug = %cursor.slug, "Dropped {} line(s) for slow subscribers", report.dropped);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(target_slug = %cursor.slug, "Log poll failed: {}", e),
                }
            }
            debug!(target_slug = %cursor.slug, "Log watcher stopped");
        });
    }

    /// Replays complete lines after `from_line`, then streams new lines as they are written.
    pub async fn tail(&self, slug: &str, from_line: u64) -> TetherResult<LogSubscription> {
        loop {
            let cursor = self.cursor(slug)?;
            if let Some(subscription) = self.subscribe(&cursor, from_line).await? {
                return Ok(subscription);
            }
        }
    }

    // None when the cursor was torn down while we waited for it.
    async fn subscribe(
        &self,
        cursor: &LogCursor,
        from_line: u64,
    ) -> TetherResult<Option<LogSubscription>> {
        let mut state = cursor.state.lock().await;
        if cursor.cancel.is_cancelled() {
            return Ok(None);
        }
        cursor.prime(&mut state).await?;

        let history = cursor.replay(&state, from_line).await?;
        let (tx, receiver) = mpsc::channel(history.len() + self.config.subscriber_queue.max(1));
        for entry in history {
            if tx.try_send(entry).is_err() {
                break;
            }
        }

        let id = Uuid::new_v4();
        let last_delivered = state.line_count;
        state.subscribers.insert(
            id,
            Subscriber {
                tx,
                last_delivered,
                dropped: 0,
            },
        );
        debug!(target_slug = %cursor.slug, subscriber = %id, from_line, "Log subscriber added");

        Ok(Some(LogSubscription {
            id,
            slug: cursor.slug.clone(),
            receiver,
        }))
    }

    pub async fn unsubscribe(&self, slug: &str, id: Uuid) -> bool {
        let cursor = self.cursors.read().get(slug).cloned();
        let Some(cursor) = cursor else {
            return false;
        };
        let removed = cursor.state.lock().await.subscribers.remove(&id);
        match removed {
            Some(sub) => {
                debug!(target_slug = slug, subscriber = %id, dropped = sub.dropped, "Log subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Tears down watchers that have no live subscribers. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let cursors: Vec<(String, Arc<LogCursor>)> = self
            .cursors
            .read()
            .iter()
            .map(|(slug, cursor)| (slug.clone(), Arc::clone(cursor)))
            .collect();

        let mut removed = 0;
        for (slug, cursor) in cursors {
            let mut state = cursor.state.lock().await;
            state.subscribers.retain(|_, sub| !sub.tx.is_closed());
            if !state.subscribers.is_empty() {
                continue;
            }

            cursor.cancel.cancel();
            {
                let mut map = self.cursors.write();
                if map.get(&slug).is_some_and(|c| Arc::ptr_eq(c, &cursor)) {
                    map.remove(&slug);
                }
            }
            removed += 1;
        }

        if removed > 0 {
            debug!("Tore down {} idle log watcher(s)", removed);
        }
        removed
    }

    async fn log_files(&self) -> TetherResult<Vec<(String, PathBuf, u64)>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => {
                return Err(TetherError::LogAccess(format!("{:?}: {}", self.log_dir, e)));
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push((slug, path, meta.len()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// One rotation pass over every `*.log` file. Returns the total bytes removed.
    pub async fn rotate(&self) -> TetherResult<u64> {
        let files = self.log_files().await?;
        let sizes: Vec<u64> = files.iter().map(|(_, _, size)| *size).collect();
        let plan = plan_rotation(&sizes, self.config.max_file_bytes, self.config.max_total_bytes);

        let mut removed_total = 0;
        for ((slug, path, _), trim) in files.iter().zip(plan) {
            if trim == 0 {
                continue;
            }
            let cursor = self.cursors.read().get(slug).cloned();
            let write_lock = self.write_locks.lock_for(slug);
            let _writers = write_lock.lock().await;
            let result = match &cursor {
                Some(cursor) => {
                    let mut state = cursor.state.lock().await;
                    let result = trim_front(path, trim).await;
                    if let Ok(trimmed) = &result {
                        if trimmed.bytes_removed > state.offset {
                            state.offset = 0;
                            state.partial.clear();
                        } else {
                            state.offset -= trimmed.bytes_removed;
                        }
                    }
                    result
                }
                None => trim_front(path, trim).await,
            };

            match result {
                Ok(trimmed) => {
                    removed_total += trimmed.bytes_removed;
                    debug!(
                        target_slug = %slug,
                        bytes = trimmed.bytes_removed,
                        lines = trimmed.lines_removed,
                        "Rotated log"
                    );
                }
                Err(e) => warn!(target_slug = %slug, "Log rotation failed: {}", e),
            }
        }

        if removed_total > 0 {
            self.rotations.fetch_add(1, Ordering::Relaxed);
            self.bytes_trimmed.fetch_add(removed_total, Ordering::Relaxed);
            info!("Log rotation trimmed {} bytes", removed_total);
        }
        Ok(removed_total)
    }

    /// Last `max_bytes` of the target's log, or `None` when it has not written one yet.
    pub async fn read_tail(&self, slug: &str, max_bytes: u64) -> TetherResult<Option<String>> {
        let path = self.log_path(slug);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TetherError::LogAccess(format!("{:?}: {}", path, e))),
        };
        let len = file.metadata().await?.len();
        let start = len.saturating_sub(max_bytes);
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).await?;
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    pub async fn last_modified(&self, slug: &str) -> TetherResult<Option<SystemTime>> {
        let path = self.log_path(slug);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TetherError::LogAccess(format!("{:?}: {}", path, e))),
        }
    }

    pub fn spawn_maintenance(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut rotation = tokio::time::interval(manager.config.rotation_interval());
            let mut cleanup = tokio::time::interval(manager.config.cleanup_interval());
            rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);
            cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = rotation.tick() => {
                        if let Err(e) = manager.rotate().await {
                            warn!("Log rotation pass failed: {}", e);
                        }
                    }
                    _ = cleanup.tick() => {
                        manager.cleanup().await;
                    }
                }
            }
            debug!("Log maintenance loop ended");
        });
    }

    pub async fn stats(&self) -> LogStats {
        let cursors: Vec<Arc<LogCursor>> = self.cursors.read().values().cloned().collect();
        let mut subscribers = 0;
        for cursor in &cursors {
            subscribers += cursor.state.lock().await.subscribers.len();
        }
        LogStats {
            active_cursors: cursors.len(),
            subscribers,
            dropped_lines: self.dropped_lines.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            bytes_trimmed: self.bytes_trimmed.load(Ordering::Relaxed),
        }
    }

    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();
        self.cursors.write().clear();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!("Log watchers did not stop within {:?}", timeout);
        }
        debug!("Log manager stopped");
    }
}
