use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_types::{ExternalStatus, HealthStatus, TargetKind};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::hooks::RecoveryHandler;
use crate::registry::RegistrySync;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HealthEvent {
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        slug: String,
        kind: TargetKind,
        previous: HealthStatus,
        current: HealthStatus,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    PersistentFailure {
        slug: String,
        kind: TargetKind,
        consecutive_failures: u32,
    },
    #[serde(rename_all = "camelCase")]
    ExternalStatus { slug: String, status: ExternalStatus },
}

#[derive(Default)]
pub struct NotifierCounters {
    pub sent: AtomicU64,
    pub dropped: AtomicU64,
    pub recoveries_started: AtomicU64,
    pub recoveries_failed: AtomicU64,
}

/// Single serialized queue between the sweeps and everything that reacts to them. Sending
/// never waits; recovery calls run on a fixed number of permits.
pub struct Notifier {
    tx: mpsc::Sender<HealthEvent>,
    counters: Arc<NotifierCounters>,
}

pub struct NotifierDeps {
    pub recovery: Option<Arc<dyn RecoveryHandler>>,
    pub sync: Arc<dyn RegistrySync>,
    pub auto_restart: bool,
    pub queue_size: usize,
    pub workers: usize,
}

impl Notifier {
    pub fn spawn(deps: NotifierDeps, tracker: &TaskTracker, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(deps.queue_size.max(1));
        let counters = Arc::new(NotifierCounters::default());
        let dispatcher = Dispatcher {
            recovery: deps.recovery,
            sync: deps.sync,
            auto_restart: deps.auto_restart,
            permits: Arc::new(Semaphore::new(deps.workers.max(1))),
            counters: Arc::clone(&counters),
            tracker: tracker.clone(),
        };
        tracker.spawn(dispatcher.run(rx, cancel));
        Self { tx, counters }
    }

    pub fn notify(&self, event: HealthEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Health notification queue full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Health notification queue closed");
            }
        }
    }

    pub fn counters(&self) -> &NotifierCounters {
        &self.counters
    }
}

struct Dispatcher {
    recovery: Option<Arc<dyn RecoveryHandler>>,
    sync: Arc<dyn RegistrySync>,
    auto_restart: bool,
    permits: Arc<Semaphore>,
    counters: Arc<NotifierCounters>,
    tracker: TaskTracker,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<HealthEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(event, &cancel).await;
        }
        debug!("Health notification dispatcher stopped");
    }

    async fn dispatch(&self, event: HealthEvent, cancel: &CancellationToken) {
        match event {
            HealthEvent::StatusChanged {
                slug,
                previous,
                current,
                message,
                ..
            } => {
                if current.is_usable() {
                    info!(target_slug = %slug, %previous, %current, "Health changed: {}", message);
                } else {
                    warn!(target_slug = %slug, %previous, %current, "Health changed: {}", message);
                }
            }
            HealthEvent::ExternalStatus { slug, status } => {
                self.sync.sync_external_status(&slug, &status);
            }
            HealthEvent::PersistentFailure {
                slug,
                kind,
                consecutive_failures,
            } => {
                if kind.is_remote() {
                    warn!(target_slug = %slug, consecutive_failures, "Remote target keeps failing");
                    return;
                }
                let Some(recovery) = self.recovery.clone() else {
                    warn!(target_slug = %slug, consecutive_failures, "Persistent failure, no recovery handler");
                    return;
                };
                if !self.auto_restart {
                    warn!(target_slug = %slug, consecutive_failures, "Persistent failure, auto-restart disabled");
                    return;
                }

                let permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                self.counters.recoveries_started.fetch_add(1, Ordering::Relaxed);
                let counters = Arc::clone(&self.counters);
                self.tracker.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = recovery.on_persistent_failure(&slug, consecutive_failures).await {
                        counters.recoveries_failed.fetch_add(1, Ordering::Relaxed);
                        if !e.is_cancelled() {
                            error!(target_slug = %slug, "Recovery failed: {}", e);
                        }
                    }
                });
            }
        }
    }
}
