use tether_types::ExternalStatus;
use tracing::info;

/// Receives the canonical external status of a remote target whenever its health changes.
/// Called from the health notification queue, never from inside a sweep.
pub trait RegistrySync: Send + Sync {
    fn sync_external_status(&self, slug: &str, status: &ExternalStatus);
}

pub struct LoggingRegistrySync;

impl RegistrySync for LoggingRegistrySync {
    fn sync_external_status(&self, slug: &str, status: &ExternalStatus) {
        info!(
            target_slug = slug,
            state = ?status.state,
            response_time_ms = ?status.response_time_ms,
            "External status changed: {}",
            status.message
        );
    }
}
