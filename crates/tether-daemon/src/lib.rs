#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod probe;
pub mod registry;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use api::{create_router, ApiAuthenticator, ApiServer, ApiState};
pub use config::{DaemonConfig, HealthConfig, LogsConfig, SupervisorConfig};
pub use health::{HealthDeps, HealthEngine, HealthRecord, HealthSummary, ProcessView, RecoveryHandler};
pub use logs::{LogEntry, LogManager, LogSubscription};
pub use metrics::{DaemonMetrics, PrometheusExporter};
pub use probe::{ExternalProbe, ProbeOutcome, ProbeRequest};
pub use registry::{
    CredentialStore, Credentials, EnvCredentialStore, FileRegistry, MemoryCredentialStore, RegistrySync,
    TargetRegistry,
};
pub use supervisor::{ProcessInfo, ProcessState, ProcessSupervisor, SupervisorStats};
pub use tether_types::{TetherError, TetherResult};
