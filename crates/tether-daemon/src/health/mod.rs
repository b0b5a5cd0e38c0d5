mod engine;
mod hooks;
mod notify;
mod policy;
mod probes;
mod record;

pub use engine::{estimated_rate_limit_backoff, HealthDeps, HealthEngine, HealthEngineStats, HealthSummary};
pub use hooks::{ProcessStatus, ProcessView, RecoveryHandler};
pub use notify::{HealthEvent, Notifier, NotifierCounters, NotifierDeps};
pub use policy::{classify, ProbeInput, Thresholds};
pub use probes::{derive_http_url, external_state, external_status, remote_result};
pub use record::{CheckOutcome, HealthRecord, ProbeResult, RemoteHealth, RemoteObservation, Transition};
