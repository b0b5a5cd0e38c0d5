mod error;
mod health;
mod target;

pub use error::{TetherError, TetherResult};
pub use health::{CheckKind, ExternalState, ExternalStatus, HealthStatus};
pub use target::{AuthScheme, LaunchSpec, RemoteSpec, RestartPolicy, Target, TargetKind};
