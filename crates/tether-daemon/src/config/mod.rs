mod api;
mod constants;
mod daemon;
mod health;
mod logging;
mod logs;
mod security;
mod supervisor;
mod types;

pub use api::ApiConfig;
pub use constants::*;
pub use daemon::{DaemonConfig, RedactedConfig};
pub use health::HealthConfig;
pub use logging::LoggingConfig;
pub use logs::LogsConfig;
pub use security::SecurityConfig;
pub use supervisor::SupervisorConfig;
pub use types::*;
