use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tether_types::{TetherError, TetherResult};
use tracing::{info, warn};

use super::api::ApiConfig;
use super::constants::DEFAULT_HISTORY_CAPACITY;
use super::health::HealthConfig;
use super::logging::LoggingConfig;
use super::logs::LogsConfig;
use super::security::SecurityConfig;
use super::supervisor::SupervisorConfig;
use super::types::{LogLevel, SecurityWarning, WarningSeverity};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub registry_file: Option<PathBuf>,
    pub health: HealthConfig,
    pub supervisor: SupervisorConfig,
    pub logs: LogsConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".tether"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tether"));

        Self {
            data_dir,
            log_dir: None,
            registry_file: None,
            health: HealthConfig::default(),
            supervisor: SupervisorConfig::default(),
            logs: LogsConfig::default(),
            api: ApiConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> TetherResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TetherError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| TetherError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> TetherResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| TetherError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TetherError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| TetherError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TETHER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(port) = std::env::var("TETHER_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Ok(bind) = std::env::var("TETHER_API_BIND") {
            if let Ok(addr) = bind.parse() {
                self.api.bind_address = addr;
                if bind != "127.0.0.1" && bind != "::1" {
                    warn!(
                        "API server binding to non-localhost address: {}. Ensure proper firewall rules.",
                        bind
                    );
                }
            }
        }

        if let Ok(level) = std::env::var("TETHER_LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&level).unwrap_or(LogLevel::Info);
        }

        if std::env::var("TETHER_LOG_JSON").is_ok() {
            self.logging.json = true;
        }

        if let Ok(token) = std::env::var("TETHER_API_TOKEN") {
            self.security.api_auth_token = Some(token);
            self.security.api_auth_required = true;
        }
    }

    pub fn validate(&self) -> TetherResult<()> {
        if self.api.enabled && self.api.port == 0 {
            return Err(TetherError::Config("API port cannot be 0".into()));
        }

        let h = &self.health;
        if h.local_interval_secs == 0 || h.remote_interval_secs == 0 {
            return Err(TetherError::Config("Health sweep intervals must be positive".into()));
        }
        if h.http_attempts == 0 {
            return Err(TetherError::Config("health.http_attempts must be at least 1".into()));
        }
        if h.failure_threshold == 0 {
            return Err(TetherError::Config("health.failure_threshold must be at least 1".into()));
        }
        if h.history_capacity == 0 || h.history_capacity > DEFAULT_HISTORY_CAPACITY {
            return Err(TetherError::Config(format!(
                "health.history_capacity must be between 1 and {}",
                DEFAULT_HISTORY_CAPACITY
            )));
        }
        if h.stdio_fresh_secs > h.stdio_stale_secs {
            return Err(TetherError::Config(
                "health.stdio_fresh_secs cannot exceed health.stdio_stale_secs".into(),
            ));
        }
        if h.notify_queue_size == 0 || h.recovery_workers == 0 {
            return Err(TetherError::Config(
                "Notification queue and recovery pool must be non-empty".into(),
            ));
        }

        let l = &self.logs;
        if l.poll_interval_ms == 0 {
            return Err(TetherError::Config("logs.poll_interval_ms must be positive".into()));
        }
        if l.max_file_bytes == 0 || l.max_total_bytes == 0 {
            return Err(TetherError::Config("Log size caps must be positive".into()));
        }
        if l.max_file_bytes > l.max_total_bytes {
            return Err(TetherError::Config(
                "logs.max_file_bytes cannot exceed logs.max_total_bytes".into(),
            ));
        }

        if self.supervisor.check_interval_secs == 0 {
            return Err(TetherError::Config(
                "supervisor.check_interval_secs must be positive".into(),
            ));
        }

        if self.security.api_auth_required && self.security.api_auth_token.is_none() {
            warn!("API auth required but no token set. Set TETHER_API_TOKEN environment variable.");
        }

        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    pub fn registry_file(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("targets.toml"))
    }

    pub fn check_security_warnings(&self) -> Vec<SecurityWarning> {
        let mut warnings = Vec::new();

        if !self.security.api_auth_required && !self.api_is_localhost_only() {
            warnings.push(SecurityWarning {
                severity: WarningSeverity::High,
                message: "API is reachable beyond localhost without authentication.".into(),
                recommendation: "Set api_auth_required = true and configure TETHER_API_TOKEN.".into(),
            });
        } else if self.security.api_auth_required && self.security.api_auth_token.is_none() {
            warnings.push(SecurityWarning {
                severity: WarningSeverity::High,
                message: "API auth required but no token configured.".into(),
                recommendation: "Set TETHER_API_TOKEN environment variable or api_auth_token in config.".into(),
            });
        }

        if !self.api_is_localhost_only() {
            warnings.push(SecurityWarning {
                severity: WarningSeverity::Medium,
                message: format!("API server bound to non-localhost address: {}", self.api.bind_address),
                recommendation: "Ensure firewall rules restrict access. Use localhost binding if possible.".into(),
            });
        }

        if !self.health.auto_restart {
            warnings.push(SecurityWarning {
                severity: WarningSeverity::Low,
                message: "Automatic restart on persistent failure is disabled.".into(),
                recommendation: "Set health.auto_restart = true to recover crashed integrations.".into(),
            });
        }

        warnings
    }

    pub fn log_security_warnings(&self) {
        let warnings = self.check_security_warnings();
        if warnings.is_empty() {
            info!("Security check passed - no warnings");
            return;
        }

        for warning in &warnings {
            match warning.severity {
                WarningSeverity::High => {
                    warn!("SECURITY: {}", warning.message);
                    warn!("  -> {}", warning.recommendation);
                }
                WarningSeverity::Medium => {
                    warn!("{}", warning.message);
                    info!("  -> {}", warning.recommendation);
                }
                WarningSeverity::Low => {
                    info!("Note: {}", warning.message);
                }
            }
        }
    }

    pub fn api_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.api.bind_address, self.api.port)
    }

    pub fn api_is_localhost_only(&self) -> bool {
        match self.api.bind_address {
            IpAddr::V4(addr) => addr.is_loopback(),
            IpAddr::V6(addr) => addr.is_loopback(),
        }
    }

    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            data_dir: self.data_dir.clone(),
            log_dir: self.log_dir(),
            registry_file: self.registry_file(),
            api_port: self.api.port,
            api_bind: self.api.bind_address,
            api_auth_required: self.security.api_auth_required,
            api_token_set: self.security.api_auth_token.is_some(),
            local_interval_secs: self.health.local_interval_secs,
            remote_interval_secs: self.health.remote_interval_secs,
            failure_threshold: self.health.failure_threshold,
            auto_restart: self.health.auto_restart,
            max_file_bytes: self.logs.max_file_bytes,
            max_total_bytes: self.logs.max_total_bytes,
        }
    }
}

#[derive(Debug)]
pub struct RedactedConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub registry_file: PathBuf,
    pub api_port: u16,
    pub api_bind: IpAddr,
    pub api_auth_required: bool,
    pub api_token_set: bool,
    pub local_interval_secs: u64,
    pub remote_interval_secs: u64,
    pub failure_threshold: u32,
    pub auto_restart: bool,
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
}

impl std::fmt::Display for RedactedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "tether Configuration")?;
        writeln!(f, "====================")?;
        writeln!(f, "Data dir: {:?}", self.data_dir)?;
        writeln!(f, "Log dir: {:?}", self.log_dir)?;
        writeln!(f, "Registry: {:?}", self.registry_file)?;
        writeln!(f, "API: {}:{}", self.api_bind, self.api_port)?;
        writeln!(
            f,
            "API auth: {} (token {})",
            self.api_auth_required,
            if self.api_token_set { "set" } else { "unset" }
        )?;
        writeln!(
            f,
            "Health sweeps: local {}s, remote {}s",
            self.local_interval_secs, self.remote_interval_secs
        )?;
        writeln!(
            f,
            "Failure threshold: {} (auto restart {})",
            self.failure_threshold,
            if self.auto_restart { "ON" } else { "OFF" }
        )?;
        writeln!(
            f,
            "Log caps: {} bytes per file, {} bytes total",
            self.max_file_bytes, self.max_total_bytes
        )?;
        Ok(())
    }
}
