use super::commands::Cli;
use anyhow::Context;
use std::path::PathBuf;
use tether_daemon::config::{DaemonConfig, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tether"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/tether"))
}

/// Config file path, then `--data-dir` on top of whatever the file and environment say.
pub fn load_config(cli: &Cli) -> anyhow::Result<(PathBuf, DaemonConfig)> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));

    let mut config = DaemonConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    Ok((config_path, config))
}

pub fn init_logging(cli: &Cli, logging: &LoggingConfig) -> anyhow::Result<()> {
    let configured = logging.level.to_string();
    let level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => configured,
            1 => "info,tether_daemon=debug,tether=debug".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let log_file = cli.log_file.clone().or_else(|| logging.file.clone());
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        let layer = fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false);
        if logging.json {
            registry.with(layer.json()).try_init()?;
        } else {
            registry.with(layer).try_init()?;
        }
    } else if logging.json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(cli.verbose >= 2)).try_init()?;
    }
    Ok(())
}

pub fn print_banner() {
    println!("\x1b[38;5;45m");
    println!(r#"
    ████████╗███████╗████████╗██╗  ██╗███████╗██████╗
    ╚══██╔══╝██╔════╝╚══██╔══╝██║  ██║██╔════╝██╔══██╗
       ██║   █████╗     ██║   ███████║█████╗  ██████╔╝
       ██║   ██╔══╝     ██║   ██╔══██║██╔══╝  ██╔══██╗
       ██║   ███████╗   ██║   ██║  ██║███████╗██║  ██║
       ╚═╝   ╚══════╝   ╚═╝   ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝"#);
    println!("\x1b[0m");
    println!("        \x1b[38;5;245mIntegration supervisor - v{}\x1b[0m", BUILD_VERSION);
    println!();
}

pub fn status_color(status: &str) -> &'static str {
    match status {
        "ready" | "active" => "\x1b[38;5;46m",
        "degraded" | "connecting" => "\x1b[38;5;226m",
        _ => "\x1b[38;5;196m",
    }
}
