use super::utils::print_banner;
use anyhow::Context;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_daemon::api::{create_router, ApiAuthenticator, ApiServer, ApiState};
use tether_daemon::config::DaemonConfig;
use tether_daemon::health::{HealthDeps, HealthEngine, RecoveryHandler};
use tether_daemon::logs::LogManager;
use tether_daemon::registry::{EnvCredentialStore, FileRegistry, LoggingRegistrySync, TargetRegistry};
use tether_daemon::supervisor::ProcessSupervisor;
use tracing::{error, info, warn};

const STAGE_SHUTDOWN: Duration = Duration::from_secs(5);

pub async fn run_daemon(config: DaemonConfig, pid_file: Option<PathBuf>, systemd: bool) -> anyhow::Result<()> {
    print_banner();
    info!("Starting tether daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", config.data_dir);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).with_context(|| format!("creating log directory {}", log_dir.display()))?;

    if let Some(ref pid_path) = pid_file {
        std::fs::write(pid_path, std::process::id().to_string())
            .with_context(|| format!("writing PID file {}", pid_path.display()))?;
        info!("PID file written: {:?}", pid_path);
    }

    config.log_security_warnings();

    let registry_path = config.registry_file();
    let registry: Arc<dyn TargetRegistry> = Arc::new(FileRegistry::load(&registry_path)?);
    info!("Loaded {} target(s) from {:?}", registry.targets().len(), registry_path);

    let logs = Arc::new(LogManager::new(config.logs.clone(), &log_dir));
    let supervisor = Arc::new(
        ProcessSupervisor::new(config.supervisor.clone(), &log_dir, Arc::clone(&registry))
            .with_write_locks(logs.write_locks()),
    );
    let recovery: Arc<dyn RecoveryHandler> = supervisor.clone();
    let health = Arc::new(HealthEngine::new(
        config.health.clone(),
        HealthDeps {
            registry: Arc::clone(&registry),
            credentials: Arc::new(EnvCredentialStore::new()),
            processes: supervisor.clone(),
            logs: Arc::clone(&logs),
            recovery: Some(recovery),
            sync: Arc::new(LoggingRegistrySync),
        },
    )?);

    let started = supervisor.start_autostart().await;
    info!("Started {} autostart target(s)", started);
    supervisor.spawn_supervision_loop();
    logs.spawn_maintenance();
    health.start();

    let mut api_server = None;
    let mut api_addr = None;
    if config.api.enabled {
        let auth = build_authenticator(&config);
        let state = ApiState::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            Arc::clone(&supervisor),
            Arc::clone(&logs),
            auth,
        );
        let router = create_router(state, &config.api);
        let server = ApiServer::start(config.api_socket_addr(), router).await?;
        api_addr = Some(server.local_addr());
        api_server = Some(server);
    } else {
        info!("HTTP API disabled");
    }

    if systemd {
        notify_systemd_ready();
    }

    print_ready_message(registry.targets().len(), api_addr);

    wait_for_shutdown().await;

    info!("Shutting down...");
    if let Some(mut server) = api_server {
        server.shutdown(STAGE_SHUTDOWN).await;
    }
    health.shutdown(STAGE_SHUTDOWN).await;
    logs.shutdown(STAGE_SHUTDOWN).await;
    if let Err(e) = supervisor.shutdown(config.supervisor.shutdown_timeout()).await {
        error!("Supervisor shutdown failed: {}", e);
    }

    if let Some(ref pid_path) = pid_file {
        remove_pid_file(pid_path);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Returns false only when the file existed and could not be removed.
fn remove_pid_file(pid_path: &Path) -> bool {
    match std::fs::remove_file(pid_path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to remove PID file {:?}: {}", pid_path, e);
            false
        }
    }
}

fn build_authenticator(config: &DaemonConfig) -> ApiAuthenticator {
    if !config.security.api_auth_required {
        return ApiAuthenticator::disabled();
    }
    match config.security.api_auth_token.clone().filter(|t| !t.is_empty()) {
        Some(token) => ApiAuthenticator::new(Some(token)),
        None => {
            let (auth, token) = ApiAuthenticator::with_generated_token();
            warn!("API authentication is required but no token is configured; generated one for this run");
            warn!("Set TETHER_API_TOKEN to keep a stable token. Generated token: {}", token);
            auth
        }
    }
}

fn print_ready_message(targets: usize, api_addr: Option<SocketAddr>) {
    println!();
    println!("\x1b[38;5;46m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[1;38;5;46mtether is now running!\x1b[0m                                      \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  Targets: \x1b[38;5;226m{:<50}\x1b[0m \x1b[38;5;46m║\x1b[0m", targets);
    match api_addr {
        Some(addr) => println!(
            "\x1b[38;5;46m║\x1b[0m  API: \x1b[38;5;51m{:<54}\x1b[0m \x1b[38;5;46m║\x1b[0m",
            format!("http://{}", addr)
        ),
        None => println!("\x1b[38;5;46m║\x1b[0m  API: \x1b[38;5;245m{:<54}\x1b[0m \x1b[38;5;46m║\x1b[0m", "disabled"),
    }
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mRun '\x1b[38;5;51mtether status\x1b[38;5;245m' in another terminal to see health\x1b[0m        \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mPress Ctrl+C to stop\x1b[0m                                        \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╚══════════════════════════════════════════════════════════════╝\x1b[0m");
    println!();
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => { info!("Received SIGTERM"); }
                    _ = sigint.recv() => { info!("Received SIGINT"); }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}

fn notify_systemd_ready() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") {
            use std::os::unix::net::UnixDatagram;
            if let Ok(socket) = UnixDatagram::unbound() {
                let _ = socket.send_to(b"READY=1", &socket_path);
                tracing::debug!("Notified systemd: READY=1");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.pid");
        std::fs::write(&path, "42").unwrap();

        assert!(remove_pid_file(&path));
        assert!(!path.exists());
        assert!(remove_pid_file(&path));
        assert!(!remove_pid_file(dir.path()));
    }
}
