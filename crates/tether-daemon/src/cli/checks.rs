use super::commands::OutputFormat;
use super::utils::status_color;
use anyhow::bail;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_daemon::config::DaemonConfig;
use tether_daemon::health::{HealthDeps, HealthEngine, HealthRecord, ProcessStatus, ProcessView};
use tether_daemon::logs::LogManager;
use tether_daemon::registry::{EnvCredentialStore, FileRegistry, LoggingRegistrySync, TargetRegistry};

/// Treats every local target as running so a one-shot check probes whatever is already up.
struct AssumeRunning {
    since: Instant,
}

impl ProcessView for AssumeRunning {
    fn process_status(&self, _slug: &str) -> ProcessStatus {
        ProcessStatus {
            running: true,
            uptime: Some(self.since.elapsed()),
        }
    }

    fn restarts_in_last(&self, _slug: &str, _window: Duration) -> usize {
        0
    }
}

pub async fn run_checks(config: DaemonConfig, slug: Option<String>, format: OutputFormat) -> anyhow::Result<()> {
    let registry: Arc<dyn TargetRegistry> = Arc::new(FileRegistry::load(config.registry_file())?);
    let logs = Arc::new(LogManager::new(config.logs.clone(), config.log_dir()));

    let mut health_config = config.health.clone();
    health_config.auto_restart = false;
    let engine = HealthEngine::new(
        health_config,
        HealthDeps {
            registry: Arc::clone(&registry),
            credentials: Arc::new(EnvCredentialStore::new()),
            processes: Arc::new(AssumeRunning { since: Instant::now() }),
            logs,
            recovery: None,
            sync: Arc::new(LoggingRegistrySync),
        },
    )?;
    engine.sync_with_registry();

    let mut slugs: Vec<String> = match slug {
        Some(slug) => {
            if registry.get(&slug).is_none() {
                bail!("unknown target '{}'", slug);
            }
            vec![slug]
        }
        None => registry.targets().into_iter().map(|t| t.slug).collect(),
    };
    slugs.sort();

    let mut records = Vec::with_capacity(slugs.len());
    for slug in &slugs {
        records.push(engine.check_now(slug).await?);
    }
    engine.shutdown(Duration::from_secs(2)).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print_table(&records),
    }

    if records.iter().any(|r| !r.status.is_usable()) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_table(records: &[HealthRecord]) {
    if records.is_empty() {
        println!("No targets registered");
        return;
    }
    for record in records {
        let latency = record
            .history
            .back()
            .and_then(|o| o.latency_ms)
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}{:<9}\x1b[0m {:<24} {:<16} {:>7}  {}",
            status_color(record.status.as_str()),
            record.status,
            record.slug,
            record.kind.to_string(),
            latency,
            record.message
        );
    }
}
