use super::commands::OutputFormat;
use super::utils::{print_banner, status_color};
use anyhow::{bail, Context};
use serde_json::Value;
use tether_daemon::config::DaemonConfig;
use tether_daemon::registry::{FileRegistry, TargetRegistry};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(all(target_arch = "x86_64", target_os = "macos"))]
const BUILD_TARGET: &str = "x86_64-apple-darwin";
#[cfg(all(target_arch = "aarch64", target_os = "macos"))]
const BUILD_TARGET: &str = "aarch64-apple-darwin";
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
const BUILD_TARGET: &str = "x86_64-unknown-linux-gnu";
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
const BUILD_TARGET: &str = "aarch64-unknown-linux-gnu";
#[cfg(not(any(
    all(target_arch = "x86_64", target_os = "macos"),
    all(target_arch = "aarch64", target_os = "macos"),
    all(target_arch = "x86_64", target_os = "linux"),
    all(target_arch = "aarch64", target_os = "linux"),
)))]
const BUILD_TARGET: &str = "unknown";

fn api_base(config: &DaemonConfig) -> String {
    let addr = config.api_socket_addr();
    let host = if addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        addr.ip().to_string()
    };
    format!("http://{}:{}", host, addr.port())
}

async fn get_json(config: &DaemonConfig, path: &str) -> anyhow::Result<Option<Value>> {
    let url = format!("{}{}", api_base(config), path);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let mut request = client.get(&url);
    if let Some(token) = config.security.api_auth_token.as_deref() {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("daemon not reachable at {} (is `tether run` active?)", api_base(config)))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body["error"].as_str().unwrap_or("request failed");
        bail!("daemon returned {}: {}", status, message);
    }
    Ok(Some(response.json().await?))
}

pub async fn show_status(
    config: &DaemonConfig,
    slug: Option<&str>,
    external: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let base = if external { "/v1/health/external" } else { "/v1/health" };

    let records = match slug {
        Some(slug) => {
            let path = format!("{}/{}", base, slug);
            match get_json(config, &path).await? {
                Some(record) => vec![record],
                None => bail!("unknown target '{}'", slug),
            }
        }
        None => {
            let summary = get_json(config, base).await?.unwrap_or(Value::Null);
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            println!(
                "{} target(s): {} ready, {} degraded, {} down",
                summary["total"], summary["ready"], summary["degraded"], summary["down"]
            );
            summary["targets"].as_array().cloned().unwrap_or_default()
        }
    };

    if format == OutputFormat::Json {
        for record in &records {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        return Ok(());
    }

    println!();
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &Value) {
    let status = record["status"].as_str().unwrap_or("unknown");
    println!(
        "  {}{:<9}\x1b[0m {:<24} {}",
        status_color(status),
        status,
        record["slug"].as_str().unwrap_or("?"),
        record["message"].as_str().unwrap_or("")
    );

    let checks = record["totalChecks"].as_u64().unwrap_or(0);
    let failures = record["totalFailures"].as_u64().unwrap_or(0);
    let avg = record["avgResponseMs"]
        .as_f64()
        .map(|ms| format!("{:.0}ms", ms))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "            checks {}  failures {}  streak {}  avg {}",
        checks, failures, record["consecutiveFailures"], avg
    );

    if let Some(remote) = record.get("remote").filter(|r| !r.is_null()) {
        let external = &remote["external"];
        let state = external["state"].as_str().unwrap_or("unknown");
        println!(
            "            {} {}{}\x1b[0m{}{}",
            remote["provider"].as_str().unwrap_or("?"),
            status_color(state),
            state,
            if remote["rateLimited"].as_bool().unwrap_or(false) {
                format!("  rate limited until {}", remote["rateLimitReset"].as_str().unwrap_or("?"))
            } else {
                String::new()
            },
            if remote["credentialWarning"].as_bool().unwrap_or(false) {
                "  credentials expiring"
            } else {
                ""
            }
        );
    }
}

pub fn show_targets(config: &DaemonConfig, format: OutputFormat) -> anyhow::Result<()> {
    let path = config.registry_file();
    let registry = FileRegistry::load(&path)?;
    let mut targets = registry.targets();
    targets.sort_by(|a, b| a.slug.cmp(&b.slug));

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!("No targets registered in {}", path.display());
        return Ok(());
    }

    println!("{:<24} {:<16} {:<10} DETAIL", "SLUG", "KIND", "AUTOSTART");
    for target in &targets {
        let detail = match (&target.launch, &target.remote) {
            (Some(launch), _) => launch.display_command(),
            (None, Some(remote)) => format!("{} {}", remote.provider, remote.endpoint),
            (None, None) => String::new(),
        };
        println!(
            "{:<24} {:<16} {:<10} {}",
            target.slug,
            target.kind.to_string(),
            if target.autostart { "yes" } else { "no" },
            detail
        );
    }
    Ok(())
}

pub fn show_version(format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let info = serde_json::json!({
                "version": BUILD_VERSION,
                "target": BUILD_TARGET,
            });
            println!("{}", info);
        }
        OutputFormat::Text => {
            print_banner();
            println!("  Version:  {}", BUILD_VERSION);
            println!("  Target:   {}", BUILD_TARGET);
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_api_base_rewrites_unspecified_bind() {
        let mut config = DaemonConfig::default();
        config.api.bind_address = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        config.api.port = 9000;
        assert_eq!(api_base(&config), "http://127.0.0.1:9000");
    }
}
