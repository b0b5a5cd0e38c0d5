use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};
use tether_types::{CheckKind, ExternalState, ExternalStatus};
use tokio_util::sync::CancellationToken;

use super::record::{ProbeResult, RemoteObservation};
use crate::config::HEALTH_URL_ENV;
use crate::probe::{ProbeClass, ProbeOutcome};

const PORT_FLAGS: &[&str] = &["--port", "-p", "--http-port", "--listen-port"];
const HOST_FLAGS: &[&str] = &["--host", "--bind", "-H"];

fn flag_value<'a>(args: &'a [String], flags: &[&str]) -> Option<&'a str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        for flag in flags {
            if arg == flag {
                return iter.next().map(String::as_str);
            }
            if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
                return Some(value);
            }
        }
    }
    None
}

/// URL a local HTTP target answers on. `HEALTH_HTTP_URL` in the target's environment wins,
/// then port/host flags in its arguments, then a `PORT` variable.
pub fn derive_http_url(args: &[String], env: &BTreeMap<String, String>) -> Option<String> {
    if let Some(url) = env.get(HEALTH_URL_ENV).map(|u| u.trim()).filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }

    let port = flag_value(args, PORT_FLAGS)
        .or_else(|| env.get("PORT").map(String::as_str))
        .and_then(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p != 0)?;

    let host = match flag_value(args, HOST_FLAGS).map(str::trim) {
        None | Some("") | Some("0.0.0.0") | Some("::") | Some("localhost") => "127.0.0.1",
        Some(host) => host,
    };

    Some(format!("http://{}:{}", host, port))
}

#[derive(Clone, Copy, Debug)]
pub struct HttpProbeSettings {
    pub attempts: u32,
    pub retry_delay: Duration,
}

/// GET with a fixed delay between attempts. 2xx and 3xx pass. If the last attempt could not
/// connect the result is unrecoverable; a bad status code only counts as a miss.
pub async fn probe_http(
    client: &Client,
    url: &str,
    settings: HttpProbeSettings,
    cancel: &CancellationToken,
) -> ProbeResult {
    let attempts = settings.attempts.max(1);
    let mut last_status = None;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let started = Instant::now();
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let latency = started.elapsed().as_millis() as u64;
                if status.is_success() || status.is_redirection() {
                    return ProbeResult::ok(CheckKind::Http, Some(latency), format!("HTTP {}", status.as_u16()));
                }
                last_status = Some(status.as_u16());
                last_error = format!("HTTP {} from {}", status.as_u16(), url);
            }
            Err(e) => {
                last_status = None;
                last_error = if e.is_timeout() {
                    format!("timed out connecting to {}", url)
                } else {
                    format!("connection to {} failed: {}", url, e)
                };
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(settings.retry_delay) => {}
            }
        }
    }

    match last_status {
        Some(_) => ProbeResult::failed(CheckKind::Http, last_error),
        None => ProbeResult::unrecoverable(CheckKind::Http, last_error),
    }
}

const NEGATIONS: &[&str] = &["not", "no", "never", "yet", "isn't", "wasn't", "hasn't"];

/// Case-insensitive, whole-word marker search. A marker right after a negation
/// ("not initialized") does not count.
pub fn contains_marker(tail: &str, markers: &[String]) -> bool {
    let haystack = tail.to_lowercase();
    markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .any(|m| haystack.lines().any(|line| line_has_marker(line, &m)))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn line_has_marker(line: &str, marker: &str) -> bool {
    line.match_indices(marker).any(|(start, _)| {
        let before = &line[..start];
        let after = &line[start + marker.len()..];
        if before.chars().next_back().is_some_and(is_word_char)
            || after.chars().next().is_some_and(is_word_char)
        {
            return false;
        }
        let previous_word = before
            .split(|c: char| !is_word_char(c) && c != '\'')
            .filter(|w| !w.is_empty())
            .next_back();
        !previous_word.is_some_and(|w| NEGATIONS.contains(&w))
    })
}

#[derive(Clone, Copy, Debug)]
pub struct StdioWindows {
    pub fresh: Duration,
    pub stale: Duration,
}

/// Before the handshake: a process younger than the stale window is still starting up.
pub fn evaluate_startup(age: Duration, windows: StdioWindows) -> ProbeResult {
    if age < windows.stale {
        ProbeResult::impaired(
            CheckKind::Stdio,
            format!("waiting for readiness marker ({}s since start)", age.as_secs()),
        )
    } else {
        ProbeResult::unrecoverable(
            CheckKind::Stdio,
            format!("no readiness marker after {}s", age.as_secs()),
        )
    }
}

/// After the handshake: liveness by how recently the log was written.
pub fn evaluate_recency(modified: Option<SystemTime>, now: SystemTime, windows: StdioWindows) -> ProbeResult {
    let Some(modified) = modified else {
        return ProbeResult::unrecoverable(CheckKind::Stdio, "log file is missing");
    };
    let idle = now.duration_since(modified).unwrap_or(Duration::ZERO);
    if idle <= windows.fresh {
        ProbeResult::ok(CheckKind::Stdio, None, "log active")
    } else if idle <= windows.stale {
        ProbeResult::impaired(CheckKind::Stdio, format!("log idle for {}s", idle.as_secs()))
    } else {
        ProbeResult::unrecoverable(CheckKind::Stdio, format!("no log activity for {}s", idle.as_secs()))
    }
}

pub fn external_state(class: ProbeClass) -> ExternalState {
    match class {
        ProbeClass::Healthy | ProbeClass::Warning => ExternalState::Active,
        ProbeClass::Unhealthy => ExternalState::Inactive,
        ProbeClass::Error => ExternalState::Error,
    }
}

pub fn external_status(outcome: &ProbeOutcome, checked_at: DateTime<Utc>) -> ExternalStatus {
    ExternalStatus {
        state: external_state(outcome.class),
        message: outcome.message.clone(),
        last_checked: checked_at,
        response_time_ms: outcome.response_time_ms,
    }
}

/// Healthy and warning keep the target usable; unhealthy and error take it down at once.
pub fn remote_result(outcome: &ProbeOutcome) -> ProbeResult {
    let mut result = match outcome.class {
        ProbeClass::Healthy => ProbeResult::ok(CheckKind::External, outcome.response_time_ms, outcome.message.clone()),
        ProbeClass::Warning => ProbeResult {
            latency_ms: outcome.response_time_ms,
            ..ProbeResult::impaired(CheckKind::External, outcome.message.clone())
        },
        ProbeClass::Unhealthy | ProbeClass::Error => ProbeResult {
            latency_ms: outcome.response_time_ms,
            ..ProbeResult::unrecoverable(CheckKind::External, outcome.message.clone())
        },
    };
    result.remote = Some(RemoteObservation {
        class: outcome.class,
        status_code: outcome.status_code,
        rate_limited: outcome.rate_limited,
        retry_at: outcome.retry_at,
        credential_expiring: outcome.credential_expiring,
        credential_expires_at: outcome.credential_expires_at,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_port_flag_with_equals() {
        assert_eq!(
            derive_http_url(&args(&["--port=8080"]), &BTreeMap::new()),
            Some("http://127.0.0.1:8080".to_string())
        );
    }

    #[test]
    fn test_short_port_flag() {
        assert_eq!(
            derive_http_url(&args(&["-p", "3000"]), &BTreeMap::new()),
            Some("http://127.0.0.1:3000".to_string())
        );
    }

    #[test]
    fn test_env_override_wins() {
        let mut env = BTreeMap::new();
        env.insert(HEALTH_URL_ENV.to_string(), "http://127.0.0.1:9999/healthz".to_string());
        assert_eq!(
            derive_http_url(&args(&["--port=8080"]), &env),
            Some("http://127.0.0.1:9999/healthz".to_string())
        );
    }

    #[test]
    fn test_host_flag_and_port_env() {
        let mut env = BTreeMap::new();
        env.insert("PORT".to_string(), "4000".to_string());
        assert_eq!(
            derive_http_url(&args(&["--host", "0.0.0.0"]), &env),
            Some("http://127.0.0.1:4000".to_string())
        );
        assert_eq!(
            derive_http_url(&args(&["--host=10.0.0.2", "--port", "81"]), &BTreeMap::new()),
            Some("http://10.0.0.2:81".to_string())
        );
    }

    #[test]
    fn test_no_endpoint() {
        assert_eq!(derive_http_url(&args(&["serve", "--verbose"]), &BTreeMap::new()), None);
        assert_eq!(derive_http_url(&args(&["--port=abc"]), &BTreeMap::new()), None);
        assert_eq!(derive_http_url(&args(&["--portable"]), &BTreeMap::new()), None);
    }

    #[test]
    fn test_marker_match_is_case_insensitive() {
        let markers = vec!["Server Ready".to_string()];
        assert!(contains_marker("boot...\nSERVER READY on stdio\n", &markers));
        assert!(!contains_marker("booting\n", &markers));
    }

    #[test]
    fn test_marker_needs_whole_words() {
        let markers = vec!["initialized".to_string()];
        assert!(contains_marker("booting\nServer initialized.\n", &markers));
        assert!(contains_marker("initialized\n", &markers));
        assert!(!contains_marker("cache uninitialized\n", &markers));
        assert!(!contains_marker("reinitialized_state=false\n", &markers));
        assert!(!contains_marker("plugin not initialized\n", &markers));
        assert!(!contains_marker("store is not yet initialized\n", &markers));
        assert!(contains_marker("store not ready\nstore initialized\n", &markers));
    }

    #[test]
    fn test_startup_window() {
        let windows = StdioWindows {
            fresh: Duration::from_secs(60),
            stale: Duration::from_secs(300),
        };
        let early = evaluate_startup(Duration::from_secs(30), windows);
        assert!(early.success && early.impaired);
        let late = evaluate_startup(Duration::from_secs(360), windows);
        assert!(!late.success && late.unrecoverable);
    }

    #[test]
    fn test_recency_windows() {
        let windows = StdioWindows {
            fresh: Duration::from_secs(60),
            stale: Duration::from_secs(300),
        };
        let now = SystemTime::now();
        let fresh = evaluate_recency(Some(now - Duration::from_secs(10)), now, windows);
        assert!(fresh.success && !fresh.impaired);
        let idle = evaluate_recency(Some(now - Duration::from_secs(120)), now, windows);
        assert!(idle.success && idle.impaired);
        let dead = evaluate_recency(Some(now - Duration::from_secs(600)), now, windows);
        assert!(!dead.success);
        assert!(!evaluate_recency(None, now, windows).success);
    }

    #[test]
    fn test_external_state_mapping() {
        assert_eq!(external_state(ProbeClass::Healthy), ExternalState::Active);
        assert_eq!(external_state(ProbeClass::Warning), ExternalState::Active);
        assert_eq!(external_state(ProbeClass::Unhealthy), ExternalState::Inactive);
        assert_eq!(external_state(ProbeClass::Error), ExternalState::Error);
    }
}
