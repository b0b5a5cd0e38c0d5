use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeClass {
    Healthy,
    Warning,
    Unhealthy,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeIssue {
    Unauthorized,
    Forbidden,
    RateLimited,
    ClientError,
    ServerError,
    Unexpected,
    Network,
    Timeout,
    MissingCredentials,
}

impl ProbeIssue {
    pub fn generic_message(&self, status: Option<u16>) -> String {
        let code = status.map(|s| format!("HTTP {}", s)).unwrap_or_default();
        match self {
            ProbeIssue::Unauthorized => format!("{}: authentication failed", code),
            ProbeIssue::Forbidden => format!("{}: access denied", code),
            ProbeIssue::RateLimited => format!("{}: rate limited", code),
            ProbeIssue::ClientError => format!("{}: request rejected", code),
            ProbeIssue::ServerError => format!("{}: service error", code),
            ProbeIssue::Unexpected => format!("{}: unexpected response", code),
            ProbeIssue::Network => "connection failed".to_string(),
            ProbeIssue::Timeout => "request timed out".to_string(),
            ProbeIssue::MissingCredentials => "no credentials configured".to_string(),
        }
    }
}

pub fn classify_status(status: u16) -> (ProbeClass, Option<ProbeIssue>) {
    match status {
        200..=299 => (ProbeClass::Healthy, None),
        401 => (ProbeClass::Error, Some(ProbeIssue::Unauthorized)),
        403 => (ProbeClass::Error, Some(ProbeIssue::Forbidden)),
        429 => (ProbeClass::Warning, Some(ProbeIssue::RateLimited)),
        400..=499 => (ProbeClass::Error, Some(ProbeIssue::ClientError)),
        500..=599 => (ProbeClass::Unhealthy, Some(ProbeIssue::ServerError)),
        _ => (ProbeClass::Warning, Some(ProbeIssue::Unexpected)),
    }
}

// Values above this are absolute epoch seconds rather than a delta.
const EPOCH_THRESHOLD: i64 = 1_000_000_000;

/// When a rate-limited caller may retry, from `Retry-After` (seconds or HTTP date) or the
/// common `X-RateLimit-Reset` / `RateLimit-Reset` headers.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(value) = header("retry-after") {
        if let Ok(secs) = value.parse::<i64>() {
            return Some(now + ChronoDuration::seconds(secs.max(0)));
        }
        if let Ok(date) = DateTime::parse_from_rfc2822(value) {
            return Some(date.with_timezone(&Utc));
        }
    }

    for name in ["x-ratelimit-reset", "ratelimit-reset"] {
        if let Some(secs) = header(name).and_then(|v| v.parse::<f64>().ok()) {
            let secs = secs as i64;
            if secs >= EPOCH_THRESHOLD {
                return Utc.timestamp_opt(secs, 0).single();
            }
            return Some(now + ChronoDuration::seconds(secs.max(0)));
        }
    }

    None
}

/// Accepts RFC 3339, RFC 2822 and the `YYYY-MM-DD HH:MM:SS <zone>` form some providers send.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z") {
        return Some(date.with_timezone(&Utc));
    }
    let naive = value.strip_suffix(" UTC").unwrap_or(value);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(200).0, ProbeClass::Healthy);
        assert_eq!(classify_status(204).0, ProbeClass::Healthy);
        assert_eq!(classify_status(401), (ProbeClass::Error, Some(ProbeIssue::Unauthorized)));
        assert_eq!(classify_status(403), (ProbeClass::Error, Some(ProbeIssue::Forbidden)));
        assert_eq!(classify_status(429), (ProbeClass::Warning, Some(ProbeIssue::RateLimited)));
        assert_eq!(classify_status(404), (ProbeClass::Error, Some(ProbeIssue::ClientError)));
        assert_eq!(classify_status(503), (ProbeClass::Unhealthy, Some(ProbeIssue::ServerError)));
        assert_eq!(classify_status(302).0, ProbeClass::Warning);
        assert_eq!(classify_status(101).0, ProbeClass::Warning);
    }

    #[test]
    fn test_retry_after_seconds() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers, now), Some(now + ChronoDuration::seconds(120)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        let parsed = parse_retry_after(&headers, Utc::now()).unwrap();
        assert_eq!(parsed.timestamp(), 1445412480);
    }

    #[test]
    fn test_rate_limit_reset_epoch_and_delta() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        assert_eq!(parse_retry_after(&headers, now).unwrap().timestamp(), 1_700_000_000);

        let mut headers = HeaderMap::new();
        headers.insert("ratelimit-reset", HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers, now), Some(now + ChronoDuration::seconds(30)));
    }

    #[test]
    fn test_no_rate_limit_headers() {
        assert!(parse_retry_after(&HeaderMap::new(), Utc::now()).is_none());
    }

    #[test]
    fn test_parse_provider_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:30:00 UTC"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:30:00 +0000"), Some(expected));
        assert!(parse_timestamp("soon").is_none());
    }
}
