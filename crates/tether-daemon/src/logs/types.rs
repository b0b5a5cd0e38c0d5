use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub process: String,
    pub level: String,
    pub message: String,
    pub line: u64,
}

impl LogEntry {
    pub fn from_line(process: &str, line: u64, raw: &str) -> Self {
        let raw = raw.trim_end_matches('\r');
        let (timestamp, message) = split_timestamp(raw);
        Self {
            timestamp: timestamp.unwrap_or_else(Utc::now),
            process: process.to_string(),
            level: detect_level(message).to_string(),
            message: message.to_string(),
            line,
        }
    }
}

fn split_timestamp(raw: &str) -> (Option<DateTime<Utc>>, &str) {
    let Some((head, rest)) = raw.split_once(char::is_whitespace) else {
        return (None, raw);
    };
    let head = head.trim_matches(|c| c == '[' || c == ']');
    match DateTime::parse_from_rfc3339(head) {
        Ok(ts) => (Some(ts.with_timezone(&Utc)), rest.trim_start()),
        Err(_) => (None, raw),
    }
}

fn detect_level(message: &str) -> &'static str {
    let upper: String = message.chars().take(64).collect::<String>().to_ascii_uppercase();
    let has = |needle: &str| {
        upper
            .split(|c: char| !c.is_ascii_alphabetic())
            .any(|word| word == needle)
    };
    if has("ERROR") || has("FATAL") || has("PANIC") {
        "error"
    } else if has("WARN") || has("WARNING") {
        "warn"
    } else if has("DEBUG") || has("TRACE") {
        "debug"
    } else {
        "info"
    }
}

pub struct LogSubscription {
    pub id: Uuid,
    pub slug: String,
    pub receiver: mpsc::Receiver<LogEntry>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub active_cursors: usize,
    pub subscribers: usize,
    pub dropped_lines: u64,
    pub rotations: u64,
    pub bytes_trimmed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_detection() {
        assert_eq!(LogEntry::from_line("p", 1, "ERROR: boom").level, "error");
        assert_eq!(LogEntry::from_line("p", 1, "[warn] disk low").level, "warn");
        assert_eq!(LogEntry::from_line("p", 1, "DEBUG cache miss").level, "debug");
        assert_eq!(LogEntry::from_line("p", 1, "server ready").level, "info");
        assert_eq!(LogEntry::from_line("p", 1, "terrorist detection").level, "info");
    }

    #[test]
    fn test_leading_timestamp_is_parsed() {
        let entry = LogEntry::from_line("api", 7, "2024-05-01T10:00:00Z listening on 8080");
        assert_eq!(entry.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(entry.message, "listening on 8080");
        assert_eq!(entry.line, 7);
        assert_eq!(entry.process, "api");
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = LogEntry::from_line("api", 3, "hello\r");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["message"], "hello");
        assert_eq!(json["line"], 3);
        for key in ["timestamp", "process", "level", "message", "line"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
