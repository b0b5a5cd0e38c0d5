use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use tether_types::{TetherError, TetherResult};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use super::types::LogEntry;

// Upper bound on bytes consumed per poll.
const MAX_READ_CHUNK: u64 = 1024 * 1024;

pub(crate) struct Subscriber {
    pub tx: mpsc::Sender<LogEntry>,
    pub last_delivered: u64,
    pub dropped: u64,
}

#[derive(Default)]
pub(crate) struct CursorState {
    pub offset: u64,
    pub line_count: u64,
    pub partial: Vec<u8>,
    pub subscribers: HashMap<Uuid, Subscriber>,
    pub primed: bool,
}

pub(crate) struct LogCursor {
    pub slug: String,
    pub path: PathBuf,
    pub state: tokio::sync::Mutex<CursorState>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollReport {
    pub new_lines: u64,
    pub dropped: u64,
}

impl LogCursor {
    pub fn new(slug: &str, path: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            slug: slug.to_string(),
            path,
            state: tokio::sync::Mutex::new(CursorState::default()),
            cancel,
        }
    }

    async fn file_len(&self) -> TetherResult<Option<u64>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TetherError::LogAccess(format!("{:?}: {}", self.path, e))),
        }
    }

    async fn read_range(&self, from: u64, to: u64) -> TetherResult<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| TetherError::LogAccess(format!("{:?}: {}", self.path, e)))?;
        file.seek(SeekFrom::Start(from)).await?;
        let mut buf = Vec::with_capacity((to - from) as usize);
        file.take(to - from).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Counts the lines already in the file so live numbering continues after them.
    /// Must be called with the state lock held before the first poll or replay.
    pub async fn prime(&self, state: &mut CursorState) -> TetherResult<()> {
        if state.primed {
            return Ok(());
        }
        let len = self.file_len().await?.unwrap_or(0);
        if len > 0 {
            let data = self.read_range(0, len).await?;
            let complete = data.iter().rposition(|&b| b == b'\n').map(|i| i + 1).unwrap_or(0);
            state.line_count = data[..complete].iter().filter(|&&b| b == b'\n').count() as u64;
            state.offset = complete as u64;
        }
        state.primed = true;
        Ok(())
    }

    /// Complete lines currently in the file, numbered, that come after `from_line`.
    pub async fn replay(&self, state: &CursorState, from_line: u64) -> TetherResult<Vec<LogEntry>> {
        if state.offset == 0 {
            return Ok(Vec::new());
        }
        let data = self.read_range(0, state.offset).await?;
        let text = String::from_utf8_lossy(&data);
        let in_file = text.matches('\n').count() as u64;
        let first = state.line_count.saturating_sub(in_file) + 1;

        Ok(text
            .split_terminator('\n')
            .enumerate()
            .map(|(i, raw)| (first + i as u64, raw))
            .filter(|(n, _)| *n > from_line)
            .map(|(n, raw)| LogEntry::from_line(&self.slug, n, raw))
            .collect())
    }

    /// Reads newly appended bytes and fans complete lines out to subscribers.
    pub async fn poll(&self) -> TetherResult<PollReport> {
        let mut state = self.state.lock().await;
        self.prime(&mut state).await?;

        let len = self.file_len().await?.unwrap_or(0);
        if len < state.offset {
            debug!(target_slug = %self.slug, "Log file shrank from {} to {}, restarting from the top", state.offset, len);
            state.offset = 0;
            state.partial.clear();
        }
        if len == state.offset {
            return Ok(PollReport::default());
        }

        let to = len.min(state.offset + MAX_READ_CHUNK);
        let bytes = self.read_range(state.offset, to).await?;
        state.offset += bytes.len() as u64;

        let mut buf = std::mem::take(&mut state.partial);
        buf.extend_from_slice(&bytes);
        let complete = buf.iter().rposition(|&b| b == b'\n').map(|i| i + 1).unwrap_or(0);
        state.partial = buf.split_off(complete);

        let mut report = PollReport::default();
        for raw in String::from_utf8_lossy(&buf).split_terminator('\n') {
            state.line_count += 1;
            report.new_lines += 1;
            let entry = LogEntry::from_line(&self.slug, state.line_count, raw);
            report.dropped += fan_out(&mut state.subscribers, entry);
        }

        trace!(target_slug = %self.slug, "Read {} new line(s)", report.new_lines);
        Ok(report)
    }
}

// Never blocks: a full queue loses the line, a closed queue loses the subscriber.
fn fan_out(subscribers: &mut HashMap<Uuid, Subscriber>, entry: LogEntry) -> u64 {
    let line = entry.line;
    let mut dropped = 0;
    subscribers.retain(|id, sub| {
        if sub.last_delivered >= line {
            return true;
        }
        match sub.tx.try_send(entry.clone()) {
            Ok(()) => {
                sub.last_delivered = line;
                true
            }
            Err(TrySendError::Full(_)) => {
                sub.last_delivered = line;
                sub.dropped += 1;
                dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Subscriber {} went away", id);
                false
            }
        }
    });
    dropped
}
