use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Per-target locks shared by output pumps and rotation. Rotation replaces the file, so an
/// append that is not excluded from it would land in the replaced inode.
#[derive(Debug, Default)]
pub struct LogWriteLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LogWriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(slug.to_string()).or_default())
    }

    pub async fn append_line(&self, slug: &str, path: &Path, line: &str) -> std::io::Result<()> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;
        append_line(path, line).await
    }
}

// Reopened per write so a rotated (replaced) file is picked up immediately.
async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf).await
}
