use super::*;
use crate::config::LogsConfig;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;

fn fast_config() -> LogsConfig {
    LogsConfig {
        poll_interval_ms: 20,
        ..Default::default()
    }
}

fn append(path: &std::path::Path, lines: impl IntoIterator<Item = String>) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

async fn recv(sub: &mut LogSubscription) -> LogEntry {
    tokio::time::timeout(Duration::from_secs(5), sub.receiver.recv())
        .await
        .expect("timed out waiting for log line")
        .expect("subscription closed")
}

#[tokio::test]
async fn test_replay_from_line_then_live() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LogManager::new(fast_config(), dir.path());
    let path = manager.log_path("svc");
    append(&path, (1..=30).map(|i| format!("line {}", i)));

    let mut sub = manager.tail("svc", 10).await.unwrap();
    for expected in 11..=30 {
        let entry = recv(&mut sub).await;
        assert_eq!(entry.line, expected);
        assert_eq!(entry.message, format!("line {}", expected));
        assert_eq!(entry.process, "svc");
    }

    append(&path, vec!["line 31".to_string(), "line 32".to_string()]);
    assert_eq!(recv(&mut sub).await.line, 31);
    assert_eq!(recv(&mut sub).await.line, 32);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));

    manager.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_each_subscriber_gets_each_line_once() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LogManager::new(fast_config(), dir.path());
    let path = manager.log_path("svc");
    append(&path, vec!["a".to_string()]);

    let mut first = manager.tail("svc", 0).await.unwrap();
    let mut second = manager.tail("svc", 1).await.unwrap();
    assert_eq!(recv(&mut first).await.message, "a");

    append(&path, vec!["b".to_string(), "c".to_string()]);
    for sub in [&mut first, &mut second] {
        assert_eq!(recv(sub).await.message, "b");
        assert_eq!(recv(sub).await.message, "c");
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(first.receiver.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(second.receiver.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(manager.stats().await.subscribers, 2);
}

#[tokio::test]
async fn test_partial_line_waits_for_newline() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LogManager::new(fast_config(), dir.path());
    let path = manager.log_path("svc");

    let mut sub = manager.tail("svc", 0).await.unwrap();
    {
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path).unwrap();
        write!(file, "half").unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));

    append(&path, vec![" done".to_string()]);
    let entry = recv(&mut sub).await;
    assert_eq!(entry.message, "half done");
    assert_eq!(entry.line, 1);
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogsConfig {
        subscriber_queue: 2,
        ..fast_config()
    };
    let manager = LogManager::new(config, dir.path());
    let path = manager.log_path("svc");

    let mut slow = manager.tail("svc", 0).await.unwrap();
    append(&path, (1..=10).map(|i| format!("burst {}", i)));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut fast = manager.tail("svc", 0).await.unwrap();
    let mut seen = Vec::new();
    for _ in 0..10 {
        seen.push(recv(&mut fast).await.line);
    }
    assert_eq!(seen, (1..=10).collect::<Vec<u64>>());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut delivered = 0;
    while slow.receiver.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(delivered, 2);
    assert_eq!(manager.stats().await.dropped_lines, 8);
}

#[tokio::test]
async fn test_unsubscribe_and_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LogManager::new(fast_config(), dir.path());

    let sub = manager.tail("svc", 0).await.unwrap();
    let dropped = manager.tail("other", 0).await.unwrap();
    assert_eq!(manager.stats().await.active_cursors, 2);

    assert!(manager.unsubscribe("svc", sub.id).await);
    assert!(!manager.unsubscribe("svc", sub.id).await);
    drop(dropped);

    assert_eq!(manager.cleanup().await, 2);
    assert_eq!(manager.stats().await.active_cursors, 0);
}

#[tokio::test]
async fn test_rotation_enforces_caps() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogsConfig {
        max_file_bytes: 100,
        max_total_bytes: 150,
        ..fast_config()
    };
    let manager = LogManager::new(config, dir.path());
    append(&manager.log_path("big"), (0..40).map(|i| format!("{:04}", i)));
    append(&manager.log_path("small"), (0..12).map(|i| format!("{:04}", i)));
    std::fs::write(dir.path().join("notes.txt"), "x".repeat(500)).unwrap();

    let removed = manager.rotate().await.unwrap();
    assert!(removed > 0);

    let big = std::fs::metadata(manager.log_path("big")).unwrap().len();
    let small = std::fs::metadata(manager.log_path("small")).unwrap().len();
    assert!(big <= 100);
    assert!(small <= 100);
    assert!(big + small <= 150);
    assert_eq!(std::fs::metadata(dir.path().join("notes.txt")).unwrap().len(), 500);

    let content = std::fs::read_to_string(manager.log_path("big")).unwrap();
    assert!(content.ends_with("0039\n"));
    assert!(content.lines().all(|l| l.len() == 4));
    assert_eq!(manager.stats().await.rotations, 1);
}

#[tokio::test]
async fn test_tailing_survives_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogsConfig {
        max_file_bytes: 50,
        max_total_bytes: 1000,
        ..fast_config()
    };
    let manager = Arc::new(LogManager::new(config, dir.path()));
    let path = manager.log_path("svc");
    append(&path, (1..=20).map(|i| format!("{:04}", i)));

    let mut sub = manager.tail("svc", 20).await.unwrap();
    manager.rotate().await.unwrap();

    append(&path, vec!["0021".to_string()]);
    let entry = recv(&mut sub).await;
    assert_eq!(entry.message, "0021");
    assert_eq!(entry.line, 21);

    let mut late = manager.tail("svc", 19).await.unwrap();
    assert_eq!(recv(&mut late).await.line, 20);
    assert_eq!(recv(&mut late).await.line, 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rotation_while_writing_keeps_a_contiguous_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogsConfig {
        max_file_bytes: 2048,
        max_total_bytes: 1 << 20,
        ..fast_config()
    };
    let manager = Arc::new(LogManager::new(config, dir.path()));
    let path = manager.log_path("busy");
    let total: u32 = 3000;

    let writer = {
        let locks = manager.write_locks();
        let path = path.clone();
        tokio::spawn(async move {
            for i in 0..total {
                locks.append_line("busy", &path, &format!("{:06}", i)).await.unwrap();
            }
        })
    };

    let mut rotated = 0;
    while !writer.is_finished() {
        rotated += manager.rotate().await.unwrap();
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    rotated += manager.rotate().await.unwrap();
    assert!(rotated > 0);

    let content = std::fs::read_to_string(&path).unwrap();
    let numbers: Vec<u32> = content.lines().map(|l| l.parse().unwrap()).collect();
    assert!(!numbers.is_empty());
    assert_eq!(*numbers.last().unwrap(), total - 1);
    assert!(numbers.windows(2).all(|w| w[1] == w[0] + 1));
}

#[tokio::test]
async fn test_read_helpers_on_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LogManager::new(fast_config(), dir.path());
    assert!(manager.read_tail("ghost", 1024).await.unwrap().is_none());
    assert!(manager.last_modified("ghost").await.unwrap().is_none());

    append(&manager.log_path("ghost"), vec!["0123456789".to_string()]);
    assert_eq!(manager.read_tail("ghost", 5).await.unwrap().unwrap(), "6789\n");
    assert!(manager.last_modified("ghost").await.unwrap().is_some());
}

#[tokio::test]
async fn test_tail_after_shutdown_is_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LogManager::new(fast_config(), dir.path());
    manager.shutdown(Duration::from_secs(1)).await;
    assert!(matches!(
        manager.tail("svc", 0).await,
        Err(tether_types::TetherError::Cancelled)
    ));
}
