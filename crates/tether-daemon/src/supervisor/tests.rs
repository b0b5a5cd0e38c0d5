use super::types::MAX_TRACKED_RESTARTS;
use super::*;
use crate::config::SupervisorConfig;
use crate::health::{ProcessView, RecoveryHandler};
use crate::registry::{FileRegistry, TargetRegistry};
use std::sync::Arc;
use std::time::Duration;
use tether_types::{LaunchSpec, RemoteSpec, RestartPolicy, Target, TetherError};

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        stop_grace_secs: 2,
        restart_backoff_base_ms: 10,
        restart_backoff_max_ms: 50,
        check_interval_secs: 1,
        ..Default::default()
    }
}

fn sh(script: &str) -> LaunchSpec {
    LaunchSpec::new("sh").arg("-c").arg(script)
}

fn supervisor_with(
    targets: Vec<Target>,
    config: SupervisorConfig,
) -> (Arc<ProcessSupervisor>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let registry: Arc<dyn TargetRegistry> = Arc::new(FileRegistry::with_targets(targets).unwrap());
    let supervisor = Arc::new(ProcessSupervisor::new(config, dir.path(), registry));
    (supervisor, dir)
}

async fn wait_until<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[test]
fn test_restart_window_counts_without_pruning() {
    let mut window = RestartWindow::default();
    window.record();
    std::thread::sleep(Duration::from_millis(80));
    window.record();

    assert_eq!(window.restarts_in_last(Duration::from_millis(50)), 1);
    assert_eq!(window.len(), 2);
    assert_eq!(window.restarts_in_last(Duration::from_secs(60)), 2);

    assert_eq!(window.prune(Duration::from_millis(50)), 1);
    assert_eq!(window.len(), 1);
}

#[test]
fn test_restart_window_is_capped() {
    let mut window = RestartWindow::default();
    for _ in 0..(MAX_TRACKED_RESTARTS + 20) {
        window.record();
    }
    assert_eq!(window.len(), MAX_TRACKED_RESTARTS);
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_twice_is_already_running() {
    let (supervisor, _dir) =
        supervisor_with(vec![Target::local_stdio("sleeper", LaunchSpec::new("sleep").arg("30"))], fast_config());

    let pid = supervisor.start("sleeper").await.unwrap();
    assert!(pid > 0);
    assert_eq!(
        supervisor.start("sleeper").await.unwrap_err(),
        TetherError::AlreadyRunning("sleeper".into())
    );

    let info = supervisor.process_info("sleeper").unwrap();
    assert_eq!(info.state, ProcessState::Running);
    assert_eq!(info.pid, Some(pid));
    assert!(supervisor.process_status("sleeper").running);

    supervisor.stop("sleeper", None).await.unwrap();
    assert_eq!(supervisor.process_info("sleeper").unwrap().state, ProcessState::Stopped);
    assert!(!supervisor.process_status("sleeper").running);
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_when_not_running() {
    let (supervisor, _dir) =
        supervisor_with(vec![Target::local_stdio("idle", LaunchSpec::new("sleep").arg("30"))], fast_config());
    assert_eq!(
        supervisor.stop("idle", None).await.unwrap_err(),
        TetherError::NotRunning("idle".into())
    );
}

#[tokio::test]
async fn test_unknown_and_remote_targets_rejected() {
    let remote = Target::remote(
        "gh",
        RemoteSpec {
            provider: "github".into(),
            endpoint: "https://api.github.com/user".into(),
            auth: Default::default(),
            credential_ref: None,
        },
    );
    let (supervisor, _dir) = supervisor_with(vec![remote], fast_config());

    assert_eq!(
        supervisor.start("ghost").await.unwrap_err(),
        TetherError::UnknownTarget("ghost".into())
    );
    assert!(matches!(supervisor.start("gh").await, Err(TetherError::Config(_))));
    assert!(supervisor.process_info("gh").is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_graceful_stop_escalates_to_kill() {
    let (supervisor, _dir) = supervisor_with(
        vec![Target::local_stdio("stubborn", sh("trap '' TERM; while true; do sleep 1; done"))],
        fast_config(),
    );
    supervisor.start("stubborn").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    supervisor
        .stop("stubborn", Some(Duration::from_millis(300)))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!supervisor.process_status("stubborn").running);
}

#[tokio::test]
async fn test_failed_restart_still_records_attempt() {
    let (supervisor, _dir) = supervisor_with(
        vec![Target::local_stdio("broken", LaunchSpec::new("/nonexistent/tether-test-binary"))],
        fast_config(),
    );

    assert!(matches!(supervisor.restart("broken").await, Err(TetherError::Process(_))));
    assert_eq!(supervisor.restarts_in_last("broken", Duration::from_secs(60)), 1);

    let info = supervisor.process_info("broken").unwrap();
    assert_eq!(info.total_restarts, 1);
    assert!(info.last_error.is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn test_output_is_written_to_log_file() {
    let (supervisor, dir) = supervisor_with(
        vec![Target::local_stdio("chatty", sh("echo hello from stdout; echo oops >&2; sleep 30"))],
        fast_config(),
    );
    supervisor.start("chatty").await.unwrap();

    let path = dir.path().join("chatty.log");
    let written = wait_until(
        || {
            std::fs::read_to_string(&path)
                .map(|s| s.contains("hello from stdout") && s.contains("oops"))
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(written);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_crashed_process_restarted_by_policy() {
    let mut launch = sh("sleep 0.1; exit 3");
    launch.restart_policy = RestartPolicy::OnFailure;
    let (supervisor, _dir) = supervisor_with(vec![Target::local_stdio("crashy", launch)], fast_config());

    supervisor.start("crashy").await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    supervisor.supervise_once().await;

    let restarted = wait_until(
        || supervisor.process_info("crashy").map(|i| i.total_restarts >= 1).unwrap_or(false),
        Duration::from_secs(5),
    )
    .await;
    assert!(restarted);

    let info = supervisor.process_info("crashy").unwrap();
    assert_eq!(info.last_exit_code, Some(3));
    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_clean_exit_not_restarted_on_failure_policy() {
    let (supervisor, _dir) =
        supervisor_with(vec![Target::local_stdio("oneshot", sh("exit 0"))], fast_config());

    supervisor.start("oneshot").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    supervisor.supervise_once().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let info = supervisor.process_info("oneshot").unwrap();
    assert_eq!(info.state, ProcessState::Stopped);
    assert_eq!(info.total_restarts, 0);
    assert_eq!(info.last_exit_code, Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn test_auto_restart_refused_when_rate_exceeded() {
    let config = SupervisorConfig {
        max_restarts_in_window: 2,
        ..fast_config()
    };
    let (supervisor, _dir) =
        supervisor_with(vec![Target::local_stdio("flappy", LaunchSpec::new("sleep").arg("30"))], config);

    supervisor.auto_restart("flappy", "test").await.unwrap();
    supervisor.auto_restart("flappy", "test").await.unwrap();

    let err = supervisor.auto_restart("flappy", "test").await.unwrap_err();
    assert!(matches!(err, TetherError::Process(_)));

    let info = supervisor.process_info("flappy").unwrap();
    assert_eq!(info.restarts_in_window, 2);
    assert!(info.last_error.unwrap().contains("restart rate exceeded"));
    assert_eq!(supervisor.stats().rate_limited_restarts, 1);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_short_health_window_does_not_reset_restart_cap() {
    let config = SupervisorConfig {
        max_restarts_in_window: 2,
        ..fast_config()
    };
    let (supervisor, _dir) =
        supervisor_with(vec![Target::local_stdio("flappy", LaunchSpec::new("sleep").arg("30"))], config);

    supervisor.auto_restart("flappy", "test").await.unwrap();
    supervisor.auto_restart("flappy", "test").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let view: &dyn ProcessView = supervisor.as_ref();
    assert_eq!(view.restarts_in_last("flappy", Duration::from_millis(1)), 0);

    let err = supervisor.auto_restart("flappy", "test").await.unwrap_err();
    assert!(matches!(err, TetherError::Process(_)));
    assert_eq!(supervisor.restarts_in_last("flappy", Duration::from_secs(600)), 2);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_during_restart_leaves_nothing_running() {
    let (supervisor, _dir) = supervisor_with(
        vec![Target::local_stdio("stubborn", sh("trap '' TERM; while true; do sleep 1; done"))],
        fast_config(),
    );
    supervisor.start("stubborn").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let restarting = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.restart("stubborn").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();

    assert_eq!(restarting.await.unwrap().unwrap_err(), TetherError::Cancelled);
    assert!(!supervisor.process_status("stubborn").running);
    assert_eq!(supervisor.stats().running, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_recovery_handler_restarts_once() {
    let (supervisor, _dir) =
        supervisor_with(vec![Target::local_http("api", LaunchSpec::new("sleep").arg("30"))], fast_config());
    supervisor.start("api").await.unwrap();

    supervisor.on_persistent_failure("api", 3).await.unwrap();

    assert_eq!(supervisor.restarts_in_last("api", Duration::from_secs(600)), 1);
    assert!(supervisor.process_status("api").running);
    assert_eq!(supervisor.stats().total_restarts, 1);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_autostart_and_shutdown() {
    let targets = vec![
        Target::local_stdio("a", LaunchSpec::new("sleep").arg("30")).with_autostart(true),
        Target::local_stdio("b", LaunchSpec::new("sleep").arg("30")).with_autostart(true),
        Target::local_stdio("c", LaunchSpec::new("sleep").arg("30")),
    ];
    let (supervisor, _dir) = supervisor_with(targets, fast_config());

    assert_eq!(supervisor.start_autostart().await, 2);
    let stats = supervisor.stats();
    assert_eq!(stats.total_targets, 3);
    assert_eq!(stats.running, 2);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(supervisor.stats().running, 0);
    assert!(supervisor.is_shutting_down());
    assert_eq!(supervisor.start("c").await.unwrap_err(), TetherError::Cancelled);
}
