//! Daemon lifecycle integration tests (Unix).

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cadence::daemon::{self, DaemonConfig, DaemonManager};
use cadence::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use cadence::task::{CollectionTask, TaskFn, TaskFuture, TaskOutcome};

fn noop_task() -> Arc<dyn CollectionTask> {
    Arc::new(TaskFn::new("noop", |_token| {
        Box::pin(async { Ok(TaskOutcome::Collected) }) as TaskFuture
    }))
}

fn daemon_config(dir: &tempfile::TempDir) -> DaemonConfig {
    DaemonConfig {
        pid_file: dir.path().join("cadence.pid"),
        log_file: dir.path().join("cadence.log"),
        redirect_stdio: false,
    }
}

#[tokio::test]
async fn test_start_daemon_manages_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = daemon_config(&dir);
    let pid_path = config.pid_file.clone();

    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::new(Duration::from_millis(
        50,
    ))));
    let manager = daemon::platform(config);

    let handle = scheduler
        .start_daemon(CancellationToken::new(), noop_task(), manager)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(scheduler.is_running());
    let recorded: u32 = std::fs::read_to_string(&pid_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(recorded, std::process::id());

    scheduler.stop().await;
    handle.await.unwrap().unwrap();

    // Teardown removed the PID file.
    assert!(!pid_path.exists());
    assert!(scheduler.snapshot().executions >= 1);
}

#[tokio::test]
async fn test_failed_second_start_keeps_live_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = daemon_config(&dir);
    let pid_path = config.pid_file.clone();

    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::new(Duration::from_millis(
        50,
    ))));
    let manager = daemon::platform(config);

    let handle = scheduler
        .start_daemon(CancellationToken::new(), noop_task(), Arc::clone(&manager))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(scheduler.is_running());

    // A second start on the same scheduler fails, and the failure must not
    // tear down the PID file of the instance that is still running.
    let second = scheduler
        .start_daemon(CancellationToken::new(), noop_task(), manager)
        .await
        .unwrap();
    let err = second.await.unwrap().unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyRunning));
    assert!(scheduler.is_running());
    assert!(pid_path.exists());

    scheduler.stop().await;
    handle.await.unwrap().unwrap();
    assert!(!pid_path.exists());
}

#[tokio::test]
async fn test_second_instance_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = daemon_config(&dir);

    // PID 1 is always alive; a second start against its PID file must fail.
    std::fs::write(&config.pid_file, "1\n").unwrap();

    let manager = daemon::platform(config);
    let err = manager.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, cadence::daemon::DaemonError::AlreadyRunning(1)));
}
