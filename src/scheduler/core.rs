//! Scheduler state machine and tick loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::daemon::{DaemonError, DaemonManager};
use crate::health::HealthMonitor;
use crate::scheduler::backoff::BackoffStrategy;
use crate::scheduler::config::SchedulerConfig;
use crate::scheduler::executor::{CommandExecutor, ExecutorError};
use crate::scheduler::metrics::{Metrics, MetricsSnapshot};
use crate::task::{CollectionTask, TaskOutcome};

/// How long [`Scheduler::stop`] waits for loop-exit confirmation.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Errors surfaced by the scheduler lifecycle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called while the loop is running.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// `start` was called on an instance that has already stopped. A scheduler
    /// is not restartable; create a fresh instance.
    #[error("scheduler has already stopped")]
    Stopped,

    /// Configuration invariant violated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The lifetime was cancelled or its deadline elapsed.
    #[error("lifetime cancelled or deadline elapsed")]
    Cancelled,

    /// An execution exhausted its retries and `continue_on_error` is off.
    #[error("collection failed: {0}")]
    Task(#[source] ExecutorError),

    /// Daemon setup or teardown failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopped,
}

/// Owns the tick loop, lifecycle, and overall failure policy.
///
/// Executions are strictly sequential: a new one never starts until the
/// previous executor call returns, so collaborators need no per-execution
/// locking of their own state.
pub struct Scheduler {
    config: SchedulerConfig,
    metrics: Arc<Metrics>,
    state: Mutex<State>,
    stop_token: CancellationToken,
    running_tx: watch::Sender<bool>,
}

impl Scheduler {
    /// Create an idle scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        let (running_tx, _) = watch::channel(false);
        Self {
            config,
            metrics: Arc::new(Metrics::new()),
            state: Mutex::new(State::Idle),
            stop_token: CancellationToken::new(),
            running_tx,
        }
    }

    /// The shared execution metrics handle.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Snapshot of the execution metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether `start` has been called and has not yet returned.
    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Run the tick loop until a terminal condition.
    ///
    /// Executes the task once immediately, then once per tick of the
    /// configured interval. Returns when the lifetime is cancelled or its
    /// `max_runtime` deadline elapses (as [`SchedulerError::Cancelled`]), when
    /// `max_executions` is reached (success), when [`Scheduler::stop`] is
    /// requested (success), or when an execution fails with
    /// `continue_on_error` disabled.
    pub async fn start(
        &self,
        lifetime: CancellationToken,
        task: Arc<dyn CollectionTask>,
    ) -> Result<(), SchedulerError> {
        self.config.validate()?;
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                State::Idle => *state = State::Running,
                State::Running => return Err(SchedulerError::AlreadyRunning),
                State::Stopped => return Err(SchedulerError::Stopped),
            }
        }
        self.running_tx.send_replace(true);

        // One token combines the lifetime, its optional deadline, and stop
        // requests; it is what the executor and the task observe.
        let loop_token = CancellationToken::new();
        let watcher = {
            let loop_token = loop_token.clone();
            let lifetime = lifetime.clone();
            let stop = self.stop_token.clone();
            let max_runtime = self.config.max_runtime;
            tokio::spawn(async move {
                let deadline = async {
                    if max_runtime.is_zero() {
                        std::future::pending::<()>().await;
                    } else {
                        tokio::time::sleep(max_runtime).await;
                        tracing::info!(?max_runtime, "Maximum runtime elapsed");
                    }
                };
                tokio::select! {
                    _ = lifetime.cancelled() => {}
                    _ = stop.cancelled() => {}
                    _ = deadline => {}
                }
                loop_token.cancel();
            })
        };

        let monitor = HealthMonitor::new(self.config.health_check_interval, self.metrics());
        let monitor_handle = {
            let token = loop_token.clone();
            tokio::spawn(async move { monitor.run(token).await })
        };

        tracing::info!(
            task = %task.name(),
            interval = ?self.config.interval,
            max_executions = self.config.max_executions,
            continue_on_error = self.config.continue_on_error,
            "Scheduler started"
        );

        let result = self.run_loop(&loop_token, task.as_ref()).await;

        loop_token.cancel();
        watcher.abort();
        let _ = monitor_handle.await;

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = State::Stopped;
        self.running_tx.send_replace(false);

        match result {
            // A stop request ends the loop without error; genuine lifetime
            // cancellation is reported as such.
            Err(SchedulerError::Cancelled) if self.stop_token.is_cancelled() => {
                tracing::info!("Scheduler stopped on request");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Scheduler loop ended with error");
                Err(e)
            }
            Ok(()) => {
                tracing::info!("Scheduler loop completed");
                Ok(())
            }
        }
    }

    /// Request the loop to end at its next decision point and wait up to
    /// [`STOP_GRACE_PERIOD`] for confirmation. Idempotent; does not kill an
    /// in-flight execution.
    pub async fn stop(&self) {
        self.stop_token.cancel();
        let mut rx = self.running_tx.subscribe();
        let confirmed = tokio::time::timeout(STOP_GRACE_PERIOD, rx.wait_for(|running| !*running))
            .await
            .is_ok();
        if confirmed {
            tracing::debug!("Scheduler loop exit confirmed");
        } else {
            tracing::warn!(
                grace = ?STOP_GRACE_PERIOD,
                "Timed out waiting for scheduler loop to exit"
            );
        }
    }

    /// Set up the daemon context, then run the loop on a background task,
    /// tearing the daemon down when the loop exits.
    ///
    /// Shutdown signals wired by the daemon manager feed the same stop path as
    /// [`Scheduler::stop`].
    pub async fn start_daemon(
        self: &Arc<Self>,
        lifetime: CancellationToken,
        task: Arc<dyn CollectionTask>,
        daemon: Arc<dyn DaemonManager>,
    ) -> Result<tokio::task::JoinHandle<Result<(), SchedulerError>>, SchedulerError> {
        daemon.start(self.stop_token.clone()).await?;

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = scheduler.start(lifetime, task).await;
            match &result {
                // The loop never ran; the daemon context, PID file included,
                // still belongs to the instance that is running.
                Err(SchedulerError::AlreadyRunning) | Err(SchedulerError::Stopped) => {}
                _ => {
                    if let Err(e) = daemon.stop().await {
                        tracing::error!(error = %e, "Daemon teardown failed");
                    }
                }
            }
            result
        });
        Ok(handle)
    }

    async fn run_loop(
        &self,
        token: &CancellationToken,
        task: &dyn CollectionTask,
    ) -> Result<(), SchedulerError> {
        let mut executor = CommandExecutor::new(
            self.config.retry_count,
            BackoffStrategy::from_config(
                self.config.backoff,
                self.config.backoff_base,
                self.config.backoff_max,
            ),
        );

        // First execution happens immediately, before any tick.
        self.run_cycle(&mut executor, token, task).await?;

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the interval's immediate first tick.
        ticker.tick().await;

        loop {
            if self.max_executions_reached() {
                tracing::info!(
                    executions = self.metrics.snapshot().executions,
                    "Reached maximum execution count"
                );
                return Ok(());
            }
            tokio::select! {
                _ = token.cancelled() => return Err(SchedulerError::Cancelled),
                _ = ticker.tick() => {
                    self.run_cycle(&mut executor, token, task).await?;
                }
            }
        }
    }

    async fn run_cycle(
        &self,
        executor: &mut CommandExecutor,
        token: &CancellationToken,
        task: &dyn CollectionTask,
    ) -> Result<(), SchedulerError> {
        let started = Instant::now();
        let result = executor.execute_with_retry(token, task).await;
        let duration = started.elapsed();

        match result {
            Ok(outcome) => {
                self.metrics.record(duration, true);
                match outcome {
                    TaskOutcome::NoNewData if self.config.skip_if_no_new_data => {
                        tracing::debug!(task = %task.name(), "No new data, cycle skipped");
                    }
                    _ => {
                        tracing::debug!(
                            task = %task.name(),
                            duration_ms = duration.as_millis() as u64,
                            "Cycle completed"
                        );
                    }
                }
                Ok(())
            }
            Err(ExecutorError::Cancelled) => Err(SchedulerError::Cancelled),
            Err(e) => {
                self.metrics.record(duration, false);
                if self.config.continue_on_error {
                    tracing::error!(task = %task.name(), error = %e, "Cycle failed, continuing");
                    Ok(())
                } else {
                    Err(SchedulerError::Task(e))
                }
            }
        }
    }

    fn max_executions_reached(&self) -> bool {
        self.config.max_executions > 0
            && self.metrics.snapshot().executions >= self.config.max_executions
    }
}
