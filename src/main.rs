//! Cadence binary entry point.
//!
//! Thin embedding layer around the `cadence` library: loads configuration,
//! supplies the collection operation (an external command run once per cycle),
//! and wires OS shutdown signals to the scheduler's stop path.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence::config::{AppConfig, CommandConfig, parse_duration};
use cadence::daemon::{self, DaemonConfig, PidFile};
use cadence::scheduler::Scheduler;
use cadence::task::{CollectionTask, TaskError, TaskOutcome};

/// Cadence - continuously-running data-collection driver.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "cadence.yaml",
        env = "CADENCE_CONFIG"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the collection loop
    Run {
        /// Detach and run as a background service
        #[arg(long)]
        daemon: bool,

        /// Tick interval (overrides config file, e.g. "5m")
        #[arg(long, env = "CADENCE_INTERVAL")]
        interval: Option<String>,

        /// Maximum execution count (overrides config file; 0 = unbounded)
        #[arg(long)]
        max_executions: Option<u64>,

        /// Stop after the first failed execution
        #[arg(long)]
        fail_fast: bool,
    },

    /// Report whether a collector instance is running
    Status,

    /// Signal a running instance to stop (Unix only)
    Stop,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            daemon,
            interval,
            max_executions,
            fail_fast,
        } => {
            if daemon {
                config.scheduler.daemon = true;
            }
            if let Some(interval) = interval {
                config.scheduler.interval = parse_duration(&interval)?;
            }
            if let Some(max) = max_executions {
                config.scheduler.max_executions = max;
            }
            if fail_fast {
                config.scheduler.continue_on_error = false;
            }
            config.validate()?;
            run(config).await
        }
        Commands::Status => status(&config),
        Commands::Stop => stop(&config),
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,cadence=debug".into());

    let manager = config.scheduler.daemon.then(|| {
        daemon::platform(DaemonConfig {
            pid_file: config.scheduler.pid_file.clone(),
            log_file: config.scheduler.log_file.clone(),
            redirect_stdio: true,
        })
    });

    // In daemon mode the tracing layer writes to the configured log file; the
    // manager also points the raw stdout/stderr descriptors there on start.
    match &manager {
        Some(manager) => {
            let log = Arc::new(manager.setup_logging()?);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(log),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    tracing::info!(
        program = %config.command.program,
        interval = %humantime::format_duration(config.scheduler.interval),
        daemon = config.scheduler.daemon,
        "Starting collection driver"
    );

    let task: Arc<dyn CollectionTask> = Arc::new(CommandTask::new(config.command.clone()));
    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone()));
    let lifetime = CancellationToken::new();

    let result = match manager {
        Some(manager) => {
            let handle = scheduler.start_daemon(lifetime, task, manager).await?;
            handle.await?
        }
        None => {
            spawn_shutdown_listener(Arc::clone(&scheduler));
            scheduler.start(lifetime, task).await
        }
    };

    let snapshot = scheduler.snapshot();
    tracing::info!(
        executions = snapshot.executions,
        failures = snapshot.failures,
        success_rate = format!("{:.1}%", snapshot.success_rate),
        "Collection driver finished"
    );

    result?;
    Ok(())
}

fn status(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pid_file = PidFile::new(&config.scheduler.pid_file);
    let report = match pid_file.probe() {
        Some(pid) => serde_json::json!({ "running": true, "pid": pid }),
        None => serde_json::json!({ "running": false }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(unix)]
fn stop(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pid_file = PidFile::new(&config.scheduler.pid_file);
    match pid_file.probe() {
        Some(pid) => {
            nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            )?;
            println!("Sent SIGTERM to pid {pid}");
            Ok(())
        }
        None => {
            println!("No running instance found");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
fn stop(_config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    Err("stop is only supported on Unix; use the service manager instead".into())
}

/// Map Ctrl+C / SIGTERM onto a graceful scheduler stop in foreground mode.
fn spawn_shutdown_listener(scheduler: Arc<Scheduler>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C"),
            _ = terminate => tracing::info!("Received terminate signal"),
        }

        scheduler.stop().await;
    });
}

/// Collection task that runs an external command each cycle.
///
/// A zero exit status counts as a collected cycle; a non-zero status is a
/// transient failure left to the scheduler's retry policy.
struct CommandTask {
    config: CommandConfig,
}

impl CommandTask {
    fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl CollectionTask for CommandTask {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn run(&self, token: &CancellationToken) -> Result<TaskOutcome, TaskError> {
        let mut command = tokio::process::Command::new(&self.config.program);
        command.args(&self.config.args);
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            TaskError::Failed(format!("failed to spawn {}: {e}", self.config.program))
        })?;

        let status = tokio::select! {
            _ = token.cancelled() => {
                let _ = child.kill().await;
                return Err(TaskError::Cancelled);
            }
            status = wait_with_timeout(&mut child, self.config.timeout) => status?,
        };

        if status.success() {
            Ok(TaskOutcome::Collected)
        } else {
            Err(TaskError::Failed(format!(
                "{} exited with {status}",
                self.config.program
            )))
        }
    }
}

async fn wait_with_timeout(
    child: &mut tokio::process::Child,
    limit: Option<Duration>,
) -> Result<std::process::ExitStatus, TaskError> {
    match limit {
        None => child
            .wait()
            .await
            .map_err(|e| TaskError::Failed(format!("failed to wait for command: {e}"))),
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => {
                status.map_err(|e| TaskError::Failed(format!("failed to wait for command: {e}")))
            }
            Err(_) => {
                let _ = child.kill().await;
                Err(TaskError::Failed(format!(
                    "command timed out after {}",
                    humantime::format_duration(limit)
                )))
            }
        },
    }
}
