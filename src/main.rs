#![forbid(unsafe_code)]

//! `procwarden` — process-supervision server binary.
//!
//! Bootstraps configuration, starts the watchdog (if configured), and runs
//! the supervisor session loop serving commands from `procwarden-ctl`.
//!
//! The same executable doubles as the child-worker program: when re-entered
//! with the hidden `--worker CMD ARGS...` flag it runs one worker command
//! over its own stdio and exits with the command status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use procwarden::config::GlobalConfig;
use procwarden::registry::ProcessRegistry;
use procwarden::spawn::{NixSignaller, ProcessSignaller, Spawn, WorkerSpawner};
use procwarden::supervisor::dispatch::DispatchTable;
use procwarden::supervisor::{register_builtins, SupervisorContext, SupervisorSession};
use procwarden::watchdog::{Watchdog, RESET_BACKOFF_TOKEN};
use procwarden::{worker, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "procwarden", about = "process-supervision server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, required_unless_present = "worker")]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Re-enter this executable as a child worker running one command.
    #[arg(
        long,
        hide = true,
        num_args = 1..,
        allow_hyphen_values = true,
        value_name = "CMD [ARGS]..."
    )]
    worker: Option<Vec<String>>,
}

fn main() -> Result<()> {
    let mut args = Cli::parse();
    let worker_args = args.worker.take();

    init_tracing(args.log_format, worker_args.is_some())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    if let Some(worker_args) = worker_args {
        let table = worker_table();
        let code = runtime.block_on(worker::run_worker(&table, worker_args));
        std::process::exit(code);
    }

    info!("procwarden supervisor bootstrap");
    runtime.block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config_path = args
        .config
        .ok_or_else(|| AppError::Config("--config is required".into()))?;
    let config = Arc::new(GlobalConfig::load_from_path(&config_path)?);
    info!(program = %config.program_name, "configuration loaded");

    let signaller: Arc<dyn ProcessSignaller> = Arc::new(NixSignaller);
    let registry = Arc::new(ProcessRegistry::new(Box::new(NixSignaller)));

    let spawner: Arc<dyn Spawn> = match &config.worker_program {
        Some(program) => Arc::new(WorkerSpawner::new(
            program.clone(),
            config.worker_args.clone(),
        )),
        None => Arc::new(WorkerSpawner::from_current_exe(config.worker_args.clone())?),
    };

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(SupervisorContext {
        config: Arc::clone(&config),
        registry: Arc::clone(&registry),
        spawner: Arc::clone(&spawner),
        signaller: Arc::clone(&signaller),
        shutdown: shutdown.clone(),
    });

    let mut table = DispatchTable::new();
    register_builtins(&mut table, &ctx);

    let watchdog = if config.watchdog.enabled {
        let wd = Arc::new(
            Watchdog::new(
                config.watchdog.command.clone(),
                Arc::clone(&spawner),
                Arc::clone(&registry),
                Arc::clone(&signaller),
            )
            .with_shutdown(shutdown.child_token()),
        );
        wd.start()?;
        Some(wd)
    } else {
        None
    };

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    let session = SupervisorSession::new(Arc::clone(&ctx), table);
    session.run().await?;

    if let Some(wd) = watchdog {
        wd.stop().await;
    }

    info!("procwarden shut down");
    Ok(())
}

/// Commands available in child-worker mode.
///
/// `echo` writes its arguments back and relays any piped input; `heartbeat`
/// runs until signalled, emitting the backoff-reset health token on its
/// error stream every cycle.
fn worker_table() -> DispatchTable {
    let mut table = DispatchTable::new();

    table.register("echo", |args, mut streams| async move {
        for arg in &args {
            streams.out.write_all(arg.as_bytes()).await?;
            streams.out.write_all(b"\n").await?;
        }
        streams.out.flush().await?;
        tokio::io::copy(&mut streams.input, &mut streams.out).await?;
        streams.out.flush().await?;
        Ok(())
    });

    table.register("heartbeat", |_args, mut streams| async move {
        let mut cycle = 0u64;
        loop {
            tokio::time::sleep(Duration::from_secs(15)).await;
            cycle += 1;
            streams
                .err
                .write_all(format!("{RESET_BACKOFF_TOKEN}\n").as_bytes())
                .await?;
            streams.err.flush().await?;
            streams
                .out
                .write_all(format!("heartbeat cycle {cycle}\n").as_bytes())
                .await?;
            streams.out.flush().await?;
        }
    });

    table
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, worker_mode: bool) -> Result<()> {
    // Workers own their stdout/stderr pipes as command channels, so they
    // default to warn and log to stderr only.
    let default_filter = if worker_mode { "warn" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
