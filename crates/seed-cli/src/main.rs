mod cli;
mod config;
mod lock;
mod orchestrator;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Command};
use lock::LockFile;
use orchestrator::Orchestrator;
use seed_domain::config::ConfigSeverity;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config()?;

    match cli.command {
        Some(Command::Serve) => {
            init_tracing(&config.observability);
            run_serve(config)
        }
        Some(Command::Status) => run_status(config),
        Some(Command::Stop) => run_stop(config),
        None => {
            if let Some(lock) = LockFile::read(&config.workspace.path)? {
                if lock.is_alive(&config.workspace.path) {
                    println!("already running (pid {})", lock.pid);
                    return Ok(());
                }
            }
            init_tracing(&config.observability);
            run_serve(config)
        }
    }
}

fn init_tracing(observability: &seed_domain::config::ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(observability.log_level.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if observability.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn run_serve(config: seed_domain::config::Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
            ConfigSeverity::Error => tracing::error!("{issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("config validation failed");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let workspace_path = config.workspace.path.clone();
        let _orchestrator = Orchestrator::bootstrap(config)?;
        tracing::info!("seed orchestrator ready");

        let lock = LockFile::new();
        lock.write(&workspace_path)?;
        tracing::info!(pid = lock.pid, "wrote .seed.lock");

        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping");

        LockFile::remove(&workspace_path);
        Ok(())
    })
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn run_status(config: seed_domain::config::Config) -> anyhow::Result<()> {
    match LockFile::read(&config.workspace.path)? {
        Some(lock) if lock.is_alive(&config.workspace.path) => {
            println!("master running (pid {})", lock.pid);
        }
        Some(lock) => {
            println!("stale lock file found (pid {} is not running)", lock.pid);
        }
        None => {
            println!("not running");
        }
    }

    let state_dir = config.workspace.path.join("state");
    let log = seed_store::EventLog::open(state_dir.join("events.jsonl"))?;
    let projections = std::sync::Arc::new(seed_store::ProjectionStore::open(state_dir.join("projections.jsonl"))?);
    let tasks = seed_runtime::TaskService::new(log, projections);
    let all = tasks.list_tasks()?;

    let mut counts: std::collections::HashMap<&'static str, usize> = std::collections::HashMap::new();
    for task in &all {
        let key = match task.status {
            seed_domain::task::TaskStatus::Open => "open",
            seed_domain::task::TaskStatus::InProgress => "in_progress",
            seed_domain::task::TaskStatus::AwaitingUser => "awaiting_user",
            seed_domain::task::TaskStatus::Paused => "paused",
            seed_domain::task::TaskStatus::Done => "done",
            seed_domain::task::TaskStatus::Failed => "failed",
            seed_domain::task::TaskStatus::Canceled => "canceled",
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    let summary: Vec<String> = counts.iter().map(|(k, v)| format!("{v} {k}")).collect();
    println!("{} tasks: {}", all.len(), summary.join(", "));

    for issue in config.validate() {
        println!("{issue}");
    }

    Ok(())
}

fn run_stop(config: seed_domain::config::Config) -> anyhow::Result<()> {
    let Some(lock) = LockFile::read(&config.workspace.path)? else {
        println!("not running");
        std::process::exit(1);
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if kill(Pid::from_raw(lock.pid as i32), Signal::SIGTERM).is_err() {
            println!("process {} is not running; removing stale lock", lock.pid);
            LockFile::remove(&config.workspace.path);
            return Ok(());
        }
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while std::time::Instant::now() < deadline {
        if LockFile::read(&config.workspace.path)?.is_none() {
            println!("stopped");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("timed out waiting for master to stop");
    std::process::exit(1);
}
