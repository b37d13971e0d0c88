use clap::{Parser, Subcommand};

/// seed — an event-sourced autonomous coding agent runtime.
#[derive(Debug, Parser)]
#[command(name = "seed", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the master process in the foreground (headless).
    Serve,
    /// Report whether a master is running and summarize task state.
    Status,
    /// Ask a running master to shut down gracefully.
    Stop,
}
