// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `forgeloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "forgeloop",
    version,
    about = "Run a jobfile of commands under concurrency and load limits.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the jobfile (TOML).
    ///
    /// Default: `Forgeloop.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Forgeloop.toml")]
    pub config: String,

    /// Override [limits].jobs: a positive integer or "unlimited".
    #[arg(long, value_name = "N")]
    pub jobs: Option<String>,

    /// Override [limits].load_average.
    #[arg(long, value_name = "LOAD")]
    pub load_average: Option<f64>,

    /// Suppress interactive echo of job output (logs still written).
    #[arg(long)]
    pub background: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FORGELOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the job list, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
