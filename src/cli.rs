// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `yolo`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "yolo",
    version,
    about = "Drive concept tasks to completion: dependency ordering, parallel workers, discovery.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the scheduler config file (TOML).
    ///
    /// If the file does not exist, built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value = "Yolo.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `YOLO_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build an execution plan for the given tasks and print it.
    Plan {
        /// Seed file describing concepts, relationships and tasks.
        #[arg(long, value_name = "PATH")]
        store: String,

        /// Task ids to include (repeatable).
        #[arg(long = "task", value_name = "ID", required = true)]
        tasks: Vec<String>,

        /// Print the plan as JSON instead of a human-readable listing.
        #[arg(long)]
        json: bool,

        /// Execute the plan after printing it, confirming every step.
        #[arg(long)]
        execute: bool,
    },

    /// Run the autonomous scheduler over every pending task in the store.
    Run {
        /// Seed file describing concepts, relationships and tasks.
        #[arg(long, value_name = "PATH")]
        store: String,

        /// Only consider tasks whose concept belongs to this category.
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,

        /// Override `[scheduler].execution_budget`.
        #[arg(long, value_name = "N")]
        budget: Option<usize>,

        /// Override `[scheduler].max_concurrency`.
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },
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
