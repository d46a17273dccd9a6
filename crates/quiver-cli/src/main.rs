//! Quiver CLI - Skill & Tool Execution Runtime
//!
//! Validates capability packages, exports their tools to host formats,
//! maintains tool caches, explains capability selection and runs tools
//! through the broker.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod approval_handler;
mod commands;
mod theme;

use commands::{cache, run, select, tools, validate};

/// Quiver - Skill & Tool Execution Runtime
#[derive(Parser)]
#[command(name = "quiver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (overrides configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format: pretty, compact, json or full (overrides configuration)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a capability package
    Validate {
        /// Package directory
        dir: PathBuf,
    },

    /// List a package's tools, or export them for a host
    Tools {
        /// Package directory
        dir: PathBuf,

        /// Export in this host's format (mcp, openai, anthropic)
        #[arg(long)]
        host: Option<String>,
    },

    /// Regenerate or check a package's tool cache
    Cache {
        /// Package directory
        dir: PathBuf,

        /// Report drift instead of writing; exits non-zero when stale
        #[arg(long)]
        check: bool,
    },

    /// Decide which capabilities apply to a task
    Select {
        /// Directory holding capability packages
        root: PathBuf,

        /// Task description
        #[arg(long)]
        task: String,

        /// File involved in the task (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Intent derived by the host (repeatable)
        #[arg(long = "intent")]
        intents: Vec<String>,

        /// Select this capability explicitly
        #[arg(long)]
        capability: Option<String>,

        /// Show scores and matched triggers
        #[arg(long)]
        explain: bool,
    },

    /// Run one tool through the broker and print the result envelope
    Run {
        /// Package directory
        dir: PathBuf,

        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Approve every confirmation without asking
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = quiver_config::Config::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    let config = loaded.config;

    let mut log_config = quiver_telemetry::LogConfig::from(&config.logging);
    if let Some(level) = &cli.log_level {
        level.clone_into(&mut log_config.level);
    }
    if let Some(format) = &cli.log_format {
        log_config.format = format.parse()?;
    }
    if let Err(e) = quiver_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    tracing::debug!(files = ?loaded.loaded_files, "configuration loaded");

    match cli.command {
        Commands::Validate { dir } => validate::run(&dir, &config),
        Commands::Tools { dir, host } => tools::run(&dir, host.as_deref()),
        Commands::Cache { dir, check } => cache::run(&dir, check),
        Commands::Select {
            root,
            task,
            files,
            intents,
            capability,
            explain,
        } => {
            let args = select::SelectArgs {
                task,
                files,
                intents,
                capability,
                explain,
            };
            select::run(&root, &args, &config)
        },
        Commands::Run {
            dir,
            tool,
            args,
            yes,
        } => run::run(&dir, &tool, &args, yes, &config).await,
    }
}
