// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS admin CLI
//!
//! `aegis` is a local administration tool for the tool execution
//! substrate: it inspects and edits a tool manifest's grants, probes the
//! Security Gate against candidate operations, drives a single request
//! through the full Orchestrator, and shows/validates configuration.
//! It does not run a daemon and carries no transport of its own — every
//! command constructs a fresh in-process substrate over the manifest file
//! it's pointed at.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_orchestrator::commands::{self, ConfigCommand, GateCommand, InvokeArgs, RegistryCommand};

#[derive(Parser)]
#[command(name = "aegis")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the tool manifest (tools + grants)
    #[arg(long, global = true, env = "AEGIS_MANIFEST_PATH", default_value = "./aegis-tools.yaml")]
    manifest: PathBuf,

    /// Path to the configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "AEGIS_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit the Plugin Registry's manifest
    #[command(name = "registry")]
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },

    /// Probe the Security Gate against a candidate operation
    #[command(name = "gate")]
    Gate {
        #[command(subcommand)]
        command: GateCommand,
    },

    /// Drive one request through the Orchestrator
    #[command(name = "invoke")]
    Invoke {
        #[command(flatten)]
        args: InvokeArgs,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Registry { command }) => commands::registry::handle_command(command, cli.manifest),
        Some(Commands::Gate { command }) => commands::gate::handle_command(command),
        Some(Commands::Invoke { args }) => commands::invoke::handle_command(args, cli.manifest, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
