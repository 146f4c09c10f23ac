// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_orchestrator_core::domain::config::Config;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file, then AEGIS_* env overrides).
    Show {
        /// Show the discovery paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = Config::load_or_default(config_override.clone()).context("failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AEGIS_CONFIG_PATH: {}",
            std::env::var("AEGIS_CONFIG_PATH").unwrap_or_else(|_| "(not set)".to_string()).dimmed()
        );
        println!("  3. ./aegis-config.yaml");
        println!("  4. ~/.aegis/config.yaml");
        println!("  5. /etc/aegis/config.yaml");
        println!();
    }

    println!("{}", "Security:".bold());
    println!("  Default mode: {:?}", config.security.default_mode);
    println!("  Allowed paths: {:?}", config.security.restricted.allowed_paths);
    println!("  Max file size: {} bytes", config.security.restricted.max_file_size);
    println!();

    println!("{}", "Idempotency:".bold());
    println!("  Default TTL: {}s", config.idempotency.default_ttl_seconds);
    println!("  Max records: {}", config.idempotency.max_records);
    println!();

    println!("{}", "Prompt cache:".bold());
    println!("  TTL: {}s", config.prompt_cache.ttl_seconds);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = Config::load_or_default(config_path).context("failed to load configuration")?;
    config.validate().context("configuration validation failed")?;

    println!("{}", "Configuration is valid".green());

    Ok(())
}
