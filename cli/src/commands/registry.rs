// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plugin Registry inspection and grant management, backed by a local tool
//! manifest file (see `crate::manifest`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use crate::manifest::{build_registry, Manifest};

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// List tools, optionally scoped to what a user is granted.
    List {
        /// Show only the tools granted to this user (system grants included).
        #[arg(long)]
        user: Option<String>,
    },

    /// Grant a user access to a tool.
    Grant {
        #[arg(long)]
        user: String,
        #[arg(long)]
        tool: String,
    },

    /// Revoke a user's access to a tool.
    Revoke {
        #[arg(long)]
        user: String,
        #[arg(long)]
        tool: String,
    },
}

pub fn handle_command(command: RegistryCommand, manifest_path: PathBuf) -> Result<()> {
    match command {
        RegistryCommand::List { user } => list(manifest_path, user),
        RegistryCommand::Grant { user, tool } => grant(manifest_path, &user, &tool),
        RegistryCommand::Revoke { user, tool } => revoke(manifest_path, &user, &tool),
    }
}

fn list(manifest_path: PathBuf, user: Option<String>) -> Result<()> {
    let manifest = Manifest::load(&manifest_path).context("failed to load tool manifest")?;
    let registry = build_registry(&manifest);

    let tools = match &user {
        Some(user_id) => registry.list_for_user(user_id),
        None => manifest.tools.clone(),
    };

    if tools.is_empty() {
        println!("{}", "(no tools)".dimmed());
        return Ok(());
    }

    for tool in tools {
        println!("{} {}", tool.name.bold(), format!("v{}", tool.version).dimmed());
        println!("  {}", tool.description);
        println!("  type: {}  risk: {:?}", tool.tool_type, tool.risk_level);
        for capability in &tool.capabilities {
            println!("  - {}: {}", capability.name, capability.description);
        }
    }

    Ok(())
}

fn grant(manifest_path: PathBuf, user: &str, tool: &str) -> Result<()> {
    let mut manifest = Manifest::load(&manifest_path).context("failed to load tool manifest")?;
    if !manifest.tools.iter().any(|t| t.name == tool) {
        anyhow::bail!("tool '{tool}' is not in the manifest");
    }
    manifest.grant(user, tool);
    manifest.save(&manifest_path).context("failed to write tool manifest")?;
    println!("{}", format!("granted '{tool}' to '{user}'").green());
    Ok(())
}

fn revoke(manifest_path: PathBuf, user: &str, tool: &str) -> Result<()> {
    let mut manifest = Manifest::load(&manifest_path).context("failed to load tool manifest")?;
    manifest.revoke(user, tool);
    manifest.save(&manifest_path).context("failed to write tool manifest")?;
    println!("{}", format!("revoked '{tool}' from '{user}'").green());
    Ok(())
}
