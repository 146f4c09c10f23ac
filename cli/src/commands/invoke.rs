// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Drives a single request through the full Orchestrator state machine
//! against a local tool manifest, echoing its parameters back as the
//! result — a smoke test for a manifest's grants, rate limits, and
//! Security Gate interactions without a running daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use aegis_orchestrator_core::application::{AutoApprove, Orchestrator, SecurityGateService};
use aegis_orchestrator_core::domain::config::Config;
use aegis_orchestrator_core::domain::envelope::{Envelope, ToolCallContext, WireRequest};
use aegis_orchestrator_core::infrastructure::IdempotencyStore;
use aegis_orchestrator_core::infrastructure::event_bus::ToolEventBus;

use crate::manifest::{build_registry, Manifest};

#[derive(Args)]
pub struct InvokeArgs {
    #[arg(long)]
    pub tool: String,
    #[arg(long)]
    pub capability: String,
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub company: String,
    /// JSON object of parameters, e.g. '{"path": "/tmp/x"}'.
    #[arg(long, default_value = "{}")]
    pub params: String,
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_command(args: InvokeArgs, manifest_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = Manifest::load(&manifest_path).context("failed to load tool manifest")?;
    let registry = build_registry(&manifest);

    let config = Config::load_or_default(config_path).context("failed to load configuration")?;
    config.validate().context("configuration failed validation")?;

    let gate = Arc::new(SecurityGateService::new(config.security.restricted.clone(), config.security.default_mode)?);
    let idempotency = Arc::new(IdempotencyStore::new(config.idempotency.default_ttl(), config.idempotency.max_records));
    let events = ToolEventBus::new(32);
    let orchestrator = Orchestrator::new(registry, gate, idempotency, events, Arc::new(AutoApprove));

    let parameters: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&args.params).context("--params must be a JSON object")?;

    let wire = WireRequest {
        idempotency_key: None,
        correlation_id: None,
        tool_name: args.tool,
        capability_name: args.capability,
        parameters,
        context: ToolCallContext {
            company_id: args.company,
            site_id: None,
            user_id: args.user,
            role: None,
            permissions: Vec::new(),
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            metadata: Default::default(),
        },
        dry_run: args.dry_run,
        timeout_seconds: Some(30),
        priority: None,
        expires_at: None,
    };

    let envelope = Envelope::try_from_wire(wire).context("invalid request")?;
    let result = orchestrator.handle(envelope).await;

    if result.success {
        println!("{}", "ok".green().bold());
    } else {
        println!("{}", "failed".red().bold());
    }
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
