// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ad-hoc Security Gate checks, useful when tuning `RestrictedModeConfig`
//! before rolling it out to a tenant.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use aegis_orchestrator_core::application::SecurityGateService;
use aegis_orchestrator_core::domain::security_gate::{ComputerMode, RestrictedModeConfig};

#[derive(Subcommand)]
pub enum GateCommand {
    /// Check whether a file operation is allowed for a company.
    CheckFile {
        #[arg(long)]
        company: String,
        #[arg(long)]
        operation: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        size: Option<u64>,
        #[arg(long, value_enum, default_value = "restricted")]
        mode: Mode,
    },

    /// Check whether a browser navigation is allowed for a company.
    CheckBrowser {
        #[arg(long)]
        company: String,
        #[arg(long)]
        url: String,
        #[arg(long, value_enum, default_value = "restricted")]
        mode: Mode,
    },

    /// Check whether a code execution is allowed for a company.
    CheckCode {
        #[arg(long)]
        company: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        sandbox: bool,
        #[arg(long, value_enum, default_value = "restricted")]
        mode: Mode,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum Mode {
    Off,
    Restricted,
    Dev,
}

impl From<Mode> for ComputerMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Off => ComputerMode::Off,
            Mode::Restricted => ComputerMode::Restricted,
            Mode::Dev => ComputerMode::Dev,
        }
    }
}

pub fn handle_command(command: GateCommand) -> Result<()> {
    match command {
        GateCommand::CheckFile { company, operation, path, size, mode } => {
            let gate = SecurityGateService::new(RestrictedModeConfig::default(), mode.into())?;
            let result = gate.check_file_operation(&company, &operation, &path, size);
            print_result(&result.allowed, &result.reason, result.requires_confirmation);
        }
        GateCommand::CheckBrowser { company, url, mode } => {
            let gate = SecurityGateService::new(RestrictedModeConfig::default(), mode.into())?;
            let result = gate.check_browser_operation(&company, &url);
            print_result(&result.allowed, &result.reason, result.requires_confirmation);
        }
        GateCommand::CheckCode { company, code, sandbox, mode } => {
            let gate = SecurityGateService::new(RestrictedModeConfig::default(), mode.into())?;
            let result = gate.check_code_execution(&company, &code, sandbox);
            print_result(&result.allowed, &result.reason, result.requires_confirmation);
        }
    }
    Ok(())
}

fn print_result(allowed: &bool, reason: &Option<String>, requires_confirmation: bool) {
    if *allowed {
        println!("{}", "allowed".green().bold());
    } else {
        println!("{}", "denied".red().bold());
    }
    if let Some(reason) = reason {
        println!("  reason: {reason}");
    }
    if requires_confirmation {
        println!("  {}", "requires confirmation".yellow());
    }
}
