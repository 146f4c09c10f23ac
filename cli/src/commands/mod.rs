// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the AEGIS admin CLI.

pub mod config;
pub mod gate;
pub mod invoke;
pub mod registry;

pub use self::config::ConfigCommand;
pub use self::gate::GateCommand;
pub use self::invoke::InvokeArgs;
pub use self::registry::RegistryCommand;
