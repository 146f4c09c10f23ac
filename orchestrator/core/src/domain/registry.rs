// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Value types the Plugin Registry resolves and stores.
//! The concurrent map/grant-set/rate-limiter machinery lives in
//! [`crate::infrastructure::registry`]; this module is the pure data shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::errors::ErrorCode;
use crate::domain::result::{ConfirmationPolicy, RiskLevel};
use crate::domain::security_gate::ComputerMode;

/// A single capability exposed by a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
    #[serde(default)]
    pub examples: Vec<Value>,
}

/// An opaque pointer to a secret an executor needs at invocation time. The
/// secret's value is never held here — only the vault's lookup key and an
/// optional field within it, mirroring the original `RemoteToolProxy`'s
/// bearer-token indirection without ever importing a credential into this
/// crate's memory space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub secret_id: String,
    pub field: Option<String>,
}

/// Registered once per plugin at load time; persists for the process
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub tool_type: String,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub risk_level: RiskLevel,
    pub requires_confirmation: bool,
    pub confirmation_policy: ConfirmationPolicy,
    #[serde(default)]
    pub side_effects: Vec<String>,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub idempotent_capabilities: Vec<String>,
    pub computer_mode: Option<ComputerMode>,
    #[serde(default)]
    pub credential: Option<CredentialRef>,
}

impl ToolMetadata {
    pub fn capability(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn is_idempotent_capability(&self, name: &str) -> bool {
        self.idempotent_capabilities.iter().any(|c| c == name)
    }
}

/// Sentinel user whose granted tools are available to every user: effective
/// set = `user ∪ system`.
pub const SYSTEM_USER: &str = "system";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("tool '{0}' is not registered")]
    UnknownTool(String),

    #[error("tool '{tool_name}' has no capability '{capability_name}'")]
    UnknownCapability {
        tool_name: String,
        capability_name: String,
    },

    #[error("user '{user_id}' is not granted tool '{tool_name}'")]
    Unauthorized { user_id: String, tool_name: String },

    #[error("rate limit exceeded for tool '{tool_name}', user '{user_id}'; retry after {retry_after_ms}ms")]
    RateLimited {
        tool_name: String,
        user_id: String,
        retry_after_ms: u64,
    },
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::DuplicateTool(_) => ErrorCode::InvalidEnvelope,
            RegistryError::UnknownTool(_) => ErrorCode::UnknownTool,
            RegistryError::UnknownCapability { .. } => ErrorCode::UnknownCapability,
            RegistryError::Unauthorized { .. } => ErrorCode::Unauthorized,
            RegistryError::RateLimited { .. } => ErrorCode::RateLimited,
        }
    }
}
