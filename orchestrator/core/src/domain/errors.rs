// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error taxonomy for the tool execution substrate.
//!
//! Component-local errors (`RegistryError`, `GateError`, `DispatchError`,
//! `IdempotencyError`) live next to the code that raises them. This module
//! holds the cross-cutting violation type shared by the Registry and
//! Security Gate, and the top-level [`OrchestratorError`] the application
//! layer composes them into.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::dispatch::DispatchError;
use crate::domain::idempotency::IdempotencyError;
use crate::domain::registry::RegistryError;
use crate::domain::security_gate::GateError;

/// A capability or mode check rejected a tool invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyViolation {
    #[error("tool '{tool_name}' is not allowed (allowed: {allowed_tools:?})")]
    ToolNotAllowed {
        tool_name: String,
        allowed_tools: Vec<String>,
    },

    #[error("tool '{tool_name}' is explicitly denied")]
    ToolExplicitlyDenied { tool_name: String },

    #[error("path '{}' is outside the allowed boundary", path.display())]
    PathOutsideBoundary {
        path: PathBuf,
        allowed_paths: Vec<PathBuf>,
    },

    #[error("domain '{domain}' is not in the allowed list")]
    DomainNotAllowed {
        domain: String,
        allowed_domains: Vec<String>,
    },
}

/// Stable, wire-facing error codes every failure mode maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCode {
    InvalidEnvelope,
    UnknownTool,
    UnknownCapability,
    InvalidInput,
    Unauthorized,
    PolicyDenied,
    ConfirmationTimeout,
    UserDenied,
    RateLimited,
    Timeout,
    Cancelled,
    ExecutorError,
    InvalidExecutorResponse,
    DuplicateReturned,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidEnvelope => "InvalidEnvelope",
            ErrorCode::UnknownTool => "UnknownTool",
            ErrorCode::UnknownCapability => "UnknownCapability",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::PolicyDenied => "PolicyDenied",
            ErrorCode::ConfirmationTimeout => "ConfirmationTimeout",
            ErrorCode::UserDenied => "UserDenied",
            ErrorCode::RateLimited => "RateLimited",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::Cancelled => "Cancelled",
            ErrorCode::ExecutorError => "ExecutorError",
            ErrorCode::InvalidExecutorResponse => "InvalidExecutorResponse",
            ErrorCode::DuplicateReturned => "DuplicateReturned",
        }
    }

    /// Whether a caller may retry the same request after this failure.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::Cancelled | ErrorCode::ExecutorError
        )
    }

    /// Whether this kind is written to the audit log.
    pub fn audit_logged(&self) -> bool {
        matches!(
            self,
            ErrorCode::Unauthorized | ErrorCode::PolicyDenied | ErrorCode::RateLimited | ErrorCode::ExecutorError
        )
    }
}

/// Application-boundary error composing every component-local failure.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    #[error("user denied the requested operation")]
    UserDenied,

    #[error("confirmation was not received within the timeout")]
    ConfirmationTimeout,
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::InvalidEnvelope(_) => ErrorCode::InvalidEnvelope,
            OrchestratorError::Registry(e) => e.code(),
            OrchestratorError::Gate(e) => e.code(),
            OrchestratorError::Dispatch(e) => e.code(),
            OrchestratorError::Idempotency(e) => e.code(),
            OrchestratorError::UserDenied => ErrorCode::UserDenied,
            OrchestratorError::ConfirmationTimeout => ErrorCode::ConfirmationTimeout,
        }
    }
}
