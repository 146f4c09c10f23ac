// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The executor contract the Capability Dispatcher invokes uniformly
//! regardless of adapter kind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::ErrorCode;

/// Thin context handed to an executor alongside its input, carrying
/// identity, tracing, and the cancellation signal the Dispatcher propagates.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub user_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub trace_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub timeout_seconds: u64,
    pub cancellation: CancellationToken,
}

/// The normalized shape every executor must resolve to, regardless of its
/// adapter's native return type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub healthy: bool,
    pub component: String,
    pub message: Option<String>,
}

/// Identifies which adapter kind a registered tool uses, so the Registry
/// can report it without downcasting the trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    InProcess,
    Http,
    JsonRpcStdio,
    WebSocketStream,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("input validation failed: {0:?}")]
    InvalidInput(Vec<String>),

    #[error("executor returned an unparseable response: {0}")]
    InvalidExecutorResponse(String),

    #[error("executor exceeded timeout of {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("execution was cancelled")]
    Cancelled,

    #[error("executor error: {0}")]
    ExecutorError(String),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::InvalidInput(_) => ErrorCode::InvalidInput,
            DispatchError::InvalidExecutorResponse(_) => ErrorCode::InvalidExecutorResponse,
            DispatchError::Timeout { .. } => ErrorCode::Timeout,
            DispatchError::Cancelled => ErrorCode::Cancelled,
            DispatchError::ExecutorError(_) => ErrorCode::ExecutorError,
        }
    }
}

/// Polymorphic over the capability set; implementations own
/// adapter-specific concerns (retries, auth header injection, token
/// refresh) — the Dispatcher treats every kind uniformly.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        capability: &str,
        input: Value,
        context: &ExecutionContext,
    ) -> Result<ExecutorOutcome, DispatchError>;

    async fn health_check(&self) -> Health;

    /// Structural validation in addition to whatever the Dispatcher already
    /// checked against `input_schema`; returns one message per violation.
    async fn validate_input(&self, capability: &str, input: &Value) -> Vec<String>;

    fn get_capabilities(&self) -> Vec<String>;

    fn adapter_kind(&self) -> AdapterKind;
}
