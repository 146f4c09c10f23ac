// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The tool result: mutable while the Dispatcher assembles it, frozen once
//! it leaves the pipeline. Named `ToolResult` to avoid shadowing
//! `std::result::Result`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Read,
    Write,
    Delete,
    Execute,
    Configure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    New,
    Duplicate,
    InProgress,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    Auto,
    RoleCheck,
    Confirm,
    TwoPerson,
}

/// Distinguishes an externally asserted cancellation from one caused by a
/// timed-out executor. Both surface as the `Cancelled` error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    External,
    Timeout,
}

/// One audit log line recorded alongside a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub error_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub request_id: Uuid,
    pub idempotency_key: Option<String>,

    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub error_code: Option<String>,

    pub operation_type: OperationType,
    pub risk_level: RiskLevel,
    pub side_effects: Vec<String>,

    pub idempotency_status: IdempotencyStatus,
    pub cached_at: Option<DateTime<Utc>>,

    pub rollback_token: Option<String>,
    pub rollback_expires_at: Option<DateTime<Utc>>,

    pub requires_confirmation: bool,
    pub confirmation_policy: ConfirmationPolicy,
    pub confirmation_message: Option<String>,

    /// Backoff hint for `RateLimited`/`Timeout`/`ExecutorError` failures.
    pub retry_after_ms: Option<u64>,

    pub trace_id: Uuid,
    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,

    pub audit_log: Vec<AuditEntry>,
}

impl ToolResult {
    /// Builds a failed result carrying `error_code`, unsuccessfully but
    /// without side effects or cached status — the common shape every
    /// `OrchestratorError` arm is normalized into before it leaves the
    /// pipeline.
    pub fn failure(
        request_id: Uuid,
        trace_id: Uuid,
        idempotency_key: Option<String>,
        operation_type: OperationType,
        error_code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            idempotency_key,
            success: false,
            data: None,
            error: Some(message.into()),
            error_code: Some(error_code.to_string()),
            operation_type,
            risk_level: RiskLevel::Low,
            side_effects: Vec::new(),
            idempotency_status: IdempotencyStatus::New,
            cached_at: None,
            rollback_token: None,
            rollback_expires_at: None,
            requires_confirmation: false,
            confirmation_policy: ConfirmationPolicy::Auto,
            confirmation_message: None,
            retry_after_ms: None,
            trace_id,
            execution_time_ms: 0,
            completed_at: Utc::now(),
            audit_log: Vec::new(),
        }
    }

    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    pub fn audited(mut self, message: impl Into<String>) -> Self {
        self.audit_log.push(AuditEntry {
            at: Utc::now(),
            error_code: self.error_code.clone(),
            message: message.into(),
        });
        self
    }

    /// Clones this result into a cache-hit response: flips
    /// `idempotency_status` to `duplicate` and stamps `cached_at`, leaving
    /// the underlying payload untouched.
    pub fn as_cached_duplicate(&self, cached_at: DateTime<Utc>) -> Self {
        let mut clone = self.clone();
        clone.idempotency_status = IdempotencyStatus::Duplicate;
        clone.cached_at = Some(cached_at);
        clone
    }
}
