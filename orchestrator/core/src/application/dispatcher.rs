// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capability Dispatcher: validate → dry-run short-circuit → invoke →
//! normalize → timeout → record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::dispatch::{DispatchError, ExecutionContext, ExecutorOutcome, ToolExecutor};
use crate::domain::envelope::Envelope;
use crate::domain::registry::{CapabilityDescriptor, ToolMetadata};
use crate::domain::result::{OperationType, RiskLevel, ToolResult};

/// Stateless: every invocation is self-contained, so one `Dispatcher` is
/// shared across the process.
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn dispatch(
        &self,
        envelope: &Envelope,
        metadata: &ToolMetadata,
        capability: &CapabilityDescriptor,
        executor: Arc<dyn ToolExecutor>,
        cancellation: CancellationToken,
    ) -> Result<ToolResult, DispatchError> {
        let started = Instant::now();
        let input = Value::Object(envelope.parameters.clone());

        let mut violations = validate_against_schema(&capability.input_schema, &envelope.parameters);
        violations.extend(executor.validate_input(&envelope.capability_name, &input).await);
        if !violations.is_empty() {
            return Err(DispatchError::InvalidInput(violations));
        }

        let operation_type = operation_type_for(&envelope.capability_name, metadata);

        if envelope.dry_run {
            return Ok(dry_run_result(envelope, metadata, operation_type));
        }

        let context = ExecutionContext {
            user_id: envelope.context.user_id.clone(),
            session_id: envelope.correlation_id.clone().unwrap_or_default(),
            conversation_id: envelope.correlation_id.clone().unwrap_or_default(),
            trace_id: envelope.trace_id,
            started_at: chrono::Utc::now(),
            timeout_seconds: envelope.timeout_seconds,
            cancellation: cancellation.clone(),
        };

        let deadline = Duration::from_secs(envelope.timeout_seconds);
        let outcome = match tokio::time::timeout(
            deadline,
            executor.execute(&envelope.capability_name, input, &context),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                cancellation.cancel();
                return Err(DispatchError::Timeout {
                    timeout_seconds: envelope.timeout_seconds,
                });
            }
        };

        let mut result = normalize(envelope, metadata, operation_type, outcome);
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks presence of every `required` property and, where `type` is
/// declared, a coarse type match. Not a general JSON Schema validator — the
/// capability schemas this crate consumes only ever use `required`,
/// `properties.*.type`.
fn validate_against_schema(schema: &Value, parameters: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut violations = Vec::new();
    let Some(schema) = schema.as_object() else {
        return violations;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required {
            let Some(name) = name.as_str() else { continue };
            if !parameters.contains_key(name) {
                violations.push(format!("missing required parameter '{name}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in parameters {
            let Some(expected_type) = properties
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !matches_json_type(expected_type, value) {
                violations.push(format!("parameter '{name}' must be of type '{expected_type}'"));
            }
        }
    }

    violations
}

fn matches_json_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn operation_type_for(capability_name: &str, metadata: &ToolMetadata) -> OperationType {
    let _ = metadata;
    let lower = capability_name.to_lowercase();
    if lower.starts_with("delete") || lower.contains("remove") {
        OperationType::Delete
    } else if lower.starts_with("write") || lower.contains("create") || lower.contains("update") {
        OperationType::Write
    } else if lower.starts_with("execute") || lower.starts_with("run") {
        OperationType::Execute
    } else if lower.starts_with("configure") || lower.contains("config") {
        OperationType::Configure
    } else {
        OperationType::Read
    }
}

/// Synthesizes a result describing what the real invocation would do,
/// without ever reaching the executor.
fn dry_run_result(envelope: &Envelope, metadata: &ToolMetadata, operation_type: OperationType) -> ToolResult {
    ToolResult {
        request_id: envelope.request_id,
        idempotency_key: Some(envelope.effective_idempotency_key()),
        success: true,
        data: Some(serde_json::json!({
            "dry_run": true,
            "would_execute": format!("{}.{}", envelope.tool_name, envelope.capability_name),
        })),
        error: None,
        error_code: None,
        operation_type,
        risk_level: metadata.risk_level,
        side_effects: metadata.side_effects.clone(),
        idempotency_status: crate::domain::result::IdempotencyStatus::New,
        cached_at: None,
        rollback_token: None,
        rollback_expires_at: None,
        requires_confirmation: false,
        confirmation_policy: metadata.confirmation_policy,
        confirmation_message: None,
        retry_after_ms: None,
        trace_id: envelope.trace_id,
        execution_time_ms: 0,
        completed_at: chrono::Utc::now(),
        audit_log: Vec::new(),
    }
}

fn normalize(
    envelope: &Envelope,
    metadata: &ToolMetadata,
    operation_type: OperationType,
    outcome: ExecutorOutcome,
) -> ToolResult {
    let risk_level = if outcome.success { metadata.risk_level } else { RiskLevel::Low };
    ToolResult {
        request_id: envelope.request_id,
        idempotency_key: Some(envelope.effective_idempotency_key()),
        success: outcome.success,
        data: outcome.data,
        error: outcome.error,
        error_code: None,
        operation_type,
        risk_level,
        side_effects: if outcome.success { metadata.side_effects.clone() } else { Vec::new() },
        idempotency_status: crate::domain::result::IdempotencyStatus::New,
        cached_at: None,
        rollback_token: None,
        rollback_expires_at: None,
        requires_confirmation: false,
        confirmation_policy: metadata.confirmation_policy,
        confirmation_message: None,
        retry_after_ms: None,
        trace_id: envelope.trace_id,
        execution_time_ms: 0,
        completed_at: chrono::Utc::now(),
        audit_log: Vec::new(),
    }
}
