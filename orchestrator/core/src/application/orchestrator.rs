// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator: the single async function whose control flow *is* the
//! state machine tying every other component together —
//! Received → Resolving → Gating → Claiming → Executing → terminal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::dispatcher::Dispatcher;
use crate::application::registry_service::RegistryService;
use crate::application::security_gate_service::SecurityGateService;
use crate::domain::dispatch::DispatchError;
use crate::domain::envelope::Envelope;
use crate::domain::errors::ErrorCode;
use crate::domain::events::{EventIdentity, ToolEvent};
use crate::domain::registry::{RegistryError, ToolMetadata};
use crate::domain::result::{OperationType, ToolResult};
use crate::domain::security_gate::{OperationResult, SecurityCheckResult};
use crate::infrastructure::idempotency_store::{CheckOutcome, ClaimOutcome};
use crate::infrastructure::{IdempotencyStore, ToolEventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved,
    Denied,
    TimedOut,
}

/// The human-in-the-loop boundary: whatever surface presents a
/// confirmation prompt to a user and reports back their decision (or a
/// timeout) implements this.
#[async_trait]
pub trait ConfirmationGateway: Send + Sync {
    async fn await_confirmation(&self, request_id: Uuid, message: &str, timeout: Duration) -> ConfirmationOutcome;
}

/// Confirms nothing ever requires a human: useful for tools whose
/// `confirmation_policy` is `Auto`, and for tests.
pub struct AutoApprove;

#[async_trait]
impl ConfirmationGateway for AutoApprove {
    async fn await_confirmation(&self, _request_id: Uuid, _message: &str, _timeout: Duration) -> ConfirmationOutcome {
        ConfirmationOutcome::Approved
    }
}

/// Fixed backoff hint surfaced on `Timeout`/`ExecutorError` failures, absent
/// a more precise signal (unlike `RateLimited`, which carries `governor`'s
/// own wait-time estimate).
const DEFAULT_RETRY_AFTER_MS: u64 = 1_000;

pub struct Orchestrator {
    registry: Arc<RegistryService>,
    gate: Arc<SecurityGateService>,
    idempotency: Arc<IdempotencyStore>,
    dispatcher: Dispatcher,
    events: ToolEventBus,
    confirmations: Arc<dyn ConfirmationGateway>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RegistryService>,
        gate: Arc<SecurityGateService>,
        idempotency: Arc<IdempotencyStore>,
        events: ToolEventBus,
        confirmations: Arc<dyn ConfirmationGateway>,
    ) -> Self {
        Self {
            registry,
            gate,
            idempotency,
            dispatcher: Dispatcher::new(),
            events,
            confirmations,
        }
    }

    pub async fn handle(&self, envelope: Envelope) -> ToolResult {
        let identity = EventIdentity {
            trace_id: envelope.trace_id,
            request_id: envelope.request_id,
            tool_name: envelope.tool_name.clone(),
            capability_name: envelope.capability_name.clone(),
            user_id: envelope.context.user_id.clone(),
            company_id: envelope.context.company_id.clone(),
        };

        // Resolving
        let Some(metadata) = self.registry.metadata(&envelope.tool_name) else {
            return self.fail(&envelope, &identity, ErrorCode::UnknownTool, format!("tool '{}' is not registered", envelope.tool_name), None);
        };
        let capability = match self.registry.resolve(&envelope.tool_name, &envelope.capability_name) {
            Ok(capability) => capability,
            Err(e) => return self.fail(&envelope, &identity, e.code(), e.to_string(), None),
        };
        if !self.registry.is_granted(&envelope.context.user_id, &envelope.tool_name) {
            let err = RegistryError::Unauthorized {
                user_id: envelope.context.user_id.clone(),
                tool_name: envelope.tool_name.clone(),
            };
            return self.fail(&envelope, &identity, err.code(), err.to_string(), None);
        }
        if let Err(e) = self.registry.check_rate_limit(&envelope.tool_name, &envelope.context.user_id) {
            let retry_after_ms = match &e {
                RegistryError::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
                _ => None,
            };
            return self.fail(&envelope, &identity, e.code(), e.to_string(), retry_after_ms);
        }

        let key = envelope.effective_idempotency_key();

        if !envelope.dry_run {
            match self.idempotency.check(&key) {
                CheckOutcome::Duplicate(cached) => {
                    self.events.publish(ToolEvent::completed(&identity, cached.data.clone(), cached.execution_time_ms));
                    return cached;
                }
                CheckOutcome::InProgress => {
                    return self.wait_for_duplicate(&key, &envelope, &identity).await;
                }
                CheckOutcome::New | CheckOutcome::Expired => {}
            }
        }

        // Gating
        let gate_result = evaluate_policy(&self.gate, &metadata, &envelope);
        if !gate_result.allowed {
            return self.fail(
                &envelope,
                &identity,
                ErrorCode::PolicyDenied,
                gate_result.reason.unwrap_or_else(|| "denied by policy".to_string()),
                None,
            );
        }

        if gate_result.requires_confirmation {
            let message = gate_result.confirmation_message.clone().unwrap_or_default();
            self.events.publish(ToolEvent::confirmation_required(
                &identity,
                message.clone(),
                format!("{:?}", gate_result.risk_level),
                None,
            ));

            let outcome = self
                .confirmations
                .await_confirmation(envelope.request_id, &message, Duration::from_secs(envelope.timeout_seconds))
                .await;
            self.events.publish(ToolEvent::confirmation_received(
                &identity,
                outcome == ConfirmationOutcome::Approved,
                None,
            ));

            match outcome {
                ConfirmationOutcome::Approved => {}
                ConfirmationOutcome::Denied => {
                    return self.fail(&envelope, &identity, ErrorCode::UserDenied, "user denied the requested operation".to_string(), None);
                }
                ConfirmationOutcome::TimedOut => {
                    return self.fail(
                        &envelope,
                        &identity,
                        ErrorCode::ConfirmationTimeout,
                        "confirmation was not received within the timeout".to_string(),
                        None,
                    );
                }
            }
        }

        let Some(executor) = self.registry.executor(&envelope.tool_name) else {
            return self.fail(
                &envelope,
                &identity,
                ErrorCode::ExecutorError,
                format!("tool '{}' has no registered executor", envelope.tool_name),
                Some(DEFAULT_RETRY_AFTER_MS),
            );
        };

        if envelope.dry_run {
            // `started` marks entry into execution; a request denied or
            // abandoned during Gating never reaches this line.
            self.events.publish(ToolEvent::started(
                &identity,
                Some(Value::Object(envelope.parameters.clone())),
                Some(format!("{:?}", metadata.risk_level)),
            ));
            return match self
                .dispatcher
                .dispatch(&envelope, &metadata, &capability, executor, CancellationToken::new())
                .await
            {
                Ok(result) => result,
                Err(e) => self.fail(&envelope, &identity, e.code(), e.to_string(), retry_after_for(&e)),
            };
        }

        // Claiming
        match self.idempotency.begin(
            &key,
            envelope.request_id,
            &envelope.tool_name,
            &envelope.capability_name,
            &envelope.context.company_id,
            &envelope.context.user_id,
        ) {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::InProgress => {
                return self.wait_for_duplicate(&key, &envelope, &identity).await;
            }
        }

        // Executing: published only by the caller that won the claim, so a
        // race between identical concurrent requests still emits exactly one.
        self.events.publish(ToolEvent::started(
            &identity,
            Some(Value::Object(envelope.parameters.clone())),
            Some(format!("{:?}", metadata.risk_level)),
        ));
        let cancellation = CancellationToken::new();
        match self.dispatcher.dispatch(&envelope, &metadata, &capability, executor, cancellation).await {
            Ok(result) => {
                self.idempotency.complete(&key, result.clone());
                self.events.publish(ToolEvent::completed(&identity, result.data.clone(), result.execution_time_ms));
                result
            }
            Err(e) => {
                self.idempotency.fail(&key);
                self.fail(&envelope, &identity, e.code(), e.to_string(), retry_after_for(&e))
            }
        }
    }

    /// Suspends on the in-progress entry for `key`, returning its cached
    /// result once the claiming caller completes it, or a `Timeout` failure
    /// if it never does within the envelope's own timeout budget. Shared by
    /// a `check`-observed duplicate and a `begin` race loser alike.
    async fn wait_for_duplicate(&self, key: &str, envelope: &Envelope, identity: &EventIdentity) -> ToolResult {
        let wait_timeout = Duration::from_secs(envelope.timeout_seconds);
        match self.idempotency.wait(key, wait_timeout).await {
            Ok(Some(result)) => result,
            Ok(None) | Err(_) => self.fail(
                envelope,
                identity,
                ErrorCode::Timeout,
                "timed out waiting for the in-progress duplicate request".to_string(),
                Some(DEFAULT_RETRY_AFTER_MS),
            ),
        }
    }

    fn fail(
        &self,
        envelope: &Envelope,
        identity: &EventIdentity,
        code: ErrorCode,
        message: String,
        retry_after_ms: Option<u64>,
    ) -> ToolResult {
        if code.audit_logged() {
            tracing::warn!(
                tool_name = %envelope.tool_name,
                capability_name = %envelope.capability_name,
                user_id = %envelope.context.user_id,
                company_id = %envelope.context.company_id,
                error_code = code.as_str(),
                "{message}",
            );
        }

        if code == ErrorCode::Cancelled {
            self.events.publish(ToolEvent::cancelled(identity, Some(message.clone())));
        } else {
            self.events.publish(ToolEvent::failed(identity, message.clone(), Some(code.as_str().to_string()), None));
        }

        let mut result = ToolResult::failure(
            envelope.request_id,
            envelope.trace_id,
            Some(envelope.effective_idempotency_key()),
            OperationType::Read,
            code.as_str(),
            message,
        )
        .audited(code.as_str());
        if let Some(ms) = retry_after_ms {
            result = result.with_retry_after_ms(ms);
        }
        result
    }
}

fn retry_after_for(error: &DispatchError) -> Option<u64> {
    match error {
        DispatchError::Timeout { .. } | DispatchError::ExecutorError(_) => Some(DEFAULT_RETRY_AFTER_MS),
        _ => None,
    }
}

/// Maps a tool's declared `tool_type` to the Security Gate check its
/// operation belongs to. Tools outside the file/browser/code-execution
/// families carry no gated surface and are allowed through at their
/// declared risk level.
fn evaluate_policy(gate: &SecurityGateService, metadata: &ToolMetadata, envelope: &Envelope) -> SecurityCheckResult {
    match metadata.tool_type.as_str() {
        "file" => {
            let path = envelope.parameters.get("path").and_then(Value::as_str).unwrap_or_default();
            let size = envelope.parameters.get("size").and_then(Value::as_u64);
            gate.check_file_operation(&envelope.context.company_id, &envelope.capability_name, path, size)
        }
        "browser" => {
            let url = envelope.parameters.get("url").and_then(Value::as_str).unwrap_or_default();
            gate.check_browser_operation(&envelope.context.company_id, url)
        }
        "code_execution" => {
            let code = envelope.parameters.get("code").and_then(Value::as_str).unwrap_or_default();
            let sandbox = envelope.parameters.get("sandbox").and_then(Value::as_bool).unwrap_or(false);
            gate.check_code_execution(&envelope.context.company_id, code, sandbox)
        }
        _ => SecurityCheckResult {
            allowed: true,
            result: OperationResult::Allowed,
            reason: None,
            requires_confirmation: false,
            confirmation_message: None,
            risk_level: metadata.risk_level,
        },
    }
}
