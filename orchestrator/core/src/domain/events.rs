// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool call lifecycle events. Ported from
//! `tool_events_service.py`'s `ToolEvent`/`ToolEventType`, generalized from
//! Socket.IO emission to a `tokio::sync::broadcast` fan-out in
//! [`crate::infrastructure::event_bus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventType {
    Started,
    Progress,
    Completed,
    Failed,
    ConfirmationRequired,
    ConfirmationReceived,
    Cancelled,
}

/// One lifecycle event for a tool invocation. All optional fields are
/// populated according to `event_type`; sanitization of `parameters`/`result`
/// happens before construction (see
/// [`crate::infrastructure::event_bus::sanitize_value`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub event_type: ToolEventType,
    pub trace_id: Uuid,
    pub request_id: Uuid,
    pub tool_name: String,
    pub capability_name: String,
    pub user_id: String,
    pub company_id: String,
    pub timestamp: DateTime<Utc>,

    pub parameters: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub progress_percent: Option<u8>,
    pub progress_message: Option<String>,
    pub confirmation_message: Option<String>,
    pub risk_level: Option<String>,
    pub approved: Option<bool>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Minimal identity a `ToolEvent` is built from; fields shared by every
/// event-construction helper below.
pub struct EventIdentity {
    pub trace_id: Uuid,
    pub request_id: Uuid,
    pub tool_name: String,
    pub capability_name: String,
    pub user_id: String,
    pub company_id: String,
}

impl ToolEvent {
    fn base(identity: &EventIdentity, event_type: ToolEventType) -> Self {
        Self {
            event_type,
            trace_id: identity.trace_id,
            request_id: identity.request_id,
            tool_name: identity.tool_name.clone(),
            capability_name: identity.capability_name.clone(),
            user_id: identity.user_id.clone(),
            company_id: identity.company_id.clone(),
            timestamp: Utc::now(),
            parameters: None,
            result: None,
            error: None,
            error_code: None,
            execution_time_ms: None,
            progress_percent: None,
            progress_message: None,
            confirmation_message: None,
            risk_level: None,
            approved: None,
            metadata: Default::default(),
        }
    }

    pub fn started(identity: &EventIdentity, parameters: Option<Value>, risk_level: Option<String>) -> Self {
        let mut event = Self::base(identity, ToolEventType::Started);
        event.parameters = parameters;
        event.risk_level = risk_level;
        event
    }

    pub fn completed(identity: &EventIdentity, result: Option<Value>, execution_time_ms: u64) -> Self {
        let mut event = Self::base(identity, ToolEventType::Completed);
        event.result = result;
        event.execution_time_ms = Some(execution_time_ms);
        event
    }

    pub fn failed(
        identity: &EventIdentity,
        error: impl Into<String>,
        error_code: Option<String>,
        execution_time_ms: Option<u64>,
    ) -> Self {
        let mut event = Self::base(identity, ToolEventType::Failed);
        event.error = Some(error.into());
        event.error_code = error_code;
        event.execution_time_ms = execution_time_ms;
        event
    }

    pub fn progress(identity: &EventIdentity, progress_percent: u8, progress_message: Option<String>) -> Self {
        let mut event = Self::base(identity, ToolEventType::Progress);
        event.progress_percent = Some(progress_percent);
        event.progress_message = progress_message;
        event
    }

    pub fn confirmation_required(
        identity: &EventIdentity,
        message: impl Into<String>,
        risk_level: impl Into<String>,
        parameters: Option<Value>,
    ) -> Self {
        let mut event = Self::base(identity, ToolEventType::ConfirmationRequired);
        event.confirmation_message = Some(message.into());
        event.risk_level = Some(risk_level.into());
        event.parameters = parameters;
        event
    }

    pub fn confirmation_received(identity: &EventIdentity, approved: bool, message: Option<String>) -> Self {
        let mut event = Self::base(identity, ToolEventType::ConfirmationReceived);
        event.approved = Some(approved);
        event.confirmation_message = message;
        event
    }

    pub fn cancelled(identity: &EventIdentity, reason: Option<String>) -> Self {
        let mut event = Self::base(identity, ToolEventType::Cancelled);
        event.error = reason;
        event
    }
}
