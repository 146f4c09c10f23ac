// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The request envelope: an immutable descriptor carrying tenant, user,
//! trace, and idempotency data through the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Multi-tenant context carried alongside every tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallContext {
    pub company_id: String,
    pub site_id: Option<String>,
    pub user_id: String,
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// The shape a transport hands the core before it becomes a validated
/// [`Envelope`]. Deserialized straight off the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRequest {
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
    pub tool_name: String,
    pub capability_name: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    pub context: ToolCallContext,
    #[serde(default)]
    pub dry_run: bool,
    pub timeout_seconds: Option<u64>,
    pub priority: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidEnvelope {
    #[error("tool_name is required")]
    MissingToolName,
    #[error("capability_name is required")]
    MissingCapabilityName,
    #[error("context.company_id is required")]
    MissingCompanyId,
    #[error("context.user_id is required")]
    MissingUserId,
    #[error("timeout_seconds must be greater than zero")]
    InvalidTimeout,
}

/// Frozen value passed through the pipeline. Construction validates required
/// wire fields *before* any idempotency state is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: Uuid,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
    pub trace_id: Uuid,
    pub parent_span_id: Option<String>,

    pub tool_name: String,
    pub capability_name: String,
    pub parameters: serde_json::Map<String, Value>,

    pub context: ToolCallContext,

    pub dry_run: bool,
    pub timeout_seconds: u64,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

impl Envelope {
    /// Validate and construct an Envelope from a wire request. No
    /// idempotency, registry, or gate state is touched here — a malformed
    /// request never creates state.
    pub fn try_from_wire(wire: WireRequest) -> Result<Self, InvalidEnvelope> {
        if wire.tool_name.trim().is_empty() {
            return Err(InvalidEnvelope::MissingToolName);
        }
        if wire.capability_name.trim().is_empty() {
            return Err(InvalidEnvelope::MissingCapabilityName);
        }
        if wire.context.company_id.trim().is_empty() {
            return Err(InvalidEnvelope::MissingCompanyId);
        }
        if wire.context.user_id.trim().is_empty() {
            return Err(InvalidEnvelope::MissingUserId);
        }
        let timeout_seconds = wire.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            return Err(InvalidEnvelope::InvalidTimeout);
        }

        Ok(Self {
            request_id: Uuid::new_v4(),
            idempotency_key: wire.idempotency_key,
            correlation_id: wire.correlation_id,
            trace_id: Uuid::new_v4(),
            parent_span_id: None,
            tool_name: wire.tool_name,
            capability_name: wire.capability_name,
            parameters: wire.parameters,
            context: wire.context,
            dry_run: wire.dry_run,
            timeout_seconds,
            priority: wire.priority.unwrap_or_else(|| "medium".to_string()),
            created_at: Utc::now(),
            expires_at: wire.expires_at,
        })
    }

    /// Returns the caller-provided idempotency key, or a deterministic hash
    /// derived from `(tool_name, capability_name, user_id, parameters)`.
    ///
    /// Parameters are canonicalized by recursively re-keying every object
    /// into a `BTreeMap` (sorted keys) before serializing, so two
    /// semantically equal parameter maps always hash identically regardless
    /// of field insertion order. Hashing uses `blake3` rather than a
    /// language-level hash function, which is stable across processes.
    pub fn effective_idempotency_key(&self) -> String {
        if let Some(ref key) = self.idempotency_key {
            return key.clone();
        }

        let canonical = canonicalize_value(&Value::Object(self.parameters.clone()));
        let signature = format!(
            "{}:{}:{}:{}",
            self.tool_name, self.capability_name, self.context.user_id, canonical
        );
        blake3::hash(signature.as_bytes()).to_hex().to_string()
    }
}

/// Recursively sorts object keys so the resulting JSON string is a stable
/// canonical form regardless of the original insertion order.
fn canonicalize_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> = map
                .iter()
                .map(|(k, v)| (k, canonicalize_value(v)))
                .collect();
            let entries: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), v))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(canonicalize_value).collect();
            format!("[{}]", entries.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(tool: &str, cap: &str, user: &str, params: serde_json::Map<String, Value>) -> WireRequest {
        WireRequest {
            idempotency_key: None,
            correlation_id: None,
            tool_name: tool.to_string(),
            capability_name: cap.to_string(),
            parameters: params,
            context: ToolCallContext {
                company_id: "acme".to_string(),
                site_id: None,
                user_id: user.to_string(),
                role: None,
                permissions: vec![],
                locale: default_locale(),
                timezone: default_timezone(),
                metadata: Default::default(),
            },
            dry_run: false,
            timeout_seconds: None,
            priority: None,
            expires_at: None,
        }
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut w = wire("", "cap", "u1", Default::default());
        assert_eq!(Envelope::try_from_wire(w.clone()), Err(InvalidEnvelope::MissingToolName));
        w.tool_name = "t".to_string();
        w.context.company_id = "".to_string();
        assert_eq!(Envelope::try_from_wire(w), Err(InvalidEnvelope::MissingCompanyId));
    }

    #[test]
    fn effective_key_is_stable_across_key_order() {
        let mut p1 = serde_json::Map::new();
        p1.insert("a".to_string(), Value::from(1));
        p1.insert("b".to_string(), Value::from(2));

        let mut p2 = serde_json::Map::new();
        p2.insert("b".to_string(), Value::from(2));
        p2.insert("a".to_string(), Value::from(1));

        let e1 = Envelope::try_from_wire(wire("t", "c", "u1", p1)).unwrap();
        let e2 = Envelope::try_from_wire(wire("t", "c", "u1", p2)).unwrap();

        assert_eq!(e1.effective_idempotency_key(), e2.effective_idempotency_key());
    }

    #[test]
    fn explicit_key_wins_over_derived() {
        let mut w = wire("t", "c", "u1", Default::default());
        w.idempotency_key = Some("explicit-key".to_string());
        let e = Envelope::try_from_wire(w).unwrap();
        assert_eq!(e.effective_idempotency_key(), "explicit-key");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut w = wire("t", "c", "u1", Default::default());
        w.timeout_seconds = Some(0);
        assert_eq!(Envelope::try_from_wire(w), Err(InvalidEnvelope::InvalidTimeout));
    }
}
