// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event Bus — pub/sub fan-out for tool lifecycle events.
//!
//! A single `tokio::sync::broadcast` channel carries every `ToolEvent`.
//! "Rooms" (`company_{id}`, `user_{id}`) are modeled as filtering views over
//! that one channel rather than N independent channels.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::events::ToolEvent;

const SENSITIVE_KEY_MARKERS: &[&str] = &["password", "token", "secret", "key", "credential", "auth"];
const REDACTED: &str = "***REDACTED***";

/// Recursively replaces the value of any object key whose lowercased form
/// contains a sensitive substring, ported 1:1 from `_sanitize_parameters`.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let lower = k.to_lowercase();
                if SENSITIVE_KEY_MARKERS.iter().any(|marker| lower.contains(marker)) {
                    sanitized.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    sanitized.insert(k.clone(), sanitize_value(v));
                }
            }
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

fn sanitize_event(mut event: ToolEvent) -> ToolEvent {
    event.parameters = event.parameters.map(|p| sanitize_value(&p));
    event.result = event.result.map(|r| sanitize_value(&r));
    event
}

/// Ring buffer of recent events for `get_recent` diagnostics.
struct History {
    capacity: usize,
    events: std::sync::Mutex<std::collections::VecDeque<ToolEvent>>,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: std::sync::Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
        }
    }

    fn push(&self, event: ToolEvent) {
        let mut guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
    }

    fn get_recent(
        &self,
        trace_id: Option<uuid::Uuid>,
        tool_name: Option<&str>,
        event_type: Option<crate::domain::events::ToolEventType>,
        limit: usize,
    ) -> Vec<ToolEvent> {
        let guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .rev()
            .filter(|e| trace_id.map(|t| t == e.trace_id).unwrap_or(true))
            .filter(|e| tool_name.map(|t| t == e.tool_name).unwrap_or(true))
            .filter(|e| event_type.map(|t| t == e.event_type).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Pub/sub event bus. Cloning shares the same underlying channel and history
/// (both held behind `Arc`).
pub struct ToolEventBus {
    sender: Arc<broadcast::Sender<ToolEvent>>,
    history: Arc<History>,
}

impl Clone for ToolEventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            history: self.history.clone(),
        }
    }
}

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_HISTORY_SIZE: usize = 500;

impl ToolEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            history: Arc::new(History::new(DEFAULT_HISTORY_SIZE)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Sanitizes `parameters`/`result`, appends to history, and publishes.
    /// A slow or absent subscriber never blocks or fails the caller — the
    /// broadcast channel's `send` only reports a receiver count.
    pub fn publish(&self, event: ToolEvent) {
        let event = sanitize_event(event);
        self.history.push(event.clone());
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Filtered view over the `company_{company_id}` room.
    pub fn subscribe_company(&self, company_id: impl Into<String>) -> CompanyEventReceiver {
        CompanyEventReceiver {
            receiver: self.sender.subscribe(),
            company_id: company_id.into(),
        }
    }

    /// Filtered view over the `user_{user_id}` room.
    pub fn subscribe_user(&self, user_id: impl Into<String>) -> UserEventReceiver {
        UserEventReceiver {
            receiver: self.sender.subscribe(),
            user_id: user_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn get_recent(
        &self,
        trace_id: Option<uuid::Uuid>,
        tool_name: Option<&str>,
        event_type: Option<crate::domain::events::ToolEventType>,
        limit: usize,
    ) -> Vec<ToolEvent> {
        self.history.get_recent(trace_id, tool_name, event_type, limit)
    }
}

impl Default for ToolEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,
    #[error("no events available")]
    Empty,
    #[error("receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!(lagged_by = n, "event receiver lagged, events were dropped");
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<ToolEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<ToolEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }
}

/// Receiver filtered to one company's room.
pub struct CompanyEventReceiver {
    receiver: broadcast::Receiver<ToolEvent>,
    company_id: String,
}

impl CompanyEventReceiver {
    pub async fn recv(&mut self) -> Result<ToolEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.company_id == self.company_id {
                return Ok(event);
            }
        }
    }
}

/// Receiver filtered to one user's room.
pub struct UserEventReceiver {
    receiver: broadcast::Receiver<ToolEvent>,
    user_id: String,
}

impl UserEventReceiver {
    pub async fn recv(&mut self) -> Result<ToolEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.user_id == self.user_id {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventIdentity;
    use serde_json::json;

    fn identity() -> EventIdentity {
        EventIdentity {
            trace_id: uuid::Uuid::new_v4(),
            request_id: uuid::Uuid::new_v4(),
            tool_name: "file_tool".to_string(),
            capability_name: "write".to_string(),
            user_id: "u1".to_string(),
            company_id: "acme".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_subscribe_round_trip() {
        let bus = ToolEventBus::new(10);
        let mut rx = bus.subscribe();

        bus.publish(ToolEvent::started(&identity(), None, None));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.tool_name, "file_tool");
    }

    #[tokio::test]
    async fn company_room_filters_out_other_tenants() {
        let bus = ToolEventBus::new(10);
        let mut rx = bus.subscribe_company("acme");

        let mut other = identity();
        other.company_id = "globex".to_string();
        bus.publish(ToolEvent::started(&other, None, None));
        bus.publish(ToolEvent::started(&identity(), None, None));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.company_id, "acme");
    }

    #[tokio::test]
    async fn sensitive_keys_are_redacted_before_publish() {
        let bus = ToolEventBus::new(10);
        let mut rx = bus.subscribe();

        let params = json!({"api_token": "sk-live-123", "file": "/tmp/a.txt"});
        bus.publish(ToolEvent::started(&identity(), Some(params), None));

        let received = rx.recv().await.unwrap();
        let params = received.parameters.unwrap();
        assert_eq!(params["api_token"], json!(REDACTED));
        assert_eq!(params["file"], json!("/tmp/a.txt"));
    }

    #[test]
    fn nested_sensitive_keys_are_redacted() {
        let value = json!({"outer": {"user_secret": "s3cr3t", "ok": 1}});
        let sanitized = sanitize_value(&value);
        assert_eq!(sanitized["outer"]["user_secret"], json!(REDACTED));
        assert_eq!(sanitized["outer"]["ok"], json!(1));
    }

    #[test]
    fn history_returns_most_recent_first_bounded_by_limit() {
        let bus = ToolEventBus::new(10);
        for _ in 0..5 {
            bus.publish(ToolEvent::started(&identity(), None, None));
        }
        let recent = bus.get_recent(None, None, None, 3);
        assert_eq!(recent.len(), 3);
    }
}
