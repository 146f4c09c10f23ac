// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP/REST executor adapter. Sends a POST to `{base_url}/{capability}`
//! with a bearer auth header, retries exactly once on 401/403 after an
//! async token refresh, then surfaces the failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::dispatch::{AdapterKind, DispatchError, ExecutionContext, ExecutorOutcome, Health, ToolExecutor};

/// Refreshes a bearer token out-of-band (vault lookup, OAuth refresh grant).
/// Held as a trait so the credential vault stays an external collaborator.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String, DispatchError>;
}

pub struct HttpExecutor<R: TokenRefresher> {
    component: String,
    base_url: String,
    capabilities: Vec<String>,
    client: Client,
    token: RwLock<String>,
    refresher: Arc<R>,
}

impl<R: TokenRefresher> HttpExecutor<R> {
    pub fn new(component: impl Into<String>, base_url: impl Into<String>, capabilities: Vec<String>, initial_token: String, refresher: Arc<R>) -> Self {
        Self {
            component: component.into(),
            base_url: base_url.into(),
            capabilities,
            client: Client::new(),
            token: RwLock::new(initial_token),
            refresher,
        }
    }

    async fn post(&self, capability: &str, input: &Value, timeout: Duration) -> Result<reqwest::Response, DispatchError> {
        let token = self.token.read().await.clone();
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), capability);
        self.client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "params": input }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DispatchError::ExecutorError(e.to_string()))
    }

    /// Sends the request, refreshing and retrying once on 401/403, then
    /// normalizing the executor's native `{success, data, error}` shape.
    async fn execute_inner(&self, capability: &str, input: Value, context: &ExecutionContext) -> Result<ExecutorOutcome, DispatchError> {
        let timeout = Duration::from_secs(context.timeout_seconds);
        let response = self.post(capability, &input, timeout).await?;

        let response = if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            let fresh = self.refresher.refresh().await?;
            *self.token.write().await = fresh;
            self.post(capability, &input, timeout).await?
        } else {
            response
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::ExecutorError(format!("http {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DispatchError::InvalidExecutorResponse(e.to_string()))?;

        normalize(body)
    }
}

/// Accepts a `{success, data, error}` triple or a bare data payload treated
/// as a successful result.
fn normalize(body: Value) -> Result<ExecutorOutcome, DispatchError> {
    match &body {
        Value::Object(map) if map.contains_key("success") => {
            let success = map.get("success").and_then(Value::as_bool).unwrap_or(false);
            Ok(ExecutorOutcome {
                success,
                data: map.get("data").cloned(),
                error: map.get("error").and_then(Value::as_str).map(String::from),
            })
        }
        _ => Ok(ExecutorOutcome { success: true, data: Some(body), error: None }),
    }
}

#[async_trait]
impl<R: TokenRefresher> ToolExecutor for HttpExecutor<R> {
    async fn execute(&self, capability: &str, input: Value, context: &ExecutionContext) -> Result<ExecutorOutcome, DispatchError> {
        if context.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        tokio::select! {
            result = self.execute_inner(capability, input, context) => result,
            _ = context.cancellation.cancelled() => Err(DispatchError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(context.timeout_seconds)) => {
                Err(DispatchError::Timeout { timeout_seconds: context.timeout_seconds })
            }
        }
    }

    async fn health_check(&self) -> Health {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => Health { healthy: true, component: self.component.clone(), message: None },
            Ok(r) => Health { healthy: false, component: self.component.clone(), message: Some(format!("status {}", r.status())) },
            Err(e) => Health { healthy: false, component: self.component.clone(), message: Some(e.to_string()) },
        }
    }

    async fn validate_input(&self, capability: &str, _input: &Value) -> Vec<String> {
        if self.capabilities.iter().any(|c| c == capability) {
            Vec::new()
        } else {
            vec![format!("unknown capability '{capability}'")]
        }
    }

    fn get_capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::Http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticRefresher;

    #[async_trait]
    impl TokenRefresher for StaticRefresher {
        async fn refresh(&self) -> Result<String, DispatchError> {
            Ok("refreshed-token".to_string())
        }
    }

    #[test]
    fn normalize_accepts_success_triple() {
        let outcome = normalize(serde_json::json!({"success": true, "data": {"x": 1}})).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data, Some(serde_json::json!({"x": 1})));
    }

    #[test]
    fn normalize_treats_bare_payload_as_success() {
        let outcome = normalize(serde_json::json!({"x": 1})).unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn retries_once_on_401_then_surfaces_if_still_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/echo")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let executor = HttpExecutor::new("remote", server.url(), vec!["echo".to_string()], "stale".to_string(), Arc::new(StaticRefresher));
        let ctx = ExecutionContext {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            conversation_id: "c1".to_string(),
            trace_id: uuid::Uuid::new_v4(),
            started_at: chrono::Utc::now(),
            timeout_seconds: 5,
            cancellation: tokio_util::sync::CancellationToken::new(),
        };

        let err = executor.execute_inner("echo", serde_json::Value::Null, &ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::ExecutorError(_)));
        mock.assert_async().await;
    }
}
