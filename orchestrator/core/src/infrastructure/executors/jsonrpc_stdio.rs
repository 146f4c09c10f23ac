// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON-RPC-over-stdio executor adapter: frames requests as newline-delimited
//! JSON-RPC 2.0 objects over a child process's stdin/stdout, matching the
//! line-based framing subprocess tool adapters use when there's no dedicated
//! wire crate worth pulling in for it.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

use crate::domain::dispatch::{AdapterKind, DispatchError, ExecutionContext, ExecutorOutcome, Health, ToolExecutor};

struct Pending {
    replies: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

/// Spawns and supervises a long-lived subprocess, multiplexing concurrent
/// calls over its single stdin/stdout pair by JSON-RPC request `id`.
pub struct JsonRpcStdioExecutor {
    component: String,
    capabilities: Vec<String>,
    stdin: Mutex<tokio::process::ChildStdin>,
    child: Mutex<Child>,
    next_id: AtomicU64,
    pending: Arc<Pending>,
}

impl JsonRpcStdioExecutor {
    pub async fn spawn(component: impl Into<String>, command: &str, args: &[String], capabilities: Vec<String>) -> Result<Self, DispatchError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::ExecutorError(format!("failed to spawn subprocess: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| DispatchError::ExecutorError("subprocess has no stdin".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| DispatchError::ExecutorError("subprocess has no stdout".to_string()))?;

        let pending = Arc::new(Pending { replies: Mutex::new(HashMap::new()) });
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(value) = serde_json::from_str::<Value>(&line) else { continue };
                let Some(id) = value.get("id").and_then(Value::as_u64) else { continue };
                let mut replies = reader_pending.replies.lock().await;
                if let Some(tx) = replies.remove(&id) {
                    let _ = tx.send(value);
                }
            }
        });

        Ok(Self {
            component: component.into(),
            capabilities,
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, DispatchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.replies.lock().await.insert(id, tx);

        let mut line = serde_json::to_vec(&request).map_err(|e| DispatchError::ExecutorError(e.to_string()))?;
        line.push(b'\n');
        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(&line).await.map_err(|e| DispatchError::ExecutorError(format!("write to subprocess failed: {e}")))?;
            stdin.flush().await.map_err(|e| DispatchError::ExecutorError(e.to_string()))?;
        }

        let response = rx.await.map_err(|_| DispatchError::ExecutorError("subprocess closed before replying".to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(DispatchError::ExecutorError(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| DispatchError::InvalidExecutorResponse("response missing both result and error".to_string()))
    }
}

#[async_trait]
impl ToolExecutor for JsonRpcStdioExecutor {
    async fn execute(&self, capability: &str, input: Value, context: &ExecutionContext) -> Result<ExecutorOutcome, DispatchError> {
        if context.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let timeout = std::time::Duration::from_secs(context.timeout_seconds);
        let call = self.call(capability, input);
        tokio::select! {
            result = call => result.map(|data| ExecutorOutcome { success: true, data: Some(data), error: None }),
            _ = context.cancellation.cancelled() => Err(DispatchError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(DispatchError::Timeout { timeout_seconds: context.timeout_seconds }),
        }
    }

    async fn health_check(&self) -> Health {
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(None) => Health { healthy: true, component: self.component.clone(), message: None },
            Ok(Some(status)) => Health { healthy: false, component: self.component.clone(), message: Some(format!("subprocess exited: {status}")) },
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
        AdapterKind::JsonRpcStdio
    }
}
