// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process executor: wraps a native Rust closure/handler running in the
//! same process, for local plugin tools that need no subprocess or network
//! hop at all.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::dispatch::{AdapterKind, DispatchError, ExecutionContext, ExecutorOutcome, Health, ToolExecutor};

pub type Handler = dyn Fn(&str, Value) -> Result<ExecutorOutcome, DispatchError> + Send + Sync;

/// Executor backed by in-process handler functions, one per capability.
pub struct InProcessExecutor {
    component: String,
    capabilities: Vec<String>,
    handlers: std::collections::HashMap<String, Box<Handler>>,
}

impl InProcessExecutor {
    pub fn builder(component: impl Into<String>) -> InProcessExecutorBuilder {
        InProcessExecutorBuilder {
            component: component.into(),
            handlers: std::collections::HashMap::new(),
        }
    }
}

pub struct InProcessExecutorBuilder {
    component: String,
    handlers: std::collections::HashMap<String, Box<Handler>>,
}

impl InProcessExecutorBuilder {
    pub fn capability(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&str, Value) -> Result<ExecutorOutcome, DispatchError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    pub fn build(self) -> InProcessExecutor {
        InProcessExecutor {
            component: self.component,
            capabilities: self.handlers.keys().cloned().collect(),
            handlers: self.handlers,
        }
    }
}

#[async_trait]
impl ToolExecutor for InProcessExecutor {
    async fn execute(&self, capability: &str, input: Value, context: &ExecutionContext) -> Result<ExecutorOutcome, DispatchError> {
        if context.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let handler = self
            .handlers
            .get(capability)
            .ok_or_else(|| DispatchError::ExecutorError(format!("no handler registered for capability '{capability}'")))?;
        handler(capability, input)
    }

    async fn health_check(&self) -> Health {
        Health {
            healthy: true,
            component: self.component.clone(),
            message: None,
        }
    }

    async fn validate_input(&self, capability: &str, _input: &Value) -> Vec<String> {
        if self.handlers.contains_key(capability) {
            Vec::new()
        } else {
            vec![format!("unknown capability '{capability}'")]
        }
    }

    fn get_capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::InProcess
    }
}
