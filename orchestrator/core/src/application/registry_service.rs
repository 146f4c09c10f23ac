// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wires the Plugin Registry to the Prompt Composer's per-user cache: every
//! grant, revoke, or registration invalidates that user's cached catalog
//! synchronously, so a composed prompt never serves a tool set the user no
//! longer has.

use std::sync::Arc;

use crate::domain::dispatch::ToolExecutor;
use crate::domain::registry::{CapabilityDescriptor, RegistryError, ToolMetadata};
use crate::infrastructure::prompt_cache::PromptCache;
use crate::infrastructure::registry::Registry;

pub struct RegistryService {
    registry: Registry,
}

impl RegistryService {
    pub fn new(prompt_cache: Arc<PromptCache>) -> Self {
        let registry = Registry::with_invalidation_hook(move |user_id| prompt_cache.invalidate(user_id));
        Self { registry }
    }

    pub fn register(&self, metadata: ToolMetadata, executor: Arc<dyn ToolExecutor>) -> Result<(), RegistryError> {
        self.registry.register(metadata, executor)
    }

    pub fn resolve(&self, tool_name: &str, capability_name: &str) -> Result<CapabilityDescriptor, RegistryError> {
        self.registry.resolve(tool_name, capability_name)
    }

    pub fn metadata(&self, tool_name: &str) -> Option<ToolMetadata> {
        self.registry.metadata(tool_name)
    }

    pub fn executor(&self, tool_name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.registry.executor(tool_name)
    }

    pub fn list_for_user(&self, user_id: &str) -> Vec<ToolMetadata> {
        self.registry.list_for_user(user_id)
    }

    pub fn is_granted(&self, user_id: &str, tool_name: &str) -> bool {
        self.registry.is_granted(user_id, tool_name)
    }

    pub fn grant(&self, user_id: &str, tool_name: &str) {
        self.registry.grant(user_id, tool_name)
    }

    pub fn revoke(&self, user_id: &str, tool_name: &str) {
        self.registry.revoke(user_id, tool_name)
    }

    pub fn check_rate_limit(&self, tool_name: &str, user_id: &str) -> Result<(), RegistryError> {
        self.registry.check_rate_limit(tool_name, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dispatch::{AdapterKind, DispatchError, ExecutionContext, ExecutorOutcome, Health};
    use crate::domain::registry::{CredentialRef, ToolMetadata};
    use crate::domain::result::{ConfirmationPolicy, RiskLevel};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    struct NoopExecutor;

    #[async_trait]
    impl ToolExecutor for NoopExecutor {
        async fn execute(&self, _capability: &str, _input: Value, _ctx: &ExecutionContext) -> Result<ExecutorOutcome, DispatchError> {
            Ok(ExecutorOutcome { success: true, data: None, error: None })
        }
        async fn health_check(&self) -> Health {
            Health { healthy: true, component: "noop".to_string(), message: None }
        }
        async fn validate_input(&self, _capability: &str, _input: &Value) -> Vec<String> {
            Vec::new()
        }
        fn get_capabilities(&self) -> Vec<String> {
            vec!["read".to_string()]
        }
        fn adapter_kind(&self) -> AdapterKind {
            AdapterKind::InProcess
        }
    }

    fn sample_metadata(name: &str) -> ToolMetadata {
        ToolMetadata {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: "test".to_string(),
            tool_type: "native".to_string(),
            capabilities: vec![CapabilityDescriptor {
                name: "read".to_string(),
                description: "read".to_string(),
                input_schema: serde_json::json!({}),
                output_schema: serde_json::json!({}),
                examples: vec![],
            }],
            risk_level: RiskLevel::Low,
            requires_confirmation: false,
            confirmation_policy: ConfirmationPolicy::Auto,
            side_effects: vec![],
            required_permissions: vec![],
            rate_limit_per_minute: None,
            idempotent_capabilities: vec![],
            computer_mode: None,
            credential: None::<CredentialRef>,
        }
    }

    #[test]
    fn grant_invalidates_the_users_prompt_cache_entry() {
        let cache = Arc::new(PromptCache::new(Duration::from_secs(300)));
        cache.put("u1", "stale catalog".to_string());

        let service = RegistryService::new(cache.clone());
        service.register(sample_metadata("t1"), Arc::new(NoopExecutor)).unwrap();
        service.grant("u1", "t1");

        assert_eq!(cache.get("u1"), None);
    }
}
