// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plugin Registry: a concurrent, read-mostly capability index backing
//! tool/capability resolution, per-user grants, and rate-limit state for
//! the tool execution substrate.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};

use crate::domain::dispatch::ToolExecutor;
use crate::domain::registry::{CapabilityDescriptor, RegistryError, ToolMetadata, SYSTEM_USER};

type KeyedLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct RegisteredTool {
    metadata: ToolMetadata,
    executor: Arc<dyn ToolExecutor>,
}

/// Discovers tools, holds metadata, resolves `tool.capability` names, and
/// tracks per-user grants and per-(tool,user) rate limits.
pub struct Registry {
    tools: DashMap<String, RegisteredTool>,
    capability_index: DashMap<(String, String), CapabilityDescriptor>,
    grants: DashMap<String, HashSet<String>>,
    limiters: DashMap<(String, String), Arc<KeyedLimiter>>,
    on_invalidate: Box<dyn Fn(&str) + Send + Sync>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_invalidation_hook(|_user_id| {})
    }

    /// `on_invalidate` is called with the affected `user_id` whenever a grant,
    /// revoke, or capability sync occurs, so the Prompt Composer's per-user
    /// catalog cache never serves a stale tool set.
    pub fn with_invalidation_hook(on_invalidate: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            tools: DashMap::new(),
            capability_index: DashMap::new(),
            grants: DashMap::new(),
            limiters: DashMap::new(),
            on_invalidate: Box::new(on_invalidate),
        }
    }

    pub fn register(&self, metadata: ToolMetadata, executor: Arc<dyn ToolExecutor>) -> Result<(), RegistryError> {
        if self.tools.contains_key(&metadata.name) {
            return Err(RegistryError::DuplicateTool(metadata.name));
        }

        for capability in &metadata.capabilities {
            self.capability_index.insert(
                (metadata.name.clone(), capability.name.clone()),
                capability.clone(),
            );
        }

        self.tools.insert(metadata.name.clone(), RegisteredTool { metadata, executor });
        Ok(())
    }

    pub fn resolve(&self, tool_name: &str, capability_name: &str) -> Result<CapabilityDescriptor, RegistryError> {
        if !self.tools.contains_key(tool_name) {
            return Err(RegistryError::UnknownTool(tool_name.to_string()));
        }
        self.capability_index
            .get(&(tool_name.to_string(), capability_name.to_string()))
            .map(|d| d.clone())
            .ok_or_else(|| RegistryError::UnknownCapability {
                tool_name: tool_name.to_string(),
                capability_name: capability_name.to_string(),
            })
    }

    pub fn metadata(&self, tool_name: &str) -> Option<ToolMetadata> {
        self.tools.get(tool_name).map(|t| t.metadata.clone())
    }

    pub fn executor(&self, tool_name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(tool_name).map(|t| t.executor.clone())
    }

    /// Effective set = `user ∪ system`, no inheritance.
    pub fn list_for_user(&self, user_id: &str) -> Vec<ToolMetadata> {
        let granted = self.effective_grants(user_id);
        self.tools
            .iter()
            .filter(|entry| granted.contains(entry.key()))
            .map(|entry| entry.metadata.clone())
            .collect()
    }

    fn effective_grants(&self, user_id: &str) -> HashSet<String> {
        let mut set = self.grants.get(user_id).map(|g| g.clone()).unwrap_or_default();
        if let Some(system) = self.grants.get(SYSTEM_USER) {
            set.extend(system.iter().cloned());
        }
        set
    }

    pub fn is_granted(&self, user_id: &str, tool_name: &str) -> bool {
        self.effective_grants(user_id).contains(tool_name)
    }

    pub fn grant(&self, user_id: &str, tool_name: &str) {
        self.grants.entry(user_id.to_string()).or_default().insert(tool_name.to_string());
        (self.on_invalidate)(user_id);
    }

    pub fn revoke(&self, user_id: &str, tool_name: &str) {
        if let Some(mut set) = self.grants.get_mut(user_id) {
            set.remove(tool_name);
        }
        (self.on_invalidate)(user_id);
    }

    /// Checks and consumes one slot of the tool's `rate_limit_per_minute`
    /// budget for `(tool_name, user_id)`. The limiter is built once per key
    /// from the tool's declared metadata and cached, so construction isn't
    /// repeated per request.
    pub fn check_rate_limit(&self, tool_name: &str, user_id: &str) -> Result<(), RegistryError> {
        let metadata = self
            .tools
            .get(tool_name)
            .ok_or_else(|| RegistryError::UnknownTool(tool_name.to_string()))?;
        let Some(per_minute) = metadata.metadata.rate_limit_per_minute else {
            return Ok(());
        };
        drop(metadata);

        let key = (tool_name.to_string(), user_id.to_string());
        let limiter = self
            .limiters
            .entry(key.clone())
            .or_insert_with(|| {
                let quota = Quota::per_minute(NonZeroU32::new(per_minute.max(1)).expect("non-zero checked above"));
                Arc::new(RateLimiter::direct(quota))
            })
            .clone();

        let clock = DefaultClock::default();
        limiter.check().map_err(|not_until| RegistryError::RateLimited {
            tool_name: tool_name.to_string(),
            user_id: user_id.to_string(),
            retry_after_ms: not_until.wait_time_from(clock.now()).as_millis() as u64,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dispatch::{DispatchError, ExecutionContext, ExecutorOutcome, Health, AdapterKind};
    use crate::domain::registry::{CredentialRef, ToolMetadata};
    use crate::domain::result::{ConfirmationPolicy, RiskLevel};
    use async_trait::async_trait;
    use serde_json::Value;

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

    fn sample_metadata(name: &str, rate_limit: Option<u32>) -> ToolMetadata {
        ToolMetadata {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: "test tool".to_string(),
            tool_type: "native".to_string(),
            capabilities: vec![CapabilityDescriptor {
                name: "read".to_string(),
                description: "read something".to_string(),
                input_schema: serde_json::json!({}),
                output_schema: serde_json::json!({}),
                examples: vec![],
            }],
            risk_level: RiskLevel::Low,
            requires_confirmation: false,
            confirmation_policy: ConfirmationPolicy::Auto,
            side_effects: vec![],
            required_permissions: vec![],
            rate_limit_per_minute: rate_limit,
            idempotent_capabilities: vec!["read".to_string()],
            computer_mode: None,
            credential: None::<CredentialRef>,
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        registry.register(sample_metadata("t", None), Arc::new(NoopExecutor)).unwrap();
        let err = registry.register(sample_metadata("t", None), Arc::new(NoopExecutor)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool(_)));
    }

    #[test]
    fn list_for_user_is_union_of_user_and_system_grants() {
        let registry = Registry::new();
        registry.register(sample_metadata("t1", None), Arc::new(NoopExecutor)).unwrap();
        registry.register(sample_metadata("t2", None), Arc::new(NoopExecutor)).unwrap();

        registry.grant(SYSTEM_USER, "t1");
        registry.grant("u1", "t2");

        let tools: HashSet<String> = registry.list_for_user("u1").into_iter().map(|m| m.name).collect();
        assert_eq!(tools, HashSet::from(["t1".to_string(), "t2".to_string()]));
    }

    #[test]
    fn revoke_removes_only_the_user_grant() {
        let registry = Registry::new();
        registry.register(sample_metadata("t1", None), Arc::new(NoopExecutor)).unwrap();
        registry.grant("u1", "t1");
        registry.revoke("u1", "t1");
        assert!(!registry.is_granted("u1", "t1"));
    }

    #[test]
    fn rate_limit_rejects_third_call_within_window() {
        let registry = Registry::new();
        registry.register(sample_metadata("t1", Some(2)), Arc::new(NoopExecutor)).unwrap();

        assert!(registry.check_rate_limit("t1", "u1").is_ok());
        assert!(registry.check_rate_limit("t1", "u1").is_ok());
        let err = registry.check_rate_limit("t1", "u1").unwrap_err();
        assert!(matches!(err, RegistryError::RateLimited { .. }));
    }

    #[test]
    fn grant_invalidation_hook_fires_on_grant_and_revoke() {
        let invalidated = Arc::new(std::sync::Mutex::new(Vec::new()));
        let invalidated_clone = invalidated.clone();
        let registry = Registry::with_invalidation_hook(move |user_id| {
            invalidated_clone.lock().unwrap().push(user_id.to_string());
        });
        registry.register(sample_metadata("t1", None), Arc::new(NoopExecutor)).unwrap();
        registry.grant("u1", "t1");
        registry.revoke("u1", "t1");
        assert_eq!(*invalidated.lock().unwrap(), vec!["u1".to_string(), "u1".to_string()]);
    }
}
