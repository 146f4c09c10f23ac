// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Prompt Composer: assembles the 3-part (policy, domain, task) system
//! prompt plus a per-user tool catalog, ported from
//! `prompt_strategy_service.py`'s `to_prompt()` methods.

use std::sync::Arc;

use dashmap::DashMap;

use crate::application::registry_service::RegistryService;
use crate::infrastructure::prompt_cache::PromptCache;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};

/// Operating system a command-executor-style tool's hints are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Linux,
    MacOs,
    Windows,
}

pub struct CommandHints {
    pub os: TargetOs,
}

impl CommandHints {
    pub fn render(&self) -> String {
        match self.os {
            TargetOs::Linux => {
                "Shell commands run under `/bin/sh`. Use POSIX paths (`/`). Prefer `ls`, `grep`, `find`.".to_string()
            }
            TargetOs::MacOs => {
                "Shell commands run under `/bin/zsh`. Use POSIX paths (`/`). BSD tool flags differ from GNU (e.g. `sed -i ''`).".to_string()
            }
            TargetOs::Windows => {
                "Commands run under PowerShell. Use `\\` or `/` paths. Prefer `Get-ChildItem`, `Select-String`.".to_string()
            }
        }
    }
}

/// Company-wide rules, role constraints, permissions, forbidden actions, and
/// data-handling directives.
#[derive(Debug, Clone, Default)]
pub struct PolicyPrompt {
    pub company_rules: Vec<String>,
    pub role_constraints: Vec<String>,
    pub permissions: Vec<String>,
    pub forbidden_actions: Vec<String>,
    pub data_handling: Vec<String>,
}

impl PolicyPrompt {
    pub fn render(&self) -> String {
        let mut out = String::from("# Policy\n");
        push_bullets(&mut out, "Company rules", &self.company_rules);
        push_bullets(&mut out, "Role constraints", &self.role_constraints);
        push_bullets(&mut out, "Permissions", &self.permissions);
        push_bullets(&mut out, "Forbidden actions", &self.forbidden_actions);
        push_bullets(&mut out, "Data handling", &self.data_handling);
        out
    }

    /// Built-in per-role constraint sets, mirroring the original's
    /// operator/supervisor/admin tiers.
    pub fn for_role(role: &str) -> Self {
        let role_constraints = match role {
            "operator" => vec![
                "May read and execute pre-approved workflows only.".to_string(),
                "May not modify system configuration.".to_string(),
            ],
            "supervisor" => vec![
                "May approve confirmation-gated operations for their site.".to_string(),
                "May not change tenant-wide security mode.".to_string(),
            ],
            "admin" => vec!["May change tenant-wide security mode and manage tool grants.".to_string()],
            _ => vec!["Default role: read-only access to granted tools.".to_string()],
        };
        Self {
            role_constraints,
            data_handling: vec!["Never include credentials or secrets in tool output shown to the user.".to_string()],
            ..Default::default()
        }
    }
}

/// Selects a domain template by explicit configuration — never by scanning
/// the user's message for keywords.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainKey(pub String);

impl DomainKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DomainPrompt {
    pub name: String,
    pub terminology: Vec<(String, String)>,
    pub domain_rules: Vec<String>,
}

impl DomainPrompt {
    pub fn render(&self) -> String {
        let mut out = format!("# Domain: {}\n", self.name);
        if !self.terminology.is_empty() {
            out.push_str("Terminology:\n");
            for (term, meaning) in &self.terminology {
                out.push_str(&format!("- {term}: {meaning}\n"));
            }
        }
        push_bullets(&mut out, "Domain rules", &self.domain_rules);
        out
    }
}

fn push_bullets(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("{heading}:\n"));
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
}

#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPrompt {
    pub user_message: String,
    pub conversation: Vec<ConversationTurn>,
    pub intent: Option<String>,
    pub entities: Vec<(String, String)>,
    /// Handlebars template rendered against `intent`/`entities`, matching
    /// the Task section's `additional_context` field.
    pub additional_context_template: Option<String>,
}

const MAX_MESSAGE_CHARS: usize = 2000;
const ELLIPSIS: &str = "…";

fn truncate_message(content: &str) -> String {
    if content.chars().count() <= MAX_MESSAGE_CHARS {
        return content.to_string();
    }
    let truncated: String = content.chars().take(MAX_MESSAGE_CHARS).collect();
    format!("{truncated}{ELLIPSIS}")
}

/// Character budget = `max_tokens * 4`. Messages are considered newest-first
/// and added to the buffer until the next one would exceed budget, then the
/// buffer is reversed to chronological order. A first message that alone
/// exceeds budget is excluded, leaving the context empty.
pub fn truncate_conversation(turns: &[ConversationTurn], max_tokens: usize) -> Vec<ConversationTurn> {
    let budget = max_tokens.saturating_mul(4);
    let mut buffer = Vec::new();
    let mut used = 0usize;

    for turn in turns.iter().rev() {
        let content = truncate_message(&turn.content);
        let len = content.chars().count();
        if used + len > budget {
            break;
        }
        used += len;
        buffer.push(ConversationTurn { role: turn.role.clone(), content });
    }

    buffer.reverse();
    buffer
}

pub struct ComposeRequest<'a> {
    pub user_id: &'a str,
    pub role: &'a str,
    pub domain: DomainKey,
    pub os: TargetOs,
    pub max_conversation_tokens: usize,
    pub task: TaskPrompt,
}

pub struct PromptComposer {
    registry: Arc<RegistryService>,
    catalog_cache: Arc<PromptCache>,
    template_engine: PromptTemplateEngine,
    domains: DashMap<DomainKey, DomainPrompt>,
}

impl PromptComposer {
    pub fn new(registry: Arc<RegistryService>, catalog_cache: Arc<PromptCache>) -> Self {
        let composer = Self {
            registry,
            catalog_cache,
            template_engine: PromptTemplateEngine::new(),
            domains: DashMap::new(),
        };
        composer.register_builtin_domains();
        composer
    }

    fn register_builtin_domains(&self) {
        let builtins = [
            DomainPrompt {
                name: "scada".to_string(),
                terminology: vec![
                    ("PLC".to_string(), "Programmable Logic Controller".to_string()),
                    ("HMI".to_string(), "Human-Machine Interface".to_string()),
                ],
                domain_rules: vec!["Never issue a setpoint change without an explicit operator confirmation.".to_string()],
            },
            DomainPrompt {
                name: "maintenance".to_string(),
                terminology: vec![("PM".to_string(), "Preventive Maintenance".to_string())],
                domain_rules: vec!["Schedule changes must reference an existing asset ID.".to_string()],
            },
            DomainPrompt {
                name: "workorder".to_string(),
                terminology: vec![("WO".to_string(), "Work Order".to_string())],
                domain_rules: vec!["Closing a work order requires a completion note.".to_string()],
            },
            DomainPrompt {
                name: "datascience".to_string(),
                terminology: vec![("EDA".to_string(), "Exploratory Data Analysis".to_string())],
                domain_rules: vec!["Never execute a query against production without a row-limit clause.".to_string()],
            },
            DomainPrompt {
                name: "mes".to_string(),
                terminology: vec![("MES".to_string(), "Manufacturing Execution System".to_string())],
                domain_rules: vec!["Batch genealogy changes must be traceable to a lot number.".to_string()],
            },
        ];
        for domain in builtins {
            self.domains.insert(DomainKey::new(domain.name.clone()), domain);
        }
    }

    pub fn register_domain(&self, key: DomainKey, prompt: DomainPrompt) {
        self.domains.insert(key, prompt);
    }

    fn tool_catalog_section(&self, user_id: &str, os: TargetOs) -> String {
        if let Some(cached) = self.catalog_cache.get(user_id) {
            return cached;
        }

        let tools = self.registry.list_for_user(user_id);
        let mut out = String::from("# Tool Catalog\n");
        for tool in &tools {
            out.push_str(&format!("## {} (v{})\n{}\n", tool.name, tool.version, tool.description));
            for capability in &tool.capabilities {
                out.push_str(&format!("- {}: {}\n", capability.name, capability.description));
            }
        }
        out.push_str("\nCommand hints:\n");
        out.push_str(&CommandHints { os }.render());
        out.push_str("\nOrdering: the final step's output becomes the user's response.\n");

        self.catalog_cache.put(user_id, out.clone());
        out
    }

    fn render_task_section(&self, task: &TaskPrompt, max_conversation_tokens: usize) -> String {
        let mut out = String::from("# Task\n\n");

        if let Some(intent) = &task.intent {
            out.push_str(&format!("Intent: {intent}\n"));
        }
        if !task.entities.is_empty() {
            out.push_str("Entities:\n");
            for (key, value) in &task.entities {
                out.push_str(&format!("- {key}: {value}\n"));
            }
        }

        let truncated = truncate_conversation(&task.conversation, max_conversation_tokens);
        if !truncated.is_empty() {
            out.push_str("\nRecent conversation:\n");
            for turn in &truncated {
                out.push_str(&format!("{}: {}\n", turn.role, turn.content));
            }
        }

        if let Some(template) = &task.additional_context_template {
            let mut context = PromptContext::new();
            if let Some(intent) = &task.intent {
                context = context.extra("intent", serde_json::Value::String(intent.clone()));
            }
            for (key, value) in &task.entities {
                context = context.extra(key.clone(), serde_json::Value::String(value.clone()));
            }
            if let Ok(rendered) = self.template_engine.render(template, &context) {
                out.push_str(&format!("\nAdditional context:\n{rendered}\n"));
            }
        }

        out.push_str(&format!("\nUser: {}\n", task.user_message));
        out
    }

    pub fn compose(&self, request: ComposeRequest<'_>) -> String {
        let policy = PolicyPrompt::for_role(request.role).render();
        let domain = self
            .domains
            .get(&request.domain)
            .map(|d| d.render())
            .unwrap_or_else(|| format!("# Domain: {}\n(no template registered)\n", request.domain.0));
        let catalog = self.tool_catalog_section(request.user_id, request.os);
        let task = self.render_task_section(&request.task, request.max_conversation_tokens);

        format!("{policy}\n{domain}\n{catalog}\n{task}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn composer() -> PromptComposer {
        let cache = Arc::new(PromptCache::new(Duration::from_secs(300)));
        let registry = Arc::new(RegistryService::new(cache.clone()));
        PromptComposer::new(registry, cache)
    }

    #[test]
    fn builtin_domains_are_registered_at_construction() {
        let composer = composer();
        assert!(composer.domains.contains_key(&DomainKey::new("scada")));
        assert!(composer.domains.contains_key(&DomainKey::new("mes")));
    }

    #[test]
    fn unregistered_domain_renders_a_placeholder_rather_than_panicking() {
        let composer = composer();
        let request = ComposeRequest {
            user_id: "u1",
            role: "operator",
            domain: DomainKey::new("nonexistent"),
            os: TargetOs::Linux,
            max_conversation_tokens: 100,
            task: TaskPrompt { user_message: "hi".to_string(), ..Default::default() },
        };
        let prompt = composer.compose(request);
        assert!(prompt.contains("no template registered"));
    }

    #[test]
    fn message_over_2000_chars_is_truncated_with_ellipsis() {
        let long = "a".repeat(2500);
        let turns = vec![ConversationTurn { role: "user".to_string(), content: long }];
        let truncated = truncate_conversation(&turns, 10_000);
        assert_eq!(truncated.len(), 1);
        assert!(truncated[0].content.ends_with(ELLIPSIS));
        assert_eq!(truncated[0].content.chars().count(), MAX_MESSAGE_CHARS + 1);
    }

    #[test]
    fn oversized_first_message_leaves_context_empty() {
        let turns = vec![ConversationTurn { role: "user".to_string(), content: "x".repeat(50) }];
        let truncated = truncate_conversation(&turns, 1);
        assert!(truncated.is_empty());
    }

    #[test]
    fn newest_first_fill_then_chronological_reverse() {
        let turns = vec![
            ConversationTurn { role: "user".to_string(), content: "first".to_string() },
            ConversationTurn { role: "assistant".to_string(), content: "second".to_string() },
            ConversationTurn { role: "user".to_string(), content: "third".to_string() },
        ];
        // Budget fits only the newest two messages ("third" + "second").
        let truncated = truncate_conversation(&turns, 3);
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].content, "second");
        assert_eq!(truncated[1].content, "third");
    }

    #[test]
    fn catalog_is_cached_after_first_composition() {
        let composer = composer();
        composer.registry.register(
            crate::domain::registry::ToolMetadata {
                name: "t1".to_string(),
                version: "1.0.0".to_string(),
                description: "desc".to_string(),
                tool_type: "native".to_string(),
                capabilities: vec![],
                risk_level: crate::domain::result::RiskLevel::Low,
                requires_confirmation: false,
                confirmation_policy: crate::domain::result::ConfirmationPolicy::Auto,
                side_effects: vec![],
                required_permissions: vec![],
                rate_limit_per_minute: None,
                idempotent_capabilities: vec![],
                computer_mode: None,
                credential: None,
            },
            Arc::new(NoopExecutorForTest),
        )
        .unwrap();
        composer.registry.grant("u1", "t1");

        let first = composer.tool_catalog_section("u1", TargetOs::Linux);
        composer.registry.revoke("u1", "t1");
        // Directly re-populate the cache to prove the cached value (not a
        // fresh registry read) is what's served on the second call.
        composer.catalog_cache.put("u1", first.clone());
        let second = composer.tool_catalog_section("u1", TargetOs::Linux);
        assert_eq!(first, second);
    }

    struct NoopExecutorForTest;

    #[async_trait::async_trait]
    impl crate::domain::dispatch::ToolExecutor for NoopExecutorForTest {
        async fn execute(
            &self,
            _capability: &str,
            _input: serde_json::Value,
            _ctx: &crate::domain::dispatch::ExecutionContext,
        ) -> Result<crate::domain::dispatch::ExecutorOutcome, crate::domain::dispatch::DispatchError> {
            Ok(crate::domain::dispatch::ExecutorOutcome { success: true, data: None, error: None })
        }
        async fn health_check(&self) -> crate::domain::dispatch::Health {
            crate::domain::dispatch::Health { healthy: true, component: "noop".to_string(), message: None }
        }
        async fn validate_input(&self, _capability: &str, _input: &serde_json::Value) -> Vec<String> {
            Vec::new()
        }
        fn get_capabilities(&self) -> Vec<String> {
            vec![]
        }
        fn adapter_kind(&self) -> crate::domain::dispatch::AdapterKind {
            crate::domain::dispatch::AdapterKind::InProcess
        }
    }
}
