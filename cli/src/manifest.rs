// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Loads a local tool manifest (tool metadata + per-user grants) and wires
//! it into a live `RegistryService`, so the admin commands can exercise the
//! real substrate without a running daemon.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aegis_orchestrator_core::application::RegistryService;
use aegis_orchestrator_core::domain::registry::ToolMetadata;
use aegis_orchestrator_core::domain::dispatch::{AdapterKind, DispatchError, ExecutionContext, ExecutorOutcome, Health, ToolExecutor};
use aegis_orchestrator_core::infrastructure::prompt_cache::PromptCache;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub tools: Vec<ToolMetadata>,
    /// `user_id` -> set of granted tool names. The sentinel user
    /// `"system"` grants every tool to every user.
    #[serde(default)]
    pub grants: HashMap<String, Vec<String>>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Read { path: path.to_path_buf(), source })?;
        serde_yaml::from_str(&contents).map_err(|source| ManifestError::Parse { path: path.to_path_buf(), source })
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents).map_err(|source| ManifestError::Write { path: path.to_path_buf(), source })
    }

    pub fn grant(&mut self, user_id: &str, tool_name: &str) {
        let set = self.grants.entry(user_id.to_string()).or_default();
        if !set.iter().any(|t| t == tool_name) {
            set.push(tool_name.to_string());
        }
    }

    pub fn revoke(&mut self, user_id: &str, tool_name: &str) {
        if let Some(set) = self.grants.get_mut(user_id) {
            set.retain(|t| t != tool_name);
        }
    }
}

/// Every manifest tool is backed by an `InProcessExecutor` whose every
/// declared capability echoes its input back as `data` — enough to drive
/// the Registry, Security Gate, Idempotency Store, and Dispatcher through
/// their real code paths from the command line without a real backend.
struct EchoExecutor {
    capabilities: Vec<String>,
}

#[async_trait]
impl ToolExecutor for EchoExecutor {
    async fn execute(&self, _capability: &str, input: Value, _context: &ExecutionContext) -> Result<ExecutorOutcome, DispatchError> {
        Ok(ExecutorOutcome { success: true, data: Some(input), error: None })
    }

    async fn health_check(&self) -> Health {
        Health { healthy: true, component: "echo".to_string(), message: None }
    }

    async fn validate_input(&self, _capability: &str, _input: &Value) -> Vec<String> {
        Vec::new()
    }

    fn get_capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::InProcess
    }
}

/// Builds a `RegistryService` from the manifest: registers every tool
/// behind an echo executor, and applies every recorded grant.
pub fn build_registry(manifest: &Manifest) -> Arc<RegistryService> {
    let cache = Arc::new(PromptCache::new(Duration::from_secs(300)));
    let registry = Arc::new(RegistryService::new(cache));

    for tool in &manifest.tools {
        let capabilities: Vec<String> = tool.capabilities.iter().map(|c| c.name.clone()).collect();
        let executor = Arc::new(EchoExecutor { capabilities });
        if let Err(e) = registry.register(tool.clone(), executor) {
            tracing::warn!(tool = %tool.name, error = %e, "skipping duplicate tool in manifest");
        }
    }

    for (user_id, tools) in &manifest.grants {
        for tool_name in tools {
            registry.grant(user_id, tool_name);
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_is_idempotent() {
        let mut manifest = Manifest::default();
        manifest.grant("u1", "t1");
        manifest.grant("u1", "t1");
        assert_eq!(manifest.grants.get("u1").unwrap().len(), 1);
    }

    #[test]
    fn revoke_removes_only_the_named_tool() {
        let mut manifest = Manifest::default();
        manifest.grant("u1", "t1");
        manifest.grant("u1", "t2");
        manifest.revoke("u1", "t1");
        assert_eq!(manifest.grants.get("u1").unwrap(), &vec!["t2".to_string()]);
    }

    #[test]
    fn round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");

        let mut manifest = Manifest::default();
        manifest.grant("system", "echo");
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded.grants.get("system").unwrap(), &vec!["echo".to_string()]);
    }
}
