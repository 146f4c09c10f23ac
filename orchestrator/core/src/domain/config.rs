// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process-wide configuration for the tool execution substrate: the
//! default Security Gate mode and its restricted-mode rules, Idempotency
//! Store TTL/bound, and the Prompt Composer's catalog cache TTL.
//!
//! Loaded from YAML, then overridden by `AEGIS_*` environment variables —
//! the same discovery-then-override shape used throughout the rest of the
//! AEGIS stack.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::security_gate::{ComputerMode, RestrictedModeConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid environment variable {name}: {value}")]
    InvalidEnvValue { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub default_mode: ComputerMode,
    pub restricted: RestrictedModeConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { default_mode: ComputerMode::Restricted, restricted: RestrictedModeConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub default_ttl_seconds: u64,
    pub max_records: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { default_ttl_seconds: 3600, max_records: 10_000 }
    }
}

impl IdempotencyConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCacheConfig {
    pub ttl_seconds: u64,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

impl PromptCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub security: SecurityConfig,
    pub idempotency: IdempotencyConfig,
    pub prompt_cache: PromptCacheConfig,
}

impl Config {
    /// Discovery order: explicit `path`, then `./aegis-config.yaml`, then
    /// `~/.aegis/config.yaml`, then `/etc/aegis/config.yaml`. Falls back to
    /// `Config::default()` if none exist. Environment overrides always
    /// apply, even over the default.
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let discovered = path.or_else(Self::discover);

        let mut config = match discovered {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("./aegis-config.yaml"),
            dirs::home_dir().map(|h| h.join(".aegis/config.yaml")).unwrap_or_default(),
            PathBuf::from("/etc/aegis/config.yaml"),
        ];
        candidates.into_iter().find(|p| p.exists())
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("AEGIS_SECURITY_MODE") {
            self.security.default_mode = match value.to_lowercase().as_str() {
                "off" => ComputerMode::Off,
                "restricted" => ComputerMode::Restricted,
                "dev" => ComputerMode::Dev,
                _ => return Err(ConfigError::InvalidEnvValue { name: "AEGIS_SECURITY_MODE", value }),
            };
        }

        if let Ok(value) = std::env::var("AEGIS_IDEMPOTENCY_TTL_SECONDS") {
            self.idempotency.default_ttl_seconds = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue { name: "AEGIS_IDEMPOTENCY_TTL_SECONDS", value })?;
        }

        if let Ok(value) = std::env::var("AEGIS_IDEMPOTENCY_MAX_RECORDS") {
            self.idempotency.max_records = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue { name: "AEGIS_IDEMPOTENCY_MAX_RECORDS", value })?;
        }

        if let Ok(value) = std::env::var("AEGIS_PROMPT_CACHE_TTL_SECONDS") {
            self.prompt_cache.ttl_seconds = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue { name: "AEGIS_PROMPT_CACHE_TTL_SECONDS", value })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idempotency.max_records == 0 {
            return Err(ConfigError::Invalid("idempotency.max_records must be greater than zero".to_string()));
        }
        if self.idempotency.default_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("idempotency.default_ttl_seconds must be greater than zero".to_string()));
        }
        if self.prompt_cache.ttl_seconds == 0 {
            return Err(ConfigError::Invalid("prompt_cache.ttl_seconds must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_max_records_fails_validation() {
        let mut config = Config::default();
        config.idempotency.max_records = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_round_trips_through_from_file() {
        let dir = std::env::temp_dir().join(format!("aegis-config-test-{:p}", &dir_marker()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, "security:\n  default_mode: dev\nidempotency:\n  max_records: 42\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.security.default_mode, ComputerMode::Dev);
        assert_eq!(config.idempotency.max_records, 42);

        std::fs::remove_dir_all(&dir).ok();
    }

    fn dir_marker() -> Box<u8> {
        Box::new(0)
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = Config::load_or_default(Some(PathBuf::from("/nonexistent/aegis-config.yaml")));
        assert!(config.is_err());
    }
}
