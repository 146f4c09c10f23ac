// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Security Gate — classifies file, browser, and code-execution requests as
//! allowed, denied, or requiring confirmation, per process-wide or
//! per-tenant mode. Ported from `computer_security_service.py`'s
//! three security layers (mode check, path/URL validation, confirmation
//! check).

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::errors::ErrorCode;
use crate::domain::result::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputerMode {
    /// Computer tools completely disabled.
    Off,
    /// Limited operations with allow/deny rules.
    Restricted,
    /// Full access. Development only.
    Dev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Allowed,
    Denied,
    RequiresConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityCheckResult {
    pub allowed: bool,
    pub result: OperationResult,
    pub reason: Option<String>,
    pub requires_confirmation: bool,
    pub confirmation_message: Option<String>,
    pub risk_level: RiskLevel,
}

impl SecurityCheckResult {
    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            result: OperationResult::Denied,
            reason: Some(reason.into()),
            requires_confirmation: false,
            confirmation_message: None,
            risk_level: RiskLevel::Low,
        }
    }

    fn allowed(risk_level: RiskLevel) -> Self {
        Self {
            allowed: true,
            result: OperationResult::Allowed,
            reason: None,
            requires_confirmation: false,
            confirmation_message: None,
            risk_level,
        }
    }

    fn requires_confirmation(message: impl Into<String>, risk_level: RiskLevel) -> Self {
        Self {
            allowed: true,
            result: OperationResult::RequiresConfirmation,
            reason: None,
            requires_confirmation: true,
            confirmation_message: Some(message.into()),
            risk_level,
        }
    }
}

/// Configuration for restricted mode. Defaults mirror the original
/// `RestrictedModeConfig`'s conservative baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictedModeConfig {
    pub allowed_paths: Vec<String>,
    pub denied_paths: Vec<String>,
    pub allowed_extensions: HashSet<String>,
    pub denied_extensions: HashSet<String>,
    pub allowed_url_patterns: Vec<String>,
    pub denied_url_patterns: Vec<String>,
    pub max_file_size: u64,
    pub confirmation_operations: HashSet<String>,
}

impl Default for RestrictedModeConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![
                "/tmp".to_string(),
                "~/projects".to_string(),
                "/var/log".to_string(),
            ],
            denied_paths: vec![
                "/etc/passwd".to_string(),
                "/etc/shadow".to_string(),
                "~/.ssh".to_string(),
                "~/.aws".to_string(),
                "~/.config/gcloud".to_string(),
                "*.pem".to_string(),
                "*.key".to_string(),
                "*credentials*".to_string(),
                "*secrets*".to_string(),
            ],
            allowed_extensions: [
                ".txt", ".json", ".csv", ".log", ".md", ".py", ".js", ".ts", ".html", ".css",
                ".yaml", ".yml", ".xml", ".toml",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            denied_extensions: [
                ".exe", ".dll", ".so", ".dylib", ".sh", ".bash", ".bat", ".cmd", ".ps1", ".pem",
                ".key", ".crt",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            allowed_url_patterns: vec![
                r"^https://docs\.".to_string(),
                r"^https://api\.".to_string(),
                r"^https://github\.com/".to_string(),
                r"^https://stackoverflow\.com/".to_string(),
            ],
            denied_url_patterns: vec![
                r"^file://".to_string(),
                r"^javascript:".to_string(),
                r"localhost".to_string(),
                r"127\.0\.0\.1".to_string(),
                r"192\.168\.".to_string(),
                r"10\.\d+\.\d+\.\d+".to_string(),
            ],
            max_file_size: 10 * 1024 * 1024,
            confirmation_operations: [
                "delete_file",
                "delete_directory",
                "execute_code",
                "execute_shell",
                "write_file",
                "move_file",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("policy denied: {0}")]
    Denied(String),
    #[error("invalid URL pattern: {0}")]
    InvalidPattern(String),
}

impl GateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GateError::Denied(_) => ErrorCode::PolicyDenied,
            GateError::InvalidPattern(_) => ErrorCode::InvalidEnvelope,
        }
    }
}

/// Dangerous substrings that downgrade code execution to requiring
/// confirmation at high risk.
const DANGEROUS_CODE_PATTERNS: &[&str] = &[
    r"os\.system",
    r"subprocess",
    r"eval\s*\(",
    r"exec\s*\(",
    r"__import__",
    r#"open\s*\([^)]*['"]w['"]"#,
    r"rm\s+-rf",
    r"chmod\s+777",
];

pub struct SecurityGate {
    config: RestrictedModeConfig,
    allowed_url_patterns: Vec<Regex>,
    denied_url_patterns: Vec<Regex>,
    dangerous_code_patterns: Vec<Regex>,
}

impl SecurityGate {
    pub fn new(config: RestrictedModeConfig) -> Result<Self, GateError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, GateError> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| GateError::InvalidPattern(e.to_string())))
                .collect()
        };

        Ok(Self {
            allowed_url_patterns: compile(&config.allowed_url_patterns)?,
            denied_url_patterns: compile(&config.denied_url_patterns)?,
            dangerous_code_patterns: DANGEROUS_CODE_PATTERNS
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).expect("static pattern is valid"))
                .collect(),
            config,
        })
    }

    pub fn check_file_operation(
        &self,
        mode: ComputerMode,
        operation: &str,
        file_path: &str,
        file_size: Option<u64>,
    ) -> SecurityCheckResult {
        match mode {
            ComputerMode::Off => SecurityCheckResult::denied("computer tools are disabled (mode: off)"),
            ComputerMode::Dev => SecurityCheckResult::allowed(RiskLevel::High),
            ComputerMode::Restricted => self.check_restricted_file_operation(operation, file_path, file_size),
        }
    }

    fn check_restricted_file_operation(
        &self,
        operation: &str,
        file_path: &str,
        file_size: Option<u64>,
    ) -> SecurityCheckResult {
        // Denied paths beat allowed paths.
        for denied in &self.config.denied_paths {
            if path_matches(denied, file_path) {
                return SecurityCheckResult::denied(format!("path is in denied list: {denied}"));
            }
        }

        let extension = Path::new(file_path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if self.config.denied_extensions.contains(&extension) {
            return SecurityCheckResult::denied(format!("file extension not allowed: {extension}"));
        }

        let path_allowed = self
            .config
            .allowed_paths
            .iter()
            .any(|allowed| path_matches(allowed, file_path));
        if !path_allowed {
            return SecurityCheckResult::denied("path not in allowed list");
        }

        if matches!(operation, "write" | "write_file") {
            if let Some(size) = file_size {
                if size > self.config.max_file_size {
                    return SecurityCheckResult::denied(format!(
                        "file size exceeds limit: {} > {}",
                        size, self.config.max_file_size
                    ));
                }
            }
        }

        if self.config.confirmation_operations.contains(operation) {
            return SecurityCheckResult::requires_confirmation(
                format!("confirm {operation} on {file_path}?"),
                RiskLevel::Medium,
            );
        }

        SecurityCheckResult::allowed(RiskLevel::Low)
    }

    pub fn check_browser_operation(&self, mode: ComputerMode, url: &str) -> SecurityCheckResult {
        match mode {
            ComputerMode::Off => SecurityCheckResult::denied("computer tools are disabled (mode: off)"),
            ComputerMode::Dev => SecurityCheckResult::allowed(RiskLevel::High),
            ComputerMode::Restricted => self.check_restricted_browser_operation(url),
        }
    }

    fn check_restricted_browser_operation(&self, url: &str) -> SecurityCheckResult {
        for pattern in &self.denied_url_patterns {
            if pattern.is_match(url) {
                return SecurityCheckResult::denied(format!("url matches denied pattern: {pattern}"));
            }
        }

        let url_allowed = self.allowed_url_patterns.iter().any(|p| p.is_match(url));
        if !url_allowed {
            return SecurityCheckResult::denied("url not in allowed list");
        }

        SecurityCheckResult::allowed(RiskLevel::Low)
    }

    pub fn check_code_execution(&self, mode: ComputerMode, code: &str, sandbox: bool) -> SecurityCheckResult {
        match mode {
            ComputerMode::Off => SecurityCheckResult::denied("computer tools are disabled (mode: off)"),
            ComputerMode::Dev => SecurityCheckResult::allowed(RiskLevel::Critical),
            ComputerMode::Restricted => {
                if !sandbox {
                    return SecurityCheckResult::denied("code execution requires sandbox in restricted mode");
                }

                // Multiple dangerous patterns aggregate but never escalate
                // past `high`.
                if self.dangerous_code_patterns.iter().any(|p| p.is_match(code)) {
                    return SecurityCheckResult::requires_confirmation(
                        "code contains a potentially dangerous pattern",
                        RiskLevel::High,
                    );
                }

                SecurityCheckResult::requires_confirmation("confirm execution of sandboxed code?", RiskLevel::Medium)
            }
        }
    }
}

/// Glob-style match with `*` wildcards and leading `~` expansion, matching
/// the original's regex-from-glob approach (`_path_matches`).
fn path_matches(pattern: &str, path: &str) -> bool {
    let expanded = expand_tilde(pattern);
    if !expanded.contains('*') {
        return path == expanded || path.starts_with(&format!("{expanded}/"));
    }
    let regex_source = format!("^{}$", regex::escape(&expanded).replace(r"\*", ".*"));
    Regex::new(&regex_source)
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}

fn expand_tilde(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), rest);
        }
    }
    pattern.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SecurityGate {
        SecurityGate::new(RestrictedModeConfig::default()).unwrap()
    }

    #[test]
    fn off_mode_denies_everything() {
        let result = gate().check_file_operation(ComputerMode::Off, "read", "/tmp/x.txt", None);
        assert!(!result.allowed);
    }

    #[test]
    fn restricted_mode_denies_denylisted_path_even_if_allowlisted() {
        let result = gate().check_file_operation(ComputerMode::Restricted, "read", "/etc/passwd", None);
        assert_eq!(result.result, OperationResult::Denied);
    }

    #[test]
    fn restricted_mode_requires_confirmation_for_write() {
        let result = gate().check_file_operation(ComputerMode::Restricted, "write_file", "/tmp/out.txt", Some(10));
        assert!(result.requires_confirmation);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn file_size_at_limit_is_allowed_over_limit_denied() {
        let g = gate();
        let at_limit = g.check_file_operation(ComputerMode::Restricted, "write", "/tmp/a.txt", Some(10 * 1024 * 1024));
        assert_ne!(at_limit.result, OperationResult::Denied);
        let over_limit =
            g.check_file_operation(ComputerMode::Restricted, "write", "/tmp/a.txt", Some(10 * 1024 * 1024 + 1));
        assert_eq!(over_limit.result, OperationResult::Denied);
    }

    #[test]
    fn code_exec_without_sandbox_denied_in_restricted_mode() {
        let result = gate().check_code_execution(ComputerMode::Restricted, "print(1)", false);
        assert!(!result.allowed);
    }

    #[test]
    fn code_exec_with_dangerous_pattern_requires_confirmation_high() {
        let result = gate().check_code_execution(ComputerMode::Restricted, "os.system('ls')", true);
        assert!(result.requires_confirmation);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn code_exec_without_dangerous_pattern_still_requires_confirmation_medium() {
        let result = gate().check_code_execution(ComputerMode::Restricted, "print('hello')", true);
        assert!(result.requires_confirmation);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn browser_deny_beats_allow() {
        let result = gate().check_browser_operation(ComputerMode::Restricted, "https://docs.localhost/x");
        assert_eq!(result.result, OperationResult::Denied);
    }

    #[test]
    fn dev_mode_allows_everything_at_high_risk() {
        let result = gate().check_file_operation(ComputerMode::Dev, "delete_file", "/etc/shadow", None);
        assert!(result.allowed);
        assert_eq!(result.risk_level, RiskLevel::High);
    }
}
