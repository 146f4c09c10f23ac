// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wraps the pure [`SecurityGate`] domain type with a per-tenant
//! [`ComputerMode`] override over a process-wide default, so one company can
//! run `dev` while every other tenant stays `restricted`.

use dashmap::DashMap;

use crate::domain::security_gate::{ComputerMode, RestrictedModeConfig, SecurityCheckResult, SecurityGate};

pub struct SecurityGateService {
    gate: SecurityGate,
    default_mode: ComputerMode,
    tenant_overrides: DashMap<String, ComputerMode>,
}

impl SecurityGateService {
    pub fn new(config: RestrictedModeConfig, default_mode: ComputerMode) -> Result<Self, crate::domain::security_gate::GateError> {
        Ok(Self {
            gate: SecurityGate::new(config)?,
            default_mode,
            tenant_overrides: DashMap::new(),
        })
    }

    pub fn set_tenant_mode(&self, company_id: &str, mode: ComputerMode) {
        self.tenant_overrides.insert(company_id.to_string(), mode);
    }

    pub fn clear_tenant_mode(&self, company_id: &str) {
        self.tenant_overrides.remove(company_id);
    }

    fn effective_mode(&self, company_id: &str) -> ComputerMode {
        self.tenant_overrides.get(company_id).map(|m| *m).unwrap_or(self.default_mode)
    }

    pub fn check_file_operation(
        &self,
        company_id: &str,
        operation: &str,
        file_path: &str,
        file_size: Option<u64>,
    ) -> SecurityCheckResult {
        self.gate.check_file_operation(self.effective_mode(company_id), operation, file_path, file_size)
    }

    pub fn check_browser_operation(&self, company_id: &str, url: &str) -> SecurityCheckResult {
        self.gate.check_browser_operation(self.effective_mode(company_id), url)
    }

    pub fn check_code_execution(&self, company_id: &str, code: &str, sandbox: bool) -> SecurityCheckResult {
        self.gate.check_code_execution(self.effective_mode(company_id), code, sandbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SecurityGateService {
        SecurityGateService::new(RestrictedModeConfig::default(), ComputerMode::Restricted).unwrap()
    }

    #[test]
    fn tenant_override_takes_precedence_over_process_default() {
        let service = service();
        let default_result = service.check_code_execution("acme", "print(1)", false);
        assert!(!default_result.allowed);

        service.set_tenant_mode("acme", ComputerMode::Dev);
        let overridden = service.check_code_execution("acme", "print(1)", false);
        assert!(overridden.allowed);
    }

    #[test]
    fn unrelated_tenant_keeps_the_process_default() {
        let service = service();
        service.set_tenant_mode("acme", ComputerMode::Dev);
        let result = service.check_code_execution("globex", "print(1)", false);
        assert!(!result.allowed);
    }

    #[test]
    fn clearing_a_tenant_override_restores_the_default() {
        let service = service();
        service.set_tenant_mode("acme", ComputerMode::Dev);
        service.clear_tenant_mode("acme");
        let result = service.check_file_operation("acme", "read", "/tmp/a.txt", None);
        assert!(result.allowed);
    }
}
