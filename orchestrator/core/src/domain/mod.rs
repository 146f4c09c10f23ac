// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod idempotency;
pub mod path_sanitizer;
pub mod registry;
pub mod result;
pub mod security_gate;

pub use config::{Config, ConfigError, IdempotencyConfig, PromptCacheConfig, SecurityConfig};
pub use envelope::{Envelope, InvalidEnvelope, ToolCallContext, WireRequest};
pub use errors::{ErrorCode, OrchestratorError, PolicyViolation};
pub use events::{EventIdentity, ToolEvent, ToolEventType};
pub use idempotency::{IdempotencyError, IdempotencyRecord, IdempotencyStats};
pub use registry::{CapabilityDescriptor, CredentialRef, RegistryError, ToolMetadata, SYSTEM_USER};
pub use result::{
    AuditEntry, CancellationReason, ConfirmationPolicy, IdempotencyStatus, OperationType, RiskLevel, ToolResult,
};
pub use security_gate::{ComputerMode, GateError, OperationResult, RestrictedModeConfig, SecurityCheckResult, SecurityGate};
pub use path_sanitizer::{PathSanitizer, PathSanitizerError};
