// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Idempotency record shape and statistics. The store
//! itself — the concurrent map plus completion signals — lives in
//! [`crate::infrastructure::idempotency_store`]; this module holds the
//! value types it operates on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::errors::ErrorCode;
use crate::domain::result::{IdempotencyStatus, ToolResult};

/// Per-key record. A key is either absent, `in_progress` (with a waiter
/// list held by the store), or completed with a cached result; expired
/// records are purged or treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub request_id: uuid::Uuid,
    pub tool_name: String,
    pub capability_name: String,
    pub company_id: String,
    pub user_id: String,
    pub status: IdempotencyStatus,
    pub result: Option<ToolResult>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdempotencyStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub duplicates_prevented: u64,
    pub in_progress_count: u64,
    pub cleanups_run: u64,
}

impl IdempotencyStats {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("wait for idempotency key '{0}' timed out")]
    WaitTimeout(String),
}

impl IdempotencyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IdempotencyError::WaitTimeout(_) => ErrorCode::Timeout,
        }
    }
}
