// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Idempotency Store. `DashMap`-backed, generalizing the
//! original `idempotency_service.py`'s single `asyncio.Lock`-guarded dict
//! into per-key concurrent access with a `tokio::sync::Notify` completion
//! signal per in-progress entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::debug;

use crate::domain::idempotency::{IdempotencyError, IdempotencyRecord, IdempotencyStats};
use crate::domain::result::{IdempotencyStatus, ToolResult};

struct Entry {
    record: IdempotencyRecord,
    completion: Arc<Notify>,
}

/// What `check` reports before the Orchestrator decides how to proceed.
pub enum CheckOutcome {
    New,
    InProgress,
    Duplicate(ToolResult),
    Expired,
}

/// What `begin` reports: whether this caller won the right to execute, or
/// lost a race to a caller already in flight for the same key.
pub enum ClaimOutcome {
    Claimed,
    InProgress,
}

pub struct IdempotencyStore {
    entries: DashMap<String, Entry>,
    stats: std::sync::Mutex<IdempotencyStats>,
    default_ttl: Duration,
    max_records: usize,
}

impl IdempotencyStore {
    pub fn new(default_ttl: Duration, max_records: usize) -> Self {
        Self {
            entries: DashMap::new(),
            stats: std::sync::Mutex::new(IdempotencyStats::default()),
            default_ttl,
            max_records,
        }
    }

    pub fn stats(&self) -> IdempotencyStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_stat(&self, f: impl FnOnce(&mut IdempotencyStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats);
    }

    /// Resolves `key`'s current status. Deletes (and reports `Expired`)
    /// records past `expires_at` rather than serving stale data.
    pub fn check(&self, key: &str) -> CheckOutcome {
        self.record_stat(|s| s.total_requests += 1);

        let now = Utc::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.record.is_expired_at(now) => true,
            Some(entry) => {
                return match entry.record.status {
                    IdempotencyStatus::InProgress => {
                        self.record_stat(|s| s.cache_misses += 1);
                        CheckOutcome::InProgress
                    }
                    _ => match &entry.record.result {
                        Some(result) => {
                            self.record_stat(|s| {
                                s.cache_hits += 1;
                                s.duplicates_prevented += 1;
                            });
                            CheckOutcome::Duplicate(result.as_cached_duplicate(entry.record.created_at))
                        }
                        None => {
                            self.record_stat(|s| s.cache_misses += 1);
                            CheckOutcome::New
                        }
                    },
                };
            }
            None => false,
        };

        if expired {
            self.entries.remove(key);
            self.record_stat(|s| s.cache_misses += 1);
            return CheckOutcome::Expired;
        }

        self.record_stat(|s| s.cache_misses += 1);
        CheckOutcome::New
    }

    fn new_in_progress_record(
        &self,
        key: &str,
        request_id: uuid::Uuid,
        tool_name: &str,
        capability_name: &str,
        company_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyRecord {
        IdempotencyRecord {
            idempotency_key: key.to_string(),
            request_id,
            tool_name: tool_name.to_string(),
            capability_name: capability_name.to_string(),
            company_id: company_id.to_string(),
            user_id: user_id.to_string(),
            status: IdempotencyStatus::InProgress,
            result: None,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(self.default_ttl).unwrap_or(chrono::Duration::hours(1)),
            last_accessed_at: now,
        }
    }

    /// Atomically claims `key` for execution: inserts an `in_progress`
    /// record with a fresh completion signal only if no live `in_progress`
    /// entry already occupies the slot, via `DashMap`'s `entry` API rather
    /// than a separate check-then-insert, so two callers racing on the same
    /// key after both observing `CheckOutcome::New` cannot both claim it.
    /// The loser gets `ClaimOutcome::InProgress` and must `wait` instead of
    /// dispatching. Also immediately enforces the LRU bound so it never
    /// overshoots under burst load (a mechanical strengthening of the
    /// original, which only evicted from the periodic cleanup loop).
    pub fn begin(
        &self,
        key: &str,
        request_id: uuid::Uuid,
        tool_name: &str,
        capability_name: &str,
        company_id: &str,
        user_id: &str,
    ) -> ClaimOutcome {
        use dashmap::mapref::entry::Entry as MapEntry;

        let now = Utc::now();

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let live = occupied.get().record.status == IdempotencyStatus::InProgress && !occupied.get().record.is_expired_at(now);
                if live {
                    return ClaimOutcome::InProgress;
                }
                let completion = Arc::new(Notify::new());
                let record = self.new_in_progress_record(key, request_id, tool_name, capability_name, company_id, user_id, now);
                occupied.insert(Entry { record, completion });
                // Drop the shard guard before `enforce_bound` walks the map,
                // which would otherwise re-lock the same shard and deadlock.
                drop(occupied);
                self.record_stat(|s| s.in_progress_count += 1);
                self.enforce_bound();
                ClaimOutcome::Claimed
            }
            MapEntry::Vacant(vacant) => {
                let completion = Arc::new(Notify::new());
                let record = self.new_in_progress_record(key, request_id, tool_name, capability_name, company_id, user_id, now);
                vacant.insert(Entry { record, completion });
                self.record_stat(|s| s.in_progress_count += 1);
                self.enforce_bound();
                ClaimOutcome::Claimed
            }
        }
    }

    /// Stores the completed result and wakes every waiter.
    pub fn complete(&self, key: &str, result: ToolResult) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.record.status = IdempotencyStatus::New;
            entry.record.result = Some(result);
            entry.record.last_accessed_at = Utc::now();
            entry.completion.notify_waiters();
        }
        self.record_stat(|s| s.in_progress_count = s.in_progress_count.saturating_sub(1));
    }

    /// Removes the record outright: failed operations must be retryable and
    /// are never cached.
    pub fn fail(&self, key: &str) {
        if let Some((_, entry)) = self.entries.remove(key) {
            entry.completion.notify_waiters();
        }
        self.record_stat(|s| s.in_progress_count = s.in_progress_count.saturating_sub(1));
    }

    /// Suspends until `complete` fires or `timeout` elapses, returning the
    /// cached Result or `None` if the wait timed out (caller re-executes).
    pub async fn wait(&self, key: &str, timeout: Duration) -> Result<Option<ToolResult>, IdempotencyError> {
        let completion = match self.entries.get(key) {
            Some(entry) => entry.completion.clone(),
            None => return Ok(None),
        };

        let notified = completion.notified();
        if tokio::time::timeout(timeout, notified).await.is_err() {
            return Err(IdempotencyError::WaitTimeout(key.to_string()));
        }

        Ok(self.entries.get(key).and_then(|e| e.record.result.clone()))
    }

    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.record.is_expired_at(now))
            .map(|e| e.key().clone())
            .collect();
        let removed = expired_keys.len();
        for key in expired_keys {
            self.entries.remove(&key);
        }
        self.record_stat(|s| s.cleanups_run += 1);
        debug!(removed, "idempotency cleanup pass");
        removed
    }

    /// Evicts oldest-by-`last_accessed_at` until the store is within bound.
    pub fn enforce_bound(&self) {
        if self.entries.len() <= self.max_records {
            return;
        }
        let mut by_access: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.record.last_accessed_at))
            .collect();
        by_access.sort_by_key(|(_, at)| *at);
        let overflow = self.entries.len() - self.max_records;
        for (key, _) in by_access.into_iter().take(overflow) {
            self.entries.remove(&key);
        }
    }

    /// Spawns the background cleanup loop; the returned handle may be
    /// dropped or aborted to stop it.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.cleanup();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::OperationType;

    fn store() -> IdempotencyStore {
        IdempotencyStore::new(Duration::from_secs(3600), 10_000)
    }

    fn sample_result(req: uuid::Uuid) -> ToolResult {
        ToolResult::failure(req, req, None, OperationType::Read, "ignored", "placeholder").with_retry_after_ms(0)
    }

    #[test]
    fn check_begin_complete_check_round_trip() {
        let store = store();
        let req = uuid::Uuid::new_v4();
        assert!(matches!(store.check("k1"), CheckOutcome::New));
        store.begin("k1", req, "t", "c", "acme", "u1");
        let mut result = sample_result(req);
        result.success = true;
        store.complete("k1", result);

        match store.check("k1") {
            CheckOutcome::Duplicate(r) => assert_eq!(r.idempotency_status, IdempotencyStatus::Duplicate),
            _ => panic!("expected duplicate"),
        }
    }

    #[test]
    fn check_begin_fail_check_never_caches_failure() {
        let store = store();
        let req = uuid::Uuid::new_v4();
        assert!(matches!(store.check("k2"), CheckOutcome::New));
        store.begin("k2", req, "t", "c", "acme", "u1");
        store.fail("k2");
        assert!(matches!(store.check("k2"), CheckOutcome::New));
    }

    #[tokio::test]
    async fn waiter_receives_result_once_complete_fires() {
        let store = Arc::new(store());
        let req = uuid::Uuid::new_v4();
        store.begin("k3", req, "t", "c", "acme", "u1");

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move { waiter_store.wait("k3", Duration::from_secs(1)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut result = sample_result(req);
        result.success = true;
        store.complete("k3", result);

        let outcome = waiter.await.unwrap().unwrap();
        assert!(outcome.is_some());
    }

    #[tokio::test]
    async fn wait_times_out_when_never_completed() {
        let store = store();
        let req = uuid::Uuid::new_v4();
        store.begin("k4", req, "t", "c", "acme", "u1");
        let result = store.wait("k4", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(IdempotencyError::WaitTimeout(_))));
    }

    #[test]
    fn enforce_bound_evicts_oldest_by_last_accessed() {
        let store = IdempotencyStore::new(Duration::from_secs(3600), 2);
        store.begin("k1", uuid::Uuid::new_v4(), "t", "c", "acme", "u1");
        std::thread::sleep(Duration::from_millis(5));
        store.begin("k2", uuid::Uuid::new_v4(), "t", "c", "acme", "u1");
        std::thread::sleep(Duration::from_millis(5));
        store.begin("k3", uuid::Uuid::new_v4(), "t", "c", "acme", "u1");

        assert!(matches!(store.check("k1"), CheckOutcome::New));
        assert_eq!(store.entries.len(), 2);
    }

    #[test]
    fn begin_is_a_compare_and_set_only_one_caller_claims() {
        let store = store();
        let req_a = uuid::Uuid::new_v4();
        let req_b = uuid::Uuid::new_v4();

        assert!(matches!(store.begin("k6", req_a, "t", "c", "acme", "u1"), ClaimOutcome::Claimed));
        assert!(matches!(store.begin("k6", req_b, "t", "c", "acme", "u1"), ClaimOutcome::InProgress));
    }

    #[test]
    fn begin_reclaims_a_key_once_its_entry_has_expired() {
        let store = store();
        let req_a = uuid::Uuid::new_v4();
        store.begin("k7", req_a, "t", "c", "acme", "u1");
        {
            let mut entry = store.entries.get_mut("k7").unwrap();
            entry.record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }

        let req_b = uuid::Uuid::new_v4();
        assert!(matches!(store.begin("k7", req_b, "t", "c", "acme", "u1"), ClaimOutcome::Claimed));
    }

    #[tokio::test]
    async fn losing_the_claim_race_still_observes_the_eventual_result() {
        let store = Arc::new(store());
        let req = uuid::Uuid::new_v4();
        assert!(matches!(store.begin("k8", req, "t", "c", "acme", "u1"), ClaimOutcome::Claimed));

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            match waiter_store.begin("k8", uuid::Uuid::new_v4(), "t", "c", "acme", "u1") {
                ClaimOutcome::Claimed => panic!("loser must not also claim"),
                ClaimOutcome::InProgress => waiter_store.wait("k8", Duration::from_secs(1)).await,
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut result = sample_result(req);
        result.success = true;
        store.complete("k8", result);

        let outcome = waiter.await.unwrap().unwrap();
        assert!(outcome.is_some());
    }

    #[test]
    fn cleanup_removes_records_at_exactly_expires_at() {
        let store = store();
        let req = uuid::Uuid::new_v4();
        store.begin("k5", req, "t", "c", "acme", "u1");
        {
            let mut entry = store.entries.get_mut("k5").unwrap();
            entry.record.expires_at = Utc::now();
        }
        std::thread::sleep(Duration::from_millis(5));
        let removed = store.cleanup();
        assert_eq!(removed, 1);
    }
}
