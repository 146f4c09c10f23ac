// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-user TTL cache for composed prompts. Entries are invalidated
//! synchronously by the Registry on grant/revoke/capability sync so a
//! composed prompt never serves a tool catalog the user no longer has
//! access to, rather than waiting out the TTL.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

struct Entry {
    prompt: String,
    expires_at: DateTime<Utc>,
}

pub struct PromptCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl PromptCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, user_id: &str) -> Option<String> {
        match self.entries.get(user_id) {
            Some(entry) if entry.expires_at > Utc::now() => Some(entry.prompt.clone()),
            Some(_) => {
                drop(self.entries.remove(user_id));
                None
            }
            None => None,
        }
    }

    pub fn put(&self, user_id: &str, prompt: String) {
        let expires_at = Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::minutes(5));
        self.entries.insert(user_id.to_string(), Entry { prompt, expires_at });
    }

    /// Called from `Registry::grant`/`revoke`/`sync_tool_capabilities` so a
    /// changed grant set never serves a stale catalog before the TTL lapses.
    pub fn invalidate(&self, user_id: &str) {
        self.entries.remove(user_id);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips_before_ttl_elapses() {
        let cache = PromptCache::new(Duration::from_secs(60));
        cache.put("u1", "hello".to_string());
        assert_eq!(cache.get("u1"), Some("hello".to_string()));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = PromptCache::new(Duration::from_millis(1));
        cache.put("u1", "hello".to_string());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("u1"), None);
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn invalidate_removes_entry_before_ttl() {
        let cache = PromptCache::new(Duration::from_secs(60));
        cache.put("u1", "hello".to_string());
        cache.invalidate("u1");
        assert_eq!(cache.get("u1"), None);
    }

    #[test]
    fn invalidate_all_clears_every_user() {
        let cache = PromptCache::new(Duration::from_secs(60));
        cache.put("u1", "a".to_string());
        cache.put("u2", "b".to_string());
        cache.invalidate_all();
        assert_eq!(cache.get("u1"), None);
        assert_eq!(cache.get("u2"), None);
    }
}
