// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Persistence traits for durable backends. The in-memory `DashMap` store
//! in [`crate::infrastructure::idempotency_store`] is the default; this
//! module adds the trait boundary plus an optional `sqlx`-backed Postgres
//! implementation.

use async_trait::async_trait;

use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::registry::ToolMetadata;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable idempotency record storage, keyed by `idempotency_key` with an
/// index on `expires_at` for `cleanup`.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn load(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, RepositoryError>;
    async fn save(&self, record: &IdempotencyRecord) -> Result<(), RepositoryError>;
    async fn delete(&self, idempotency_key: &str) -> Result<(), RepositoryError>;
    async fn delete_expired_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, RepositoryError>;
}

/// Durable per-tenant tool metadata storage (`{tool_name, tool_config,
/// capabilities}`).
#[async_trait]
pub trait ToolMetadataRepository: Send + Sync {
    async fn load(&self, company_id: &str, tool_name: &str) -> Result<Option<ToolMetadata>, RepositoryError>;
    async fn save(&self, company_id: &str, metadata: &ToolMetadata) -> Result<(), RepositoryError>;
    async fn list(&self, company_id: &str) -> Result<Vec<ToolMetadata>, RepositoryError>;
}

/// `DashMap`-backed implementation, valid for single-process deployments.
pub mod in_memory {
    use super::*;
    use dashmap::DashMap;

    #[derive(Default)]
    pub struct InMemoryIdempotencyRepository {
        records: DashMap<String, IdempotencyRecord>,
    }

    #[async_trait]
    impl IdempotencyRepository for InMemoryIdempotencyRepository {
        async fn load(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, RepositoryError> {
            Ok(self.records.get(idempotency_key).map(|r| r.clone()))
        }

        async fn save(&self, record: &IdempotencyRecord) -> Result<(), RepositoryError> {
            self.records.insert(record.idempotency_key.clone(), record.clone());
            Ok(())
        }

        async fn delete(&self, idempotency_key: &str) -> Result<(), RepositoryError> {
            self.records.remove(idempotency_key);
            Ok(())
        }

        async fn delete_expired_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, RepositoryError> {
            let expired: Vec<String> = self
                .records
                .iter()
                .filter(|e| e.expires_at < cutoff)
                .map(|e| e.key().clone())
                .collect();
            let count = expired.len() as u64;
            for key in expired {
                self.records.remove(&key);
            }
            Ok(count)
        }
    }

    #[derive(Default)]
    pub struct InMemoryToolMetadataRepository {
        // keyed by (company_id, tool_name)
        entries: DashMap<(String, String), ToolMetadata>,
    }

    #[async_trait]
    impl ToolMetadataRepository for InMemoryToolMetadataRepository {
        async fn load(&self, company_id: &str, tool_name: &str) -> Result<Option<ToolMetadata>, RepositoryError> {
            Ok(self
                .entries
                .get(&(company_id.to_string(), tool_name.to_string()))
                .map(|e| e.clone()))
        }

        async fn save(&self, company_id: &str, metadata: &ToolMetadata) -> Result<(), RepositoryError> {
            self.entries
                .insert((company_id.to_string(), metadata.name.clone()), metadata.clone());
            Ok(())
        }

        async fn list(&self, company_id: &str) -> Result<Vec<ToolMetadata>, RepositoryError> {
            Ok(self
                .entries
                .iter()
                .filter(|e| e.key().0 == company_id)
                .map(|e| e.value().clone())
                .collect())
        }
    }
}

/// Postgres-backed durable store, behind the `postgres` feature flag.
#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use sqlx::PgPool;

    pub struct PostgresIdempotencyRepository {
        pool: PgPool,
    }

    impl PostgresIdempotencyRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl IdempotencyRepository for PostgresIdempotencyRepository {
        async fn load(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, RepositoryError> {
            let row = sqlx::query_as::<_, IdempotencyRow>(
                "SELECT idempotency_key, request_id, tool_name, capability_name, company_id, user_id, \
                 status, result, created_at, expires_at, last_accessed_at \
                 FROM idempotency_records WHERE idempotency_key = $1",
            )
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

            Ok(row.map(IdempotencyRow::into_record))
        }

        async fn save(&self, record: &IdempotencyRecord) -> Result<(), RepositoryError> {
            let status = serde_json::to_string(&record.status).unwrap_or_default();
            let result = record.result.as_ref().map(|r| serde_json::to_value(r).unwrap_or_default());

            sqlx::query(
                "INSERT INTO idempotency_records \
                 (idempotency_key, request_id, tool_name, capability_name, company_id, user_id, status, result, created_at, expires_at, last_accessed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (idempotency_key) DO UPDATE SET \
                 status = EXCLUDED.status, result = EXCLUDED.result, last_accessed_at = EXCLUDED.last_accessed_at",
            )
            .bind(&record.idempotency_key)
            .bind(record.request_id)
            .bind(&record.tool_name)
            .bind(&record.capability_name)
            .bind(&record.company_id)
            .bind(&record.user_id)
            .bind(status)
            .bind(result)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(record.last_accessed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

            Ok(())
        }

        async fn delete(&self, idempotency_key: &str) -> Result<(), RepositoryError> {
            sqlx::query("DELETE FROM idempotency_records WHERE idempotency_key = $1")
                .bind(idempotency_key)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            Ok(())
        }

        async fn delete_expired_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, RepositoryError> {
            let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            Ok(result.rows_affected())
        }
    }

    #[derive(sqlx::FromRow)]
    struct IdempotencyRow {
        idempotency_key: String,
        request_id: uuid::Uuid,
        tool_name: String,
        capability_name: String,
        company_id: String,
        user_id: String,
        status: String,
        result: Option<serde_json::Value>,
        created_at: chrono::DateTime<chrono::Utc>,
        expires_at: chrono::DateTime<chrono::Utc>,
        last_accessed_at: chrono::DateTime<chrono::Utc>,
    }

    impl IdempotencyRow {
        fn into_record(self) -> IdempotencyRecord {
            IdempotencyRecord {
                idempotency_key: self.idempotency_key,
                request_id: self.request_id,
                tool_name: self.tool_name,
                capability_name: self.capability_name,
                company_id: self.company_id,
                user_id: self.user_id,
                status: serde_json::from_str(&self.status).unwrap_or(crate::domain::result::IdempotencyStatus::Expired),
                result: self.result.and_then(|v| serde_json::from_value(v).ok()),
                created_at: self.created_at,
                expires_at: self.expires_at,
                last_accessed_at: self.last_accessed_at,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::in_memory::InMemoryIdempotencyRepository;
    use super::*;
    use crate::domain::result::IdempotencyStatus;

    fn sample_record(key: &str, expires_at: chrono::DateTime<chrono::Utc>) -> IdempotencyRecord {
        IdempotencyRecord {
            idempotency_key: key.to_string(),
            request_id: uuid::Uuid::new_v4(),
            tool_name: "t".to_string(),
            capability_name: "c".to_string(),
            company_id: "acme".to_string(),
            user_id: "u1".to_string(),
            status: IdempotencyStatus::New,
            result: None,
            created_at: chrono::Utc::now(),
            expires_at,
            last_accessed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let repo = InMemoryIdempotencyRepository::default();
        let record = sample_record("k1", chrono::Utc::now() + chrono::Duration::hours(1));
        repo.save(&record).await.unwrap();
        let loaded = repo.load("k1").await.unwrap().unwrap();
        assert_eq!(loaded.idempotency_key, "k1");
    }

    #[tokio::test]
    async fn delete_expired_before_only_removes_past_cutoff() {
        let repo = InMemoryIdempotencyRepository::default();
        let now = chrono::Utc::now();
        repo.save(&sample_record("expired", now - chrono::Duration::minutes(1))).await.unwrap();
        repo.save(&sample_record("fresh", now + chrono::Duration::hours(1))).await.unwrap();

        let removed = repo.delete_expired_before(now).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.load("expired").await.unwrap().is_none());
        assert!(repo.load("fresh").await.unwrap().is_some());
    }
}
