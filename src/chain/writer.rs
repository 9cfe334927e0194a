//! Chain Writer
//!
//! Sole producer of audit entries. Each append reads the owner's temporally
//! last entry, computes the new entry's keyed hash over the canonical field
//! encoding, and inserts the row in one statement so no entry can exist
//! without its hash. Appends for one owner are serialized; different owners
//! proceed in parallel.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::chain::canonical;
use crate::config::AuditConfig;
use crate::database::queries::Queries;
use crate::error::AuditError;
use crate::locks::OwnerLocks;
use crate::secrets::SecretStore;

#[derive(Clone)]
pub struct ChainWriter {
    pool: SqlitePool,
    secrets: SecretStore,
    locks: Arc<OwnerLocks>,
    fail_open: bool,
}

impl ChainWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            secrets: SecretStore::new(pool.clone()),
            pool,
            locks: Arc::new(OwnerLocks::new()),
            fail_open: false,
        }
    }

    /// `fail_open_writes` downgrades storage failures to an error log. The
    /// default rejects the caller's action instead; enabling this is an
    /// explicit, reviewed choice.
    pub fn with_config(pool: SqlitePool, config: &AuditConfig) -> Self {
        let mut writer = Self::new(pool);
        writer.fail_open = config.fail_open_writes;
        writer
    }

    /// Append an entry for an auditable event, returning the new entry id.
    ///
    /// A missing or unprovisioned secret is always fatal: the audit trail
    /// must not be skipped silently.
    pub async fn append(
        &self,
        owner_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<String, AuditError> {
        // Serialize read-prev -> compute -> insert per owner, or two
        // concurrent appends could race on the chain head.
        let _guard = self.locks.acquire(owner_id).await;

        let secret = self.secrets.current().await?;

        let prev_hash = Queries::latest_entry_for_owner(&self.pool, owner_id)
            .await?
            .map(|entry| entry.hash)
            .unwrap_or_default();

        let metadata_json = serde_json::to_string(&metadata)?;
        let message = canonical::entry_message(
            &prev_hash,
            owner_id,
            action,
            resource_type,
            resource_id,
            &metadata_json,
            created_at.timestamp_millis(),
        );
        let hash = canonical::keyed_hash(&secret.secret, &message)?;

        let entry_id = Uuid::new_v4().to_string();

        let insert = sqlx::query(
            "INSERT INTO audit_entries \
             (id, owner_id, created_at, action, resource_type, resource_id, \
              metadata, prev_hash, hash, secret_version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry_id)
        .bind(owner_id)
        .bind(created_at)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(&metadata_json)
        .bind(&prev_hash)
        .bind(&hash)
        .bind(secret.version)
        .execute(&self.pool)
        .await;

        if let Err(e) = insert {
            if self.fail_open {
                error!(
                    "Audit entry {} for owner {} dropped (fail-open override): {}",
                    entry_id, owner_id, e
                );
                return Ok(entry_id);
            }
            return Err(AuditError::WriteFailure(format!(
                "Failed to persist audit entry for owner {}: {}",
                owner_id, e
            )));
        }

        debug!(
            "Appended audit entry {} for owner {} ({} {}/{})",
            entry_id, owner_id, action, resource_type, resource_id
        );
        Ok(entry_id)
    }

    /// Append with the current time as the event timestamp.
    pub async fn append_now(
        &self,
        owner_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: serde_json::Value,
    ) -> Result<String, AuditError> {
        self.append(owner_id, action, resource_type, resource_id, metadata, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::TimeZone;
    use serde_json::json;

    async fn setup() -> (Database, ChainWriter) {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        SecretStore::new(db.pool().clone())
            .rotate(vec![7u8; 32])
            .await
            .unwrap();
        let writer = ChainWriter::new(db.pool().clone());
        (db, writer)
    }

    #[tokio::test]
    async fn test_first_entry_has_empty_prev_hash() {
        let (db, writer) = setup().await;

        let id = writer
            .append_now("user-1", "login", "session", "s-1", json!({}))
            .await
            .unwrap();

        let entry = Queries::entry_by_id(db.pool(), &id).await.unwrap().unwrap();
        assert_eq!(entry.prev_hash, "");
        assert_eq!(entry.secret_version, 1);
        assert_eq!(entry.hash.len(), 64);
    }

    #[tokio::test]
    async fn test_entries_chain_in_temporal_order() {
        let (db, writer) = setup().await;

        for i in 0..4 {
            writer
                .append_now("user-1", "update", "document", &format!("d-{}", i), json!({}))
                .await
                .unwrap();
        }

        let entries = Queries::entries_for_owner(db.pool(), "user-1").await.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].prev_hash, "");
        for pair in entries.windows(2) {
            assert_eq!(pair[1].prev_hash, pair[0].hash);
        }
    }

    #[tokio::test]
    async fn test_owners_have_independent_chains() {
        let (db, writer) = setup().await;

        writer
            .append_now("user-1", "login", "session", "s-1", json!({}))
            .await
            .unwrap();
        writer
            .append_now("user-2", "login", "session", "s-2", json!({}))
            .await
            .unwrap();

        let entries = Queries::entries_for_owner(db.pool(), "user-2").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prev_hash, "");
    }

    #[tokio::test]
    async fn test_append_without_secret_is_fatal() {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let writer = ChainWriter::new(db.pool().clone());

        let result = writer
            .append_now("user-1", "login", "session", "s-1", json!({}))
            .await;

        match result {
            Err(AuditError::ConfigError(_)) => {}
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metadata_shapes_the_hash() {
        // Two fresh stores, identical entries except for metadata.
        let (db_a, writer_a) = setup().await;
        let (db_b, writer_b) = setup().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let a = writer_a
            .append("user-1", "edit", "record", "r-1", json!({"field": "email"}), at)
            .await
            .unwrap();
        let b = writer_b
            .append("user-1", "edit", "record", "r-1", json!({"field": "phone"}), at)
            .await
            .unwrap();

        let entry_a = Queries::entry_by_id(db_a.pool(), &a).await.unwrap().unwrap();
        let entry_b = Queries::entry_by_id(db_b.pool(), &b).await.unwrap().unwrap();
        assert_ne!(entry_a.hash, entry_b.hash);
    }
}
