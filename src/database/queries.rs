use sqlx::SqlitePool;

use crate::database::models::{AuditEntry, VerificationCursor};
use crate::error::AuditError;

pub struct Queries;

impl Queries {
    pub async fn entry_by_id(
        pool: &SqlitePool,
        entry_id: &str,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let row = sqlx::query(
            "SELECT id, owner_id, created_at, action, resource_type, \
                    resource_id, metadata, prev_hash, hash, secret_version \
             FROM audit_entries WHERE id = ?",
        )
        .bind(entry_id)
        .fetch_optional(pool)
        .await?;

        row.map(|r| AuditEntry::from_row(&r)).transpose()
    }

    /// All of an owner's entries in temporal order.
    pub async fn entries_for_owner(
        pool: &SqlitePool,
        owner_id: &str,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, created_at, action, resource_type, \
                    resource_id, metadata, prev_hash, hash, secret_version \
             FROM audit_entries WHERE owner_id = ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(AuditEntry::from_row).collect()
    }

    /// The owner's temporally last entry, the one a new append chains onto.
    pub async fn latest_entry_for_owner(
        pool: &SqlitePool,
        owner_id: &str,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let row = sqlx::query(
            "SELECT id, owner_id, created_at, action, resource_type, \
                    resource_id, metadata, prev_hash, hash, secret_version \
             FROM audit_entries WHERE owner_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

        row.map(|r| AuditEntry::from_row(&r)).transpose()
    }

    pub async fn owners(pool: &SqlitePool) -> Result<Vec<String>, AuditError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT owner_id FROM audit_entries ORDER BY owner_id ASC",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn entry_count(pool: &SqlitePool) -> Result<i64, AuditError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_entries")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    pub async fn entry_count_for_owner(
        pool: &SqlitePool,
        owner_id: &str,
    ) -> Result<i64, AuditError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_entries WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    pub async fn cursor_for_owner(
        pool: &SqlitePool,
        owner_id: &str,
    ) -> Result<Option<VerificationCursor>, AuditError> {
        let row = sqlx::query(
            "SELECT owner_id, last_verified_entry_id, last_verified_created_at, \
                    last_verified_hash, updated_at \
             FROM verification_cursors WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| VerificationCursor::from_row(&r)))
    }
}
