//! Secret Store
//!
//! Append-only store of versioned hashing secrets. The current version is
//! whatever was rotated in last; old versions stay readable for as long as
//! any entry references them. Raw secret bytes never leave this crate.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::database::models::SecretRecord;
use crate::error::AuditError;

#[derive(Clone)]
pub struct SecretStore {
    pool: SqlitePool,
}

impl SecretStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new secret version and make it current for future writes.
    /// Historical entries keep verifying under the versions they were
    /// written with.
    pub async fn rotate(&self, secret: Vec<u8>) -> Result<i64, AuditError> {
        if secret.is_empty() {
            return Err(AuditError::ConfigError(
                "Refusing to rotate in an empty secret".to_string(),
            ));
        }

        let version = sqlx::query_scalar::<_, i64>(
            "INSERT INTO audit_secrets (version, secret, created_at) \
             SELECT COALESCE(MAX(version), 0) + 1, ?, ? FROM audit_secrets \
             RETURNING version",
        )
        .bind(&secret)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!("Rotated hashing secret to version {}", version);
        Ok(version)
    }

    /// The version new entries are hashed under. A store with no versions
    /// is a configuration error: appends must fail rather than skip the
    /// audit trail.
    pub async fn current_version(&self) -> Result<i64, AuditError> {
        let version = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM audit_secrets")
            .fetch_one(&self.pool)
            .await?;

        version.ok_or_else(|| {
            AuditError::ConfigError("No secret versions provisioned; rotate a secret first".to_string())
        })
    }

    pub(crate) async fn get_secret(&self, version: i64) -> Result<Vec<u8>, AuditError> {
        let secret = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT secret FROM audit_secrets WHERE version = ?",
        )
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        secret.ok_or(AuditError::SecretNotFound(version))
    }

    pub(crate) async fn current(&self) -> Result<SecretRecord, AuditError> {
        let row = sqlx::query(
            "SELECT version, secret, created_at FROM audit_secrets \
             ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| {
            AuditError::ConfigError("No secret versions provisioned; rotate a secret first".to_string())
        })?;

        Ok(SecretRecord {
            version: row.get::<i64, _>("version"),
            secret: row.get::<Vec<u8>, _>("secret"),
            created_at: row.get("created_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn store() -> SecretStore {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        SecretStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_rotation_is_monotonic() {
        let store = store().await;

        assert_eq!(store.rotate(vec![1u8; 32]).await.unwrap(), 1);
        assert_eq!(store.rotate(vec![2u8; 32]).await.unwrap(), 2);
        assert_eq!(store.rotate(vec![3u8; 32]).await.unwrap(), 3);
        assert_eq!(store.current_version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_old_versions_survive_rotation() {
        let store = store().await;

        store.rotate(vec![1u8; 32]).await.unwrap();
        store.rotate(vec![2u8; 32]).await.unwrap();

        assert_eq!(store.get_secret(1).await.unwrap(), vec![1u8; 32]);
        assert_eq!(store.get_secret(2).await.unwrap(), vec![2u8; 32]);
    }

    #[tokio::test]
    async fn test_missing_version_is_distinct() {
        let store = store().await;
        store.rotate(vec![1u8; 32]).await.unwrap();

        match store.get_secret(9).await {
            Err(AuditError::SecretNotFound(9)) => {}
            other => panic!("Expected SecretNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_a_config_error() {
        let store = store().await;

        match store.current_version().await {
            Err(AuditError::ConfigError(_)) => {}
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_secret_rejected() {
        let store = store().await;
        assert!(store.rotate(Vec::new()).await.is_err());
    }
}
