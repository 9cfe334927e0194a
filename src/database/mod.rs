pub mod models;
pub mod queries;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::AuditError;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AuditError::ConfigError(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Database { pool })
    }

    /// In-memory database for tests. Each `new_in_memory` call gets its own
    /// isolated database via a uniquely-named shared-cache in-memory file, so
    /// that every connection in the pool sees the same data (a bare
    /// `:memory:` connection would see an empty database) while parallel
    /// tests stay isolated from one another.
    pub async fn new_in_memory() -> Result<Self, AuditError> {
        let name = uuid::Uuid::new_v4().to_string();
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:file:{}?mode=memory&cache=shared",
            name
        ))
        .map_err(|e| AuditError::ConfigError(format!("Invalid database URL: {}", e)))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Database { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(include_str!("../../migrations/001_initial_schema.sql"))
            .execute(&self.pool)
            .await?;

        sqlx::raw_sql(include_str!("../../migrations/002_verification.sql"))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();

        let count = queries::Queries::entry_count(db.pool()).await.unwrap();
        assert_eq!(count, 0);
    }
}
