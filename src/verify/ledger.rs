//! Verification Ledger
//!
//! Append-only record of every verification run, keyed by run time and
//! indexed by outcome. This is the compliance evidence trail the reporting
//! layer reads; nothing in the crate updates or deletes a recorded run.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::database::models::VerificationRun;
use crate::error::AuditError;

#[derive(Clone)]
pub struct VerificationLedger {
    pool: SqlitePool,
}

impl VerificationLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, run: &VerificationRun) -> Result<(), AuditError> {
        let mut conn = self.pool.acquire().await?;
        Self::record_on(&mut conn, run).await
    }

    /// Connection-level insert, used where the run record must commit
    /// atomically with other writes (the incremental cursor advance).
    pub(crate) async fn record_on(
        conn: &mut SqliteConnection,
        run: &VerificationRun,
    ) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO verification_runs \
             (id, run_at, run_type, owner_id, intact, total_entries_examined, \
              verified_entries, broken_entry_id, expected_hash, actual_hash, failure) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(run.run_at)
        .bind(run.run_type.as_str())
        .bind(&run.owner_id)
        .bind(run.intact)
        .bind(run.total_entries_examined)
        .bind(run.verified_entries)
        .bind(&run.broken_entry_id)
        .bind(&run.expected_hash)
        .bind(&run.actual_hash)
        .bind(run.failure.map(|f| f.as_str()))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<VerificationRun>, AuditError> {
        let rows = sqlx::query(
            "SELECT id, run_at, run_type, owner_id, intact, total_entries_examined, \
                    verified_entries, broken_entry_id, expected_hash, actual_hash, failure \
             FROM verification_runs ORDER BY run_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(VerificationRun::from_row).collect()
    }

    /// Failure history for dashboards: broken runs only, newest first.
    pub async fn failed_runs(&self, limit: i64) -> Result<Vec<VerificationRun>, AuditError> {
        let rows = sqlx::query(
            "SELECT id, run_at, run_type, owner_id, intact, total_entries_examined, \
                    verified_entries, broken_entry_id, expected_hash, actual_hash, failure \
             FROM verification_runs WHERE intact = 0 ORDER BY run_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(VerificationRun::from_row).collect()
    }

    pub async fn runs_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VerificationRun>, AuditError> {
        let rows = sqlx::query(
            "SELECT id, run_at, run_type, owner_id, intact, total_entries_examined, \
                    verified_entries, broken_entry_id, expected_hash, actual_hash, failure \
             FROM verification_runs WHERE run_at >= ? AND run_at <= ? \
             ORDER BY run_at ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(VerificationRun::from_row).collect()
    }
}
