//! Incremental Verifier
//!
//! Verifies only entries appended since the owner's cursor, so scheduled
//! checks stay cheap on large logs. The cursor advances only on success and
//! is persisted in the same transaction as the run record, so a crash can
//! never advance one without the other.
//!
//! Entries backfilled with a created_at behind the cursor are not covered
//! by this path; run a full verification after any backfill.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use crate::database::models::{AuditEntry, RunType, VerificationRun};
use crate::database::queries::Queries;
use crate::error::AuditError;
use crate::locks::OwnerLocks;
use crate::secrets::SecretStore;
use crate::verify::ledger::VerificationLedger;
use crate::verify::{build_run, log_outcome, ChainWalk};

#[derive(Clone)]
pub struct IncrementalVerifier {
    pool: SqlitePool,
    secrets: SecretStore,
    locks: Arc<OwnerLocks>,
}

impl IncrementalVerifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            secrets: SecretStore::new(pool.clone()),
            pool,
            locks: Arc::new(OwnerLocks::new()),
        }
    }

    /// Resume verification from the owner's cursor. Returns
    /// `ConcurrencyContention` when another incremental run for the same
    /// owner holds the advisory lock; the next scheduled invocation will
    /// simply try again.
    pub async fn verify_incremental(
        &self,
        owner_id: &str,
    ) -> Result<VerificationRun, AuditError> {
        let Some(_guard) = self.locks.try_acquire(owner_id).await else {
            debug!(
                "Incremental verification for owner {} skipped: run already in progress",
                owner_id
            );
            return Err(AuditError::ConcurrencyContention(owner_id.to_string()));
        };

        let cursor = Queries::cursor_for_owner(&self.pool, owner_id).await?;

        let mut walk = match &cursor {
            Some(cursor) => ChainWalk::seeded(&self.secrets, cursor.last_verified_hash.clone()),
            None => ChainWalk::new(&self.secrets),
        };

        let mut failure = None;
        let mut last_verified: Option<(String, DateTime<Utc>, String)> = None;

        {
            let mut rows = match &cursor {
                Some(cursor) => sqlx::query(
                    "SELECT id, owner_id, created_at, action, resource_type, \
                            resource_id, metadata, prev_hash, hash, secret_version \
                     FROM audit_entries \
                     WHERE owner_id = ? \
                       AND (created_at > ? OR (created_at = ? AND id > ?)) \
                     ORDER BY created_at ASC, id ASC",
                )
                .bind(owner_id)
                .bind(cursor.last_verified_created_at)
                .bind(cursor.last_verified_created_at)
                .bind(&cursor.last_verified_entry_id)
                .fetch(&self.pool),
                None => sqlx::query(
                    "SELECT id, owner_id, created_at, action, resource_type, \
                            resource_id, metadata, prev_hash, hash, secret_version \
                     FROM audit_entries WHERE owner_id = ? \
                     ORDER BY created_at ASC, id ASC",
                )
                .bind(owner_id)
                .fetch(&self.pool),
            };

            while let Some(row) = rows.try_next().await? {
                let entry = AuditEntry::from_row(&row)?;
                match walk.check(&entry).await? {
                    Some(found) => {
                        failure = Some(found);
                        break;
                    }
                    None => {
                        last_verified = Some((entry.id, entry.created_at, entry.hash));
                    }
                }
            }
        }

        let run = build_run(RunType::Incremental, Some(owner_id.to_string()), &walk, failure);
        log_outcome(&run);

        // Run record and cursor advance commit as one atomic unit. On
        // failure the cursor stays put, so the break is rediscovered by
        // every later run until an operator acts.
        let mut tx = self.pool.begin().await?;
        VerificationLedger::record_on(&mut *tx, &run).await?;
        if run.intact {
            if let Some((entry_id, created_at, hash)) = &last_verified {
                sqlx::query(
                    "INSERT INTO verification_cursors \
                     (owner_id, last_verified_entry_id, last_verified_created_at, \
                      last_verified_hash, updated_at) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT(owner_id) DO UPDATE SET \
                         last_verified_entry_id = excluded.last_verified_entry_id, \
                         last_verified_created_at = excluded.last_verified_created_at, \
                         last_verified_hash = excluded.last_verified_hash, \
                         updated_at = excluded.updated_at",
                )
                .bind(owner_id)
                .bind(entry_id)
                .bind(*created_at)
                .bind(hash)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        Ok(run)
    }
}
