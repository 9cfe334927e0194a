//! Full Verifier
//!
//! Walks every entry in scope from the start of each chain, recomputing
//! hashes and linkage. Meant for scheduled sweeps and post-backfill checks,
//! not request paths: one streamed O(n) pass, stopping at the first failure.

use futures::TryStreamExt;
use sqlx::SqlitePool;
use tracing::info;

use crate::database::models::{AuditEntry, RunType, VerificationRun};
use crate::error::AuditError;
use crate::secrets::SecretStore;
use crate::verify::ledger::VerificationLedger;
use crate::verify::{build_run, log_outcome, ChainWalk};

#[derive(Debug, Clone)]
pub enum VerifyScope {
    Owner(String),
    All,
}

#[derive(Clone)]
pub struct FullVerifier {
    pool: SqlitePool,
    secrets: SecretStore,
    ledger: VerificationLedger,
}

impl FullVerifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            secrets: SecretStore::new(pool.clone()),
            ledger: VerificationLedger::new(pool.clone()),
            pool,
        }
    }

    /// Verify one owner's chain, or every chain, from the beginning.
    /// The outcome is recorded in the verification ledger either way.
    pub async fn verify_full(&self, scope: VerifyScope) -> Result<VerificationRun, AuditError> {
        let owner_scope = match &scope {
            VerifyScope::Owner(owner_id) => Some(owner_id.clone()),
            VerifyScope::All => None,
        };
        info!(
            "Starting full verification for {}",
            owner_scope.as_deref().unwrap_or("all owners")
        );

        let mut walk = ChainWalk::new(&self.secrets);
        let mut failure = None;

        {
            let mut rows = match &owner_scope {
                Some(owner_id) => sqlx::query(
                    "SELECT id, owner_id, created_at, action, resource_type, \
                            resource_id, metadata, prev_hash, hash, secret_version \
                     FROM audit_entries WHERE owner_id = ? \
                     ORDER BY created_at ASC, id ASC",
                )
                .bind(owner_id)
                .fetch(&self.pool),
                None => sqlx::query(
                    "SELECT id, owner_id, created_at, action, resource_type, \
                            resource_id, metadata, prev_hash, hash, secret_version \
                     FROM audit_entries \
                     ORDER BY owner_id ASC, created_at ASC, id ASC",
                )
                .fetch(&self.pool),
            };

            let mut current_owner: Option<String> = None;
            while let Some(row) = rows.try_next().await? {
                let entry = AuditEntry::from_row(&row)?;

                // Each owner is an independent chain.
                if current_owner.as_deref() != Some(entry.owner_id.as_str()) {
                    walk.restart();
                    current_owner = Some(entry.owner_id.clone());
                }

                if let Some(found) = walk.check(&entry).await? {
                    failure = Some(found);
                    break;
                }
            }
        }

        let run = build_run(RunType::Full, owner_scope, &walk, failure);
        log_outcome(&run);
        self.ledger.record(&run).await?;
        Ok(run)
    }
}
