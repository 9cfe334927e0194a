//! Chain Verification
//!
//! Recomputes entry hashes in temporal order and checks the prev-hash
//! linkage. The full and incremental verifiers share the same per-entry
//! walk; they differ only in where the walk starts and how the outcome is
//! persisted. Outcomes always land in the verification ledger.

pub mod full;
pub mod incremental;
pub mod ledger;

pub use full::{FullVerifier, VerifyScope};
pub use incremental::IncrementalVerifier;
pub use ledger::VerificationLedger;

use chrono::Utc;
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::canonical;
use crate::database::models::{AuditEntry, FailureKind, RunType, VerificationRun};
use crate::error::AuditError;
use crate::secrets::SecretStore;

/// First problem found in a walk. Never auto-corrected: verification only
/// reports, repair is a human decision.
#[derive(Debug, Clone)]
pub(crate) enum ChainFailure {
    /// The entry references a secret version the store no longer has.
    /// An operational gap, not necessarily tampering.
    MissingSecret { entry_id: String },
    /// Stored prev_hash does not match the running chain value.
    BrokenLink {
        entry_id: String,
        expected: String,
        actual: String,
    },
    /// Recomputed hash does not match the stored one.
    HashMismatch {
        entry_id: String,
        expected: String,
        actual: String,
    },
}

/// One pass over a chain segment. Tracks the expected previous hash and
/// caches secrets by version for the duration of the run.
pub(crate) struct ChainWalk<'a> {
    secrets: &'a SecretStore,
    secret_cache: HashMap<i64, Vec<u8>>,
    expected_prev: String,
    pub(crate) examined: i64,
    pub(crate) verified: i64,
}

impl<'a> ChainWalk<'a> {
    /// Walk from the start of a chain (expected previous hash is empty).
    pub(crate) fn new(secrets: &'a SecretStore) -> Self {
        Self::seeded(secrets, String::new())
    }

    /// Walk resuming mid-chain from a known hash.
    pub(crate) fn seeded(secrets: &'a SecretStore, expected_prev: String) -> Self {
        Self {
            secrets,
            secret_cache: HashMap::new(),
            expected_prev,
            examined: 0,
            verified: 0,
        }
    }

    /// Reset to a chain start without losing counters or cached secrets.
    /// Used when an all-owners walk crosses an owner boundary.
    pub(crate) fn restart(&mut self) {
        self.expected_prev.clear();
    }

    pub(crate) async fn check(
        &mut self,
        entry: &AuditEntry,
    ) -> Result<Option<ChainFailure>, AuditError> {
        self.examined += 1;

        if entry.prev_hash != self.expected_prev {
            return Ok(Some(ChainFailure::BrokenLink {
                entry_id: entry.id.clone(),
                expected: self.expected_prev.clone(),
                actual: entry.prev_hash.clone(),
            }));
        }

        let secret = match self.secret_cache.get(&entry.secret_version) {
            Some(secret) => secret.clone(),
            None => match self.secrets.get_secret(entry.secret_version).await {
                Ok(secret) => {
                    self.secret_cache.insert(entry.secret_version, secret.clone());
                    secret
                }
                Err(AuditError::SecretNotFound(version)) => {
                    warn!(
                        "Secret version {} referenced by entry {} is missing",
                        version, entry.id
                    );
                    return Ok(Some(ChainFailure::MissingSecret {
                        entry_id: entry.id.clone(),
                    }));
                }
                Err(e) => return Err(e),
            },
        };

        let recomputed = canonical::compute_entry_hash(&secret, entry)?;
        if recomputed != entry.hash {
            return Ok(Some(ChainFailure::HashMismatch {
                entry_id: entry.id.clone(),
                expected: recomputed,
                actual: entry.hash.clone(),
            }));
        }

        self.expected_prev = entry.hash.clone();
        self.verified += 1;
        Ok(None)
    }
}

pub(crate) fn build_run(
    run_type: RunType,
    owner_id: Option<String>,
    walk: &ChainWalk<'_>,
    failure: Option<ChainFailure>,
) -> VerificationRun {
    let mut run = VerificationRun {
        id: Uuid::new_v4().to_string(),
        run_at: Utc::now(),
        run_type,
        owner_id,
        intact: failure.is_none(),
        total_entries_examined: walk.examined,
        verified_entries: walk.verified,
        broken_entry_id: None,
        expected_hash: None,
        actual_hash: None,
        failure: None,
    };

    match failure {
        None => {}
        Some(ChainFailure::MissingSecret { entry_id }) => {
            run.broken_entry_id = Some(entry_id);
            run.failure = Some(FailureKind::MissingSecret);
        }
        Some(ChainFailure::BrokenLink {
            entry_id,
            expected,
            actual,
        }) => {
            run.broken_entry_id = Some(entry_id);
            run.expected_hash = Some(expected);
            run.actual_hash = Some(actual);
            run.failure = Some(FailureKind::BrokenLink);
        }
        Some(ChainFailure::HashMismatch {
            entry_id,
            expected,
            actual,
        }) => {
            run.broken_entry_id = Some(entry_id);
            run.expected_hash = Some(expected);
            run.actual_hash = Some(actual);
            run.failure = Some(FailureKind::HashMismatch);
        }
    }

    run
}

/// Alerting surface: broken chains are operator-facing, never end-user
/// facing, so a log line plus the ledger record is the whole story here.
pub(crate) fn log_outcome(run: &VerificationRun) {
    let scope = run.owner_id.as_deref().unwrap_or("all owners");
    if run.intact {
        info!(
            "{} verification intact for {}: {} entries verified",
            run.run_type.as_str(),
            scope,
            run.verified_entries
        );
    } else {
        error!(
            "{} verification FAILED for {} at entry {:?} ({:?}): expected {:?}, actual {:?}, {}/{} verified",
            run.run_type.as_str(),
            scope,
            run.broken_entry_id,
            run.failure,
            run.expected_hash,
            run.actual_hash,
            run.verified_entries,
            run.total_entries_examined
        );
    }
}
