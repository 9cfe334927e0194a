use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::AuditError;

/// One link in an owner's hash chain. Entries are insert-only: nothing in
/// this crate updates or deletes a row once it is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UUIDv4. Random order: never use this alone to sort entries in time.
    pub id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: serde_json::Value,
    /// Hash of the owner's previous entry, empty string for the first.
    pub prev_hash: String,
    pub hash: String,
    pub secret_version: i64,
}

impl AuditEntry {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, AuditError> {
        let metadata: String = row.get("metadata");
        Ok(AuditEntry {
            id: row.get::<String, _>("id"),
            owner_id: row.get::<String, _>("owner_id"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            action: row.get::<String, _>("action"),
            resource_type: row.get::<String, _>("resource_type"),
            resource_id: row.get::<String, _>("resource_id"),
            metadata: serde_json::from_str(&metadata)?,
            prev_hash: row.get::<String, _>("prev_hash"),
            hash: row.get::<String, _>("hash"),
            secret_version: row.get::<i64, _>("secret_version"),
        })
    }
}

/// One version of the hashing secret. Write-once: rotation appends a new
/// version and never touches old ones.
#[derive(Clone)]
pub struct SecretRecord {
    pub version: i64,
    pub(crate) secret: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("version", &self.version)
            .field("secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Resume point for incremental verification. Every entry for the owner
/// ordered before (last_verified_created_at, last_verified_entry_id) has
/// been verified intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCursor {
    pub owner_id: String,
    pub last_verified_entry_id: String,
    pub last_verified_created_at: DateTime<Utc>,
    /// Chain hash at the cursor; seeds the linkage check when resuming.
    pub last_verified_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl VerificationCursor {
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        VerificationCursor {
            owner_id: row.get::<String, _>("owner_id"),
            last_verified_entry_id: row.get::<String, _>("last_verified_entry_id"),
            last_verified_created_at: row.get::<DateTime<Utc>, _>("last_verified_created_at"),
            last_verified_hash: row.get::<String, _>("last_verified_hash"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Full,
    Incremental,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Full => "full",
            RunType::Incremental => "incremental",
        }
    }
}

impl std::str::FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(RunType::Full),
            "incremental" => Ok(RunType::Incremental),
            _ => Err(format!("Unknown run type: {}", s)),
        }
    }
}

/// Why a verification run stopped. A missing secret is an operational gap
/// and is reported separately from the two tampering signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingSecret,
    BrokenLink,
    HashMismatch,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingSecret => "missing_secret",
            FailureKind::BrokenLink => "broken_link",
            FailureKind::HashMismatch => "hash_mismatch",
        }
    }
}

impl std::str::FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_secret" => Ok(FailureKind::MissingSecret),
            "broken_link" => Ok(FailureKind::BrokenLink),
            "hash_mismatch" => Ok(FailureKind::HashMismatch),
            _ => Err(format!("Unknown failure kind: {}", s)),
        }
    }
}

/// Outcome of one verification invocation. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRun {
    pub id: String,
    pub run_at: DateTime<Utc>,
    pub run_type: RunType,
    /// None means the run covered every owner.
    pub owner_id: Option<String>,
    pub intact: bool,
    pub total_entries_examined: i64,
    pub verified_entries: i64,
    pub broken_entry_id: Option<String>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
    pub failure: Option<FailureKind>,
}

impl VerificationRun {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, AuditError> {
        let run_type: String = row.get("run_type");
        let failure: Option<String> = row.get("failure");

        Ok(VerificationRun {
            id: row.get::<String, _>("id"),
            run_at: row.get::<DateTime<Utc>, _>("run_at"),
            run_type: run_type
                .parse()
                .map_err(|e: String| AuditError::DatabaseError(e))?,
            owner_id: row.get::<Option<String>, _>("owner_id"),
            intact: row.get::<bool, _>("intact"),
            total_entries_examined: row.get::<i64, _>("total_entries_examined"),
            verified_entries: row.get::<i64, _>("verified_entries"),
            broken_entry_id: row.get::<Option<String>, _>("broken_entry_id"),
            expected_hash: row.get::<Option<String>, _>("expected_hash"),
            actual_hash: row.get::<Option<String>, _>("actual_hash"),
            failure: failure
                .map(|f| f.parse().map_err(|e: String| AuditError::DatabaseError(e)))
                .transpose()?,
        })
    }
}
