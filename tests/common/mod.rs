//! Shared test fixtures: an in-memory database with one rotated secret
//! and a writer, plus helpers for building deterministic chains.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use audit_chain::chain::ChainWriter;
use audit_chain::database::models::AuditEntry;
use audit_chain::database::queries::Queries;
use audit_chain::database::Database;
use audit_chain::secrets::SecretStore;

pub const TEST_SECRET: [u8; 32] = [7u8; 32];

pub async fn setup() -> (Database, ChainWriter) {
    let db = Database::new_in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    SecretStore::new(db.pool().clone())
        .rotate(TEST_SECRET.to_vec())
        .await
        .unwrap();
    let writer = ChainWriter::new(db.pool().clone());
    (db, writer)
}

/// A fixed instant so chains built in tests are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

/// Append `count` entries for one owner, one second apart, starting at
/// `base_time() + start_offset_secs`.
pub async fn append_chain(
    writer: &ChainWriter,
    owner_id: &str,
    start_offset_secs: i64,
    count: usize,
) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let created_at = base_time() + Duration::seconds(start_offset_secs + i as i64);
        let id = writer
            .append(
                owner_id,
                "update",
                "document",
                &format!("doc-{}", start_offset_secs + i as i64),
                json!({"seq": start_offset_secs + i as i64}),
                created_at,
            )
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

pub async fn entries(db: &Database, owner_id: &str) -> Vec<AuditEntry> {
    Queries::entries_for_owner(db.pool(), owner_id).await.unwrap()
}
