//! Canonical entry encoding and keyed hashing.
//!
//! Every field is length-prefixed before concatenation so distinct field
//! tuples can never produce the same input bytes ("ab"+"c" vs "a"+"bc").
//! The timestamp enters as an integer epoch, never a formatted string.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::database::models::AuditEntry;
use crate::error::AuditError;

type HmacSha256 = Hmac<Sha256>;

/// Unambiguous encoding of the hashed fields: `len:value|` per field.
pub(crate) fn entry_message(
    prev_hash: &str,
    owner_id: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    metadata_json: &str,
    created_at_millis: i64,
) -> String {
    let timestamp = created_at_millis.to_string();
    let fields = [
        prev_hash,
        owner_id,
        action,
        resource_type,
        resource_id,
        metadata_json,
        &timestamp,
    ];

    let mut message = String::new();
    for field in fields {
        message.push_str(&field.len().to_string());
        message.push(':');
        message.push_str(field);
        message.push('|');
    }
    message
}

/// HMAC-SHA256 of the canonical message under one secret version,
/// lowercase hex.
pub(crate) fn keyed_hash(secret: &[u8], message: &str) -> Result<String, AuditError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AuditError::CryptoError(format!("Invalid secret key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recompute the hash a stored entry must carry. Metadata is rendered in
/// its canonical JSON form, the same string the writer stored and hashed.
pub(crate) fn compute_entry_hash(secret: &[u8], entry: &AuditEntry) -> Result<String, AuditError> {
    let metadata_json = serde_json::to_string(&entry.metadata)?;
    let message = entry_message(
        &entry.prev_hash,
        &entry.owner_id,
        &entry.action,
        &entry.resource_type,
        &entry.resource_id,
        &metadata_json,
        entry.created_at.timestamp_millis(),
    );
    keyed_hash(secret, &message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_hash_is_deterministic() {
        let message = entry_message("", "user-1", "login", "session", "s-1", "{}", 1_700_000_000_000);
        let h1 = keyed_hash(SECRET, &message).unwrap();
        let h2 = keyed_hash(SECRET, &message).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_boundary_shifted_fields_hash_differently() {
        // Without length prefixes both tuples would concatenate to "abc".
        let a = entry_message("", "o", "ab", "c", "r", "{}", 0);
        let b = entry_message("", "o", "a", "bc", "r", "{}", 0);
        assert_ne!(a, b);
        assert_ne!(
            keyed_hash(SECRET, &a).unwrap(),
            keyed_hash(SECRET, &b).unwrap()
        );
    }

    #[test]
    fn test_secret_changes_hash() {
        let message = entry_message("", "o", "a", "t", "r", "{}", 1);
        let h1 = keyed_hash(b"first secret, 32 bytes long 1234", &message).unwrap();
        let h2 = keyed_hash(b"other secret, 32 bytes long 5678", &message).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_prev_hash_feeds_the_chain() {
        let h1 = keyed_hash(SECRET, &entry_message("", "o", "a", "t", "r", "{}", 1)).unwrap();
        let h2 = keyed_hash(SECRET, &entry_message(&h1, "o", "a", "t", "r", "{}", 1)).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_delimiter_characters_in_fields_are_harmless() {
        let a = entry_message("", "o", "a|1:b", "c", "r", "{}", 0);
        let b = entry_message("", "o", "a", "1:b|c", "r", "{}", 0);
        assert_ne!(a, b);
    }
}
