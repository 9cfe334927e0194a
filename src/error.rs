use thiserror::Error;

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::CryptoError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(format!("Database error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Secret version {0} not found in secret store")]
    SecretNotFound(i64),

    #[error("Audit entry write failed: {0}")]
    WriteFailure(String),

    #[error("Verification already in progress for owner {0}")]
    ConcurrencyContention(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}
