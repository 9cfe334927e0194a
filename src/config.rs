use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub database_url: String,
    /// Downgrades entry persistence failures to an error log instead of
    /// rejecting the caller's action. Off by default: a dropped audit entry
    /// is normally worse than a rejected business action.
    pub fail_open_writes: bool,
}

impl AuditConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let database_url =
            env::var("AUDIT_DATABASE_URL").unwrap_or_else(|_| "sqlite://audit.db".to_string());

        let fail_open_writes = env::var("AUDIT_FAIL_OPEN_WRITES")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(AuditConfig {
            database_url,
            fail_open_writes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::load().unwrap();
        assert!(!config.fail_open_writes);
        assert!(config.database_url.starts_with("sqlite:"));
    }
}
