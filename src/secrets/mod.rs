//! Versioned Secret Store
//!
//! Holds the symmetric secrets that key entry hashes. Versions are
//! write-once and retained forever; rotation only changes which version
//! new writes use.

pub mod store;

pub use store::SecretStore;
