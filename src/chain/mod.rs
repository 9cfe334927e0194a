//! Audit Hash Chain
//!
//! Builds the per-owner hash chain: canonical entry encoding, keyed entry
//! hashing, and the single writer that appends entries.

pub(crate) mod canonical;
pub mod writer;

pub use writer::ChainWriter;
