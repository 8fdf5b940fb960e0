//! Error types for attest-checkpoint.

use thiserror::Error;

/// Checkpoint service errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Store(#[from] attest_store::StoreError),

    #[error(transparent)]
    Core(#[from] attest_core::CoreError),

    /// The primary tamper/rollback signal: the stored hashes for a range
    /// no longer reproduce the expected Merkle root.
    #[error("root mismatch: expected {expected}, recomputed {actual}")]
    RootMismatch { expected: String, actual: String },

    #[error("range {start}..={end} holds no records")]
    EmptyRange { start: String, end: String },
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
