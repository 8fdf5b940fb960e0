//! Error types for attest-store.

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("record {0} conflicts with an existing record at the same rid")]
    RidConflict(String),

    #[error("core error: {0}")]
    Core(#[from] attest_core::CoreError),

    #[error("blocking task failed: {0}")]
    TaskJoin(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
