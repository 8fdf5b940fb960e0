//! Error types for attest-node.

use thiserror::Error;

/// Node-level errors: the union of the layers the node composes.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Core(#[from] attest_core::CoreError),

    #[error(transparent)]
    Store(#[from] attest_store::StoreError),

    #[error(transparent)]
    Checkpoint(#[from] attest_checkpoint::CheckpointError),

    #[error(transparent)]
    Sync(#[from] attest_federation::SyncError),

    #[error("checkpoint {0} not found")]
    CheckpointNotFound(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
