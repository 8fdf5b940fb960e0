//! Error types for attest-federation.

use thiserror::Error;

use crate::messages::RejectCode;

/// Federation and sync errors.
///
/// The retryable/fatal split is the propagation contract: callers retry
/// [`is_retryable`](SyncError::is_retryable) errors on their own schedule
/// and stop syncing a peer on `Quarantined` until it is reset.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Manifest fetch or verification failed. Leaves the peer `Unsynced`.
    #[error("manifest error for peer {peer}: {reason}")]
    Manifest { peer: String, reason: String },

    /// Verified data disagreement at a height. Retryable until the peer's
    /// divergence counter crosses the limit.
    #[error("divergence at height {height}: expected {expected}, observed {observed}")]
    Divergence {
        height: u64,
        expected: String,
        observed: String,
    },

    /// The peer crossed the divergence limit. Fatal for this peer until an
    /// out-of-band reset.
    #[error("peer {peer} quarantined after {failures} consecutive failures")]
    Quarantined { peer: String, failures: u32 },

    /// A network call timed out. Retryable; never counts as divergence.
    #[error("timeout talking to peer {peer}")]
    Timeout { peer: String },

    /// The remote boundary rejected our request.
    #[error("rejected by peer: {0}")]
    Rejected(RejectCode),

    #[error("unknown peer {0}")]
    UnknownPeer(String),

    #[error(transparent)]
    Store(#[from] attest_store::StoreError),
}

impl SyncError {
    /// Whether the caller's scheduler should retry this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Manifest { .. } | Self::Divergence { .. } | Self::Timeout { .. } => true,
            Self::Quarantined { .. } | Self::Rejected(_) | Self::UnknownPeer(_) => false,
            Self::Store(_) => false,
        }
    }
}

/// Result type for federation operations.
pub type Result<T> = std::result::Result<T, SyncError>;
