//! Error types for attest-core.

use thiserror::Error;

/// Core errors that can occur during record and checkpoint operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("record hash mismatch: expected {expected}, got {actual}")]
    RecordHashMismatch { expected: String, actual: String },

    #[error("payload must be a JSON object, got {0}")]
    NonObjectPayload(&'static str),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("merkle proof index {index} out of bounds for {leaves} leaves")]
    ProofIndexOutOfBounds { index: usize, leaves: usize },
}
