//! # Attest Core
//!
//! Pure primitives for the attest ledger: records, per-anchor hash chains,
//! Merkle trees, checkpoints, and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`LedgerRecord`] - An immutable, hash-chained verification event
//! - [`RecordId`] - Time-sortable unique record identifier
//! - [`AnchorId`] - Identity whose history forms one hash chain
//! - [`Checkpoint`] - A signed, Merkle-rooted summary over a record range
//! - [`ChainVerificationResult`] - Continuity verification plus trust score
//!
//! ## Canonicalization
//!
//! All hashed structures are encoded using deterministic CBOR. See the
//! [`canonical`] module.

pub mod canonical;
pub mod chain;
pub mod checkpoint;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod record;
pub mod types;

pub use canonical::{
    canonical_checkpoint_header_bytes, canonical_manifest_bytes, canonical_payload_bytes,
    canonical_record_bytes, canonical_value_bytes,
};
pub use chain::{
    verify_chain, ChainVerificationResult, ContinuityError, TrustWeights, DEFAULT_TRUST_WEIGHTS,
};
pub use checkpoint::{Checkpoint, CheckpointHeader};
pub use crypto::{ContentHash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::CoreError;
pub use merkle::{merkle_proof, merkle_root, verify_merkle_proof};
pub use record::{record_hash, verify_record_hash, LedgerRecord, RecordDraft, RecordKind};
pub use types::{AnchorId, CheckpointId, KeyId, RecordId};
