//! # Attest Checkpoint
//!
//! Checkpoint signing and verification for the attest ledger.
//!
//! [`CheckpointService`] seals Merkle-rooted segments of the record
//! sequence into signed checkpoints, re-verifies ranges against stored
//! roots (the tamper detector), and rolls periodic global checkpoints.
//! Signing is behind the [`CheckpointSigner`] trait; the key registry
//! distinguishes active from rotated keys at verification time.

pub mod error;
pub mod service;
pub mod signer;

pub use error::{CheckpointError, Result};
pub use service::CheckpointService;
pub use signer::{
    CheckpointSigner, Ed25519CheckpointSigner, KeyRegistry, KeyStatus, SignatureVerdict,
};
