//! Signed checkpoints: Merkle-rooted summaries over record ranges.
//!
//! A checkpoint commits to the ordered record hashes in a rid range. The
//! signature covers the canonical header only; `cid`, `record_count`, and
//! `pubkey_id` are lookup metadata and can be recomputed or resolved from
//! the header and a key registry.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_checkpoint_header_bytes;
use crate::crypto::{ContentHash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::types::{AnchorId, CheckpointId, KeyId, RecordId};

/// The signed portion of a checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    /// The anchor this checkpoint covers, or `None` for a global
    /// (all-anchors) checkpoint.
    pub anchor_id: Option<AnchorId>,
    /// Merkle root over the record hashes in the range, in rid order.
    pub merkle_root: ContentHash,
    /// First rid of the covered range (inclusive).
    pub range_start: RecordId,
    /// Last rid of the covered range (inclusive).
    pub range_end: RecordId,
    /// Root of the previous checkpoint in this series, linking checkpoints
    /// into their own chain. `None` for the first checkpoint.
    pub prev_root: Option<ContentHash>,
    /// Signing time (Unix ms).
    pub created_at: i64,
}

impl CheckpointHeader {
    /// The canonical bytes the signature covers.
    pub fn signed_bytes(&self) -> Vec<u8> {
        canonical_checkpoint_header_bytes(
            self.anchor_id.as_ref(),
            &self.merkle_root,
            &self.range_start,
            &self.range_end,
            self.prev_root.as_ref(),
            self.created_at,
        )
    }
}

/// A signed checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint id.
    pub cid: CheckpointId,
    /// The signed header.
    #[serde(flatten)]
    pub header: CheckpointHeader,
    /// Number of records in the covered range.
    pub record_count: u64,
    /// Signature over [`CheckpointHeader::signed_bytes`].
    pub sig: Ed25519Signature,
    /// Which key signed this checkpoint.
    pub pubkey_id: KeyId,
}

impl Checkpoint {
    /// Sign a header, producing a complete checkpoint.
    pub fn sign(header: CheckpointHeader, record_count: u64, keypair: &Keypair) -> Self {
        let sig = keypair.sign(&header.signed_bytes());
        let pubkey_id = KeyId::derive(keypair.public_key().as_bytes());
        let cid = CheckpointId::generate(header.created_at);
        Self {
            cid,
            header,
            record_count,
            sig,
            pubkey_id,
        }
    }

    /// Verify the signature against the given public key.
    pub fn verify_signature(&self, pubkey: &Ed25519PublicKey) -> Result<(), CoreError> {
        pubkey.verify(&self.header.signed_bytes(), &self.sig)
    }
}
