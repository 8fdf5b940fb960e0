//! The `LedgerStore` trait and its supporting types.
//!
//! The store persists sealed records; it never seals them. Chain-tail
//! reads plus sealing happen above the store, under the node's per-anchor
//! append locks, so the store only has to enforce rid uniqueness and
//! hash-level idempotency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use attest_core::{
    AnchorId, Checkpoint, CheckpointId, ContentHash, LedgerRecord, RecordId, RecordKind,
};

use crate::error::Result;

/// Outcome of a store append.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendOutcome {
    /// The stored record (the existing one on idempotent replay).
    pub record: LedgerRecord,
    /// False when a byte-identical record already existed.
    pub created: bool,
}

/// Filter for record search.
#[derive(Clone, Debug, Default)]
pub struct SearchFilter {
    /// Exact slot match.
    pub slot: Option<String>,
    /// Exact kind match.
    pub kind: Option<RecordKind>,
    /// Only records with `ts >= since` (Unix ms).
    pub since: Option<i64>,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

/// An unsigned checkpoint computed by the store.
///
/// The store computes the Merkle root and count; signing and persisting
/// are the checkpoint service's job.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointDraft {
    pub anchor_id: Option<AnchorId>,
    pub range_start: RecordId,
    pub range_end: RecordId,
    pub merkle_root: ContentHash,
    pub record_count: u64,
}

/// Operational counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub records: u64,
    pub anchors: u64,
    pub checkpoints: u64,
    pub sync_receipts: u64,
}

/// What a sync receipt records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncReceiptKind {
    /// A sync attempt verified cleanly up to the given height.
    Continuity { verified_to: u64 },
    /// A peer's advertised root disagreed with ours.
    Divergence {
        expected_root: String,
        observed_root: String,
        height: u64,
    },
    /// A peer rotated its advertised signing key.
    KeyRotation { old_key: String, new_key: String },
    /// A peer crossed the divergence limit and was quarantined.
    Quarantine { failures: u32 },
}

/// A durable record of a sync-protocol event for one peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncReceipt {
    pub peer_id: String,
    pub ts: i64,
    pub kind: SyncReceiptKind,
}

/// Storage backend for the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a sealed record.
    ///
    /// Re-appending a byte-identical record (same hash) is a silent no-op
    /// reported via `created: false`. A different record claiming an
    /// existing rid is a [`crate::StoreError::RidConflict`].
    async fn append(&self, record: LedgerRecord) -> Result<AppendOutcome>;

    /// Fetch one record by rid.
    async fn get_record(&self, rid: &RecordId) -> Result<Option<LedgerRecord>>;

    /// The full chain for an anchor, ascending by rid.
    async fn get_chain(&self, anchor_id: &AnchorId) -> Result<Vec<LedgerRecord>>;

    /// Hash of the chain tail for an anchor, `None` for an empty chain.
    async fn tail_hash(&self, anchor_id: &AnchorId) -> Result<Option<ContentHash>>;

    /// The chain tail record for an anchor, `None` for an empty chain.
    async fn tail_record(&self, anchor_id: &AnchorId) -> Result<Option<LedgerRecord>>;

    /// Filtered record scan, ascending by rid.
    async fn search(&self, filter: SearchFilter) -> Result<Vec<LedgerRecord>>;

    /// Ordered record hashes in the inclusive rid range, optionally
    /// restricted to one anchor.
    async fn range_hashes(
        &self,
        anchor_id: Option<&AnchorId>,
        start: &RecordId,
        end: &RecordId,
    ) -> Result<Vec<ContentHash>>;

    /// Record hashes from the global rid-ordered sequence, starting at
    /// `from_height` (0-based), at most `limit` entries.
    ///
    /// "Height" is a record's index in the global sequence; it is the unit
    /// the sync protocol ranges over.
    async fn global_hashes(&self, from_height: u64, limit: usize) -> Result<Vec<ContentHash>>;

    /// Number of records in the global sequence (the next height).
    async fn tip_height(&self) -> Result<u64>;

    /// Compute an unsigned checkpoint over the inclusive rid range.
    ///
    /// Returns `Ok(None)` when the range holds zero records: a defined
    /// empty case, not an error.
    async fn create_checkpoint(
        &self,
        anchor_id: Option<AnchorId>,
        start: RecordId,
        end: RecordId,
    ) -> Result<Option<CheckpointDraft>>;

    /// Persist a signed checkpoint.
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Fetch one checkpoint by cid.
    async fn get_checkpoint(&self, cid: &CheckpointId) -> Result<Option<Checkpoint>>;

    /// The most recently created checkpoint, optionally for one anchor.
    async fn latest_checkpoint(&self, anchor_id: Option<&AnchorId>) -> Result<Option<Checkpoint>>;

    /// Append a durable sync receipt.
    async fn append_sync_receipt(&self, receipt: SyncReceipt) -> Result<()>;

    /// All sync receipts for a peer, in append order.
    async fn list_sync_receipts(&self, peer_id: &str) -> Result<Vec<SyncReceipt>>;

    /// Operational counters.
    async fn get_stats(&self) -> Result<LedgerStats>;
}
