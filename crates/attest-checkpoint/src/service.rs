//! The checkpoint service: building, signing, verifying, and rolling.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use attest_core::{
    merkle_root, AnchorId, Checkpoint, CheckpointHeader, CheckpointId, ContentHash, RecordId,
};
use attest_store::LedgerStore;

use crate::error::{CheckpointError, Result};
use crate::signer::{CheckpointSigner, KeyRegistry, SignatureVerdict};

/// Builds, signs, and verifies checkpoints over a store.
pub struct CheckpointService<S> {
    store: Arc<S>,
    signer: Arc<dyn CheckpointSigner>,
    registry: RwLock<KeyRegistry>,
    /// Serializes roll_once; it must never run concurrently with itself.
    roll_lock: tokio::sync::Mutex<()>,
}

impl<S: LedgerStore> CheckpointService<S> {
    /// Create a service. The signer's key is registered as active.
    pub fn new(store: Arc<S>, signer: Arc<dyn CheckpointSigner>) -> Self {
        let mut registry = KeyRegistry::new();
        registry.register_active(signer.public_key());
        Self {
            store,
            signer,
            registry: RwLock::new(registry),
            roll_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Register an additional verification key as active.
    pub fn register_key(&self, pubkey: attest_core::Ed25519PublicKey) -> attest_core::KeyId {
        match self.registry.write() {
            Ok(mut registry) => registry.register_active(pubkey),
            Err(poisoned) => poisoned.into_inner().register_active(pubkey),
        }
    }

    /// Mark a key as rotated.
    pub fn rotate_key(&self, key_id: &attest_core::KeyId) -> bool {
        match self.registry.write() {
            Ok(mut registry) => registry.rotate(key_id),
            Err(poisoned) => poisoned.into_inner().rotate(key_id),
        }
    }

    /// Build and sign a checkpoint over the inclusive rid range.
    ///
    /// Returns `Ok(None)` when the range holds zero records. The new
    /// checkpoint links to the previous one in the same series (same
    /// anchor scope) via `prev_root`.
    pub async fn build_and_sign(
        &self,
        anchor_id: Option<AnchorId>,
        start: RecordId,
        end: RecordId,
    ) -> Result<Option<Checkpoint>> {
        let Some(draft) = self
            .store
            .create_checkpoint(anchor_id.clone(), start, end)
            .await?
        else {
            debug!(?anchor_id, %start, %end, "empty range, no checkpoint");
            return Ok(None);
        };

        let prev_root = self
            .store
            .latest_checkpoint(anchor_id.as_ref())
            .await?
            .map(|cp| cp.header.merkle_root);

        let header = CheckpointHeader {
            anchor_id: draft.anchor_id,
            merkle_root: draft.merkle_root,
            range_start: draft.range_start,
            range_end: draft.range_end,
            prev_root,
            created_at: now_millis(),
        };

        let sig = self.signer.sign(&header.signed_bytes());
        let checkpoint = Checkpoint {
            cid: CheckpointId::generate(header.created_at),
            header,
            record_count: draft.record_count,
            sig,
            pubkey_id: self.signer.key_id(),
        };

        self.store.put_checkpoint(&checkpoint).await?;
        info!(
            cid = %checkpoint.cid,
            records = checkpoint.record_count,
            root = %checkpoint.header.merkle_root,
            "checkpoint sealed"
        );
        Ok(Some(checkpoint))
    }

    /// Recompute the Merkle root over the current stored hashes for the
    /// exact range and compare to `expected_root`.
    ///
    /// This is the primary tamper/rollback detector: any record in the
    /// range that was altered, removed, or reordered after sealing changes
    /// the recomputed root.
    pub async fn verify_range(
        &self,
        anchor_id: Option<&AnchorId>,
        start: &RecordId,
        end: &RecordId,
        expected_root: &ContentHash,
    ) -> Result<()> {
        let hashes = self.store.range_hashes(anchor_id, start, end).await?;
        if hashes.is_empty() {
            return Err(CheckpointError::EmptyRange {
                start: start.to_hex(),
                end: end.to_hex(),
            });
        }

        let actual = merkle_root(&hashes);
        if &actual != expected_root {
            warn!(expected = %expected_root, recomputed = %actual, "range root mismatch");
            return Err(CheckpointError::RootMismatch {
                expected: expected_root.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Seal the next global segment: from the end of the previous global
    /// checkpoint (or the epoch) up to now. Single-flight.
    ///
    /// `start_ts`/`end_ts` (Unix ms) override the default bounds.
    pub async fn roll_once(
        &self,
        start_ts: Option<i64>,
        end_ts: Option<i64>,
    ) -> Result<Option<Checkpoint>> {
        let _guard = self.roll_lock.lock().await;

        let start = match start_ts {
            Some(ts) => rid_lower_bound(ts),
            None => match self.store.latest_checkpoint(None).await? {
                Some(prev) => rid_successor(&prev.header.range_end),
                None => RecordId::ZERO,
            },
        };
        let end = rid_upper_bound(end_ts.unwrap_or_else(now_millis));

        if end < start {
            return Ok(None);
        }
        self.build_and_sign(None, start, end).await
    }

    /// Verify a checkpoint's signature against the key registry.
    pub fn verify_checkpoint(&self, checkpoint: &Checkpoint) -> SignatureVerdict {
        match self.registry.read() {
            Ok(registry) => registry.verify(checkpoint),
            Err(poisoned) => poisoned.into_inner().verify(checkpoint),
        }
    }
}

/// Smallest rid whose embedded timestamp is `ts`.
fn rid_lower_bound(ts: i64) -> RecordId {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&(ts.max(0) as u64).to_be_bytes());
    RecordId::from_bytes(bytes)
}

/// Largest rid whose embedded timestamp is `ts`.
fn rid_upper_bound(ts: i64) -> RecordId {
    let mut bytes = [0xffu8; 16];
    bytes[..8].copy_from_slice(&(ts.max(0) as u64).to_be_bytes());
    RecordId::from_bytes(bytes)
}

/// The rid immediately after `rid` in byte order.
fn rid_successor(rid: &RecordId) -> RecordId {
    let mut bytes = *rid.as_bytes();
    for byte in bytes.iter_mut().rev() {
        if *byte < 0xff {
            *byte += 1;
            return RecordId::from_bytes(bytes);
        }
        *byte = 0;
    }
    RecordId::MAX
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Ed25519CheckpointSigner;
    use attest_core::{Keypair, RecordDraft, RecordKind};
    use attest_store::MemoryStore;
    use serde_json::json;

    async fn service_with_records(
        n: usize,
    ) -> (CheckpointService<MemoryStore>, Vec<attest_core::LedgerRecord>) {
        let store = Arc::new(MemoryStore::new());
        let mut records = Vec::new();
        let mut prev = None;
        for i in 0..n {
            let record = RecordDraft::new(
                "a1",
                format!("s{i}"),
                RecordKind::Verified,
                1_000 + i as i64,
                json!({"i": i}),
                "node-a",
            )
            .seal(prev)
            .unwrap();
            prev = Some(record.hash);
            records.push(store.append(record).await.unwrap().record);
        }

        let signer = Arc::new(Ed25519CheckpointSigner::new(Keypair::generate()));
        (CheckpointService::new(store, signer), records)
    }

    #[tokio::test]
    async fn test_build_sign_and_verify_range() {
        let (service, records) = service_with_records(3).await;

        let cp = service
            .build_and_sign(Some(AnchorId::new("a1")), records[0].rid, records[2].rid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.record_count, 3);
        assert_eq!(
            service.verify_checkpoint(&cp),
            SignatureVerdict::Valid { rotated: false }
        );

        service
            .verify_range(
                Some(&AnchorId::new("a1")),
                &cp.header.range_start,
                &cp.header.range_end,
                &cp.header.merkle_root,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_verify_range_detects_mismatch() {
        let (service, records) = service_with_records(3).await;

        let cp = service
            .build_and_sign(None, records[0].rid, records[2].rid)
            .await
            .unwrap()
            .unwrap();

        let err = service
            .verify_range(
                None,
                &cp.header.range_start,
                &cp.header.range_end,
                &ContentHash::hash(b"wrong"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::RootMismatch { .. }));
    }

    #[tokio::test]
    async fn test_empty_range_is_none() {
        let (service, _) = service_with_records(0).await;
        let cp = service
            .build_and_sign(None, RecordId::ZERO, RecordId::MAX)
            .await
            .unwrap();
        assert!(cp.is_none());
    }

    #[tokio::test]
    async fn test_checkpoints_link_via_prev_root() {
        let (service, records) = service_with_records(4).await;

        let first = service
            .build_and_sign(None, records[0].rid, records[1].rid)
            .await
            .unwrap()
            .unwrap();
        assert!(first.header.prev_root.is_none());

        let second = service
            .build_and_sign(None, records[2].rid, records[3].rid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.header.prev_root, Some(first.header.merkle_root));
    }

    #[tokio::test]
    async fn test_roll_once_seals_from_epoch() {
        let (service, records) = service_with_records(3).await;

        let cp = service.roll_once(None, None).await.unwrap().unwrap();
        assert_eq!(cp.record_count, 3);
        assert_eq!(cp.header.range_start, RecordId::ZERO);

        // Nothing new: second roll covers an empty range.
        let again = service.roll_once(None, None).await.unwrap();
        assert!(again.is_none());
        let _ = records;
    }

    #[tokio::test]
    async fn test_rotated_key_flagged() {
        let (service, records) = service_with_records(2).await;
        let cp = service
            .build_and_sign(None, records[0].rid, records[1].rid)
            .await
            .unwrap()
            .unwrap();

        assert!(service.rotate_key(&cp.pubkey_id));
        assert_eq!(
            service.verify_checkpoint(&cp),
            SignatureVerdict::Valid { rotated: true }
        );
    }

    #[test]
    fn test_rid_successor() {
        let rid = RecordId::from_bytes([0; 16]);
        let next = rid_successor(&rid);
        assert!(next > rid);
        assert_eq!(next.as_bytes()[15], 1);

        let mut bytes = [0u8; 16];
        bytes[15] = 0xff;
        let carry = rid_successor(&RecordId::from_bytes(bytes));
        assert_eq!(carry.as_bytes()[14], 1);
        assert_eq!(carry.as_bytes()[15], 0);

        assert_eq!(rid_successor(&RecordId::MAX), RecordId::MAX);
    }
}
