//! In-memory implementation of the LedgerStore trait.
//!
//! Used for testing and as a reference implementation of the store
//! semantics. Records live in a BTreeMap keyed by rid, so global order
//! and range scans come for free.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use attest_core::{
    merkle_root, AnchorId, Checkpoint, CheckpointId, ContentHash, LedgerRecord, RecordId,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    AppendOutcome, CheckpointDraft, LedgerStats, LedgerStore, SearchFilter, SyncReceipt,
};

#[derive(Default)]
struct Inner {
    /// Global record sequence, ordered by rid.
    records: BTreeMap<RecordId, LedgerRecord>,
    /// Per-anchor rid lists, ascending.
    by_anchor: HashMap<AnchorId, Vec<RecordId>>,
    /// Hash index for idempotency checks.
    by_hash: HashMap<ContentHash, RecordId>,
    checkpoints: Vec<Checkpoint>,
    sync_receipts: Vec<SyncReceipt>,
}

/// In-memory store, thread-safe via an internal RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Test support: overwrite a stored record's payload without updating
    /// its hash, simulating at-rest tampering.
    pub fn tamper_payload(&self, rid: &RecordId, payload: serde_json::Value) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.records.get_mut(rid) {
            Some(record) => {
                record.payload = payload;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, record: LedgerRecord) -> Result<AppendOutcome> {
        let mut inner = self.write()?;

        if let Some(existing_rid) = inner.by_hash.get(&record.hash) {
            // Byte-identical replay: return the stored record.
            let existing = inner.records[existing_rid].clone();
            return Ok(AppendOutcome {
                record: existing,
                created: false,
            });
        }

        if inner.records.contains_key(&record.rid) {
            return Err(StoreError::RidConflict(record.rid.to_hex()));
        }

        inner.by_hash.insert(record.hash, record.rid);
        inner
            .by_anchor
            .entry(record.anchor_id.clone())
            .or_default()
            .push(record.rid);
        inner.records.insert(record.rid, record.clone());

        Ok(AppendOutcome {
            record,
            created: true,
        })
    }

    async fn get_record(&self, rid: &RecordId) -> Result<Option<LedgerRecord>> {
        Ok(self.read()?.records.get(rid).cloned())
    }

    async fn get_chain(&self, anchor_id: &AnchorId) -> Result<Vec<LedgerRecord>> {
        let inner = self.read()?;
        let Some(rids) = inner.by_anchor.get(anchor_id) else {
            return Ok(Vec::new());
        };
        Ok(rids.iter().map(|rid| inner.records[rid].clone()).collect())
    }

    async fn tail_hash(&self, anchor_id: &AnchorId) -> Result<Option<ContentHash>> {
        let inner = self.read()?;
        Ok(inner
            .by_anchor
            .get(anchor_id)
            .and_then(|rids| rids.last())
            .map(|rid| inner.records[rid].hash))
    }

    async fn tail_record(&self, anchor_id: &AnchorId) -> Result<Option<LedgerRecord>> {
        let inner = self.read()?;
        Ok(inner
            .by_anchor
            .get(anchor_id)
            .and_then(|rids| rids.last())
            .map(|rid| inner.records[rid].clone()))
    }

    async fn search(&self, filter: SearchFilter) -> Result<Vec<LedgerRecord>> {
        let inner = self.read()?;
        let limit = filter.limit.unwrap_or(usize::MAX);

        let records = inner
            .records
            .values()
            .filter(|r| filter.slot.as_deref().map_or(true, |s| r.slot == s))
            .filter(|r| filter.kind.as_ref().map_or(true, |k| &r.kind == k))
            .filter(|r| filter.since.map_or(true, |since| r.ts >= since))
            .take(limit)
            .cloned()
            .collect();

        Ok(records)
    }

    async fn range_hashes(
        &self,
        anchor_id: Option<&AnchorId>,
        start: &RecordId,
        end: &RecordId,
    ) -> Result<Vec<ContentHash>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .range(*start..=*end)
            .filter(|(_, r)| anchor_id.map_or(true, |a| &r.anchor_id == a))
            .map(|(_, r)| r.hash)
            .collect())
    }

    async fn global_hashes(&self, from_height: u64, limit: usize) -> Result<Vec<ContentHash>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .values()
            .skip(from_height as usize)
            .take(limit)
            .map(|r| r.hash)
            .collect())
    }

    async fn tip_height(&self) -> Result<u64> {
        Ok(self.read()?.records.len() as u64)
    }

    async fn create_checkpoint(
        &self,
        anchor_id: Option<AnchorId>,
        start: RecordId,
        end: RecordId,
    ) -> Result<Option<CheckpointDraft>> {
        let hashes = self.range_hashes(anchor_id.as_ref(), &start, &end).await?;
        if hashes.is_empty() {
            return Ok(None);
        }

        Ok(Some(CheckpointDraft {
            anchor_id,
            range_start: start,
            range_end: end,
            merkle_root: merkle_root(&hashes),
            record_count: hashes.len() as u64,
        }))
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write()?.checkpoints.push(checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, cid: &CheckpointId) -> Result<Option<Checkpoint>> {
        Ok(self
            .read()?
            .checkpoints
            .iter()
            .find(|cp| &cp.cid == cid)
            .cloned())
    }

    async fn latest_checkpoint(&self, anchor_id: Option<&AnchorId>) -> Result<Option<Checkpoint>> {
        Ok(self
            .read()?
            .checkpoints
            .iter()
            .filter(|cp| anchor_id.is_none() || cp.header.anchor_id.as_ref() == anchor_id)
            .max_by_key(|cp| cp.header.created_at)
            .cloned())
    }

    async fn append_sync_receipt(&self, receipt: SyncReceipt) -> Result<()> {
        self.write()?.sync_receipts.push(receipt);
        Ok(())
    }

    async fn list_sync_receipts(&self, peer_id: &str) -> Result<Vec<SyncReceipt>> {
        Ok(self
            .read()?
            .sync_receipts
            .iter()
            .filter(|r| r.peer_id == peer_id)
            .cloned()
            .collect())
    }

    async fn get_stats(&self) -> Result<LedgerStats> {
        let inner = self.read()?;
        Ok(LedgerStats {
            records: inner.records.len() as u64,
            anchors: inner.by_anchor.len() as u64,
            checkpoints: inner.checkpoints.len() as u64,
            sync_receipts: inner.sync_receipts.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SyncReceiptKind;
    use attest_core::{RecordDraft, RecordKind};
    use serde_json::json;

    async fn append_chain(store: &MemoryStore, anchor: &str, n: usize) -> Vec<LedgerRecord> {
        let mut out = Vec::new();
        for i in 0..n {
            let prev = store.tail_hash(&AnchorId::new(anchor)).await.unwrap();
            let record = RecordDraft::new(
                anchor,
                format!("s{i}"),
                RecordKind::Verified,
                1_000 + i as i64,
                json!({"i": i}),
                "node-a",
            )
            .seal(prev)
            .unwrap();
            let outcome = store.append(record).await.unwrap();
            assert!(outcome.created);
            out.push(outcome.record);
        }
        out
    }

    #[tokio::test]
    async fn test_append_and_chain_order() {
        let store = MemoryStore::new();
        let records = append_chain(&store, "a1", 3).await;

        let chain = store.get_chain(&AnchorId::new("a1")).await.unwrap();
        assert_eq!(chain, records);
        assert_eq!(
            store.tail_hash(&AnchorId::new("a1")).await.unwrap(),
            Some(records[2].hash)
        );
    }

    #[tokio::test]
    async fn test_idempotent_append() {
        let store = MemoryStore::new();
        let records = append_chain(&store, "a1", 1).await;

        let again = store.append(records[0].clone()).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.record, records[0]);
        assert_eq!(store.get_stats().await.unwrap().records, 1);
    }

    #[tokio::test]
    async fn test_rid_conflict() {
        let store = MemoryStore::new();
        let records = append_chain(&store, "a1", 1).await;

        let mut forged = records[0].clone();
        forged.payload = json!({"forged": true});
        forged.hash = forged.computed_hash();

        let err = store.append(forged).await.unwrap_err();
        assert!(matches!(err, StoreError::RidConflict(_)));
    }

    #[tokio::test]
    async fn test_search_filters() {
        let store = MemoryStore::new();
        append_chain(&store, "a1", 5).await;

        let by_slot = store
            .search(SearchFilter {
                slot: Some("s2".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_slot.len(), 1);
        assert_eq!(by_slot[0].slot, "s2");

        let since = store
            .search(SearchFilter {
                since: Some(1_003),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(since.len(), 2);

        let limited = store
            .search(SearchFilter {
                limit: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[tokio::test]
    async fn test_checkpoint_draft_and_empty_range() {
        let store = MemoryStore::new();
        let records = append_chain(&store, "a1", 3).await;

        let draft = store
            .create_checkpoint(None, records[0].rid, records[2].rid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.record_count, 3);
        let hashes: Vec<ContentHash> = records.iter().map(|r| r.hash).collect();
        assert_eq!(draft.merkle_root, merkle_root(&hashes));

        // Empty range is a defined no-op
        let empty = store
            .create_checkpoint(None, RecordId::MAX, RecordId::MAX)
            .await
            .unwrap();
        assert!(empty.is_none());
    }

    #[tokio::test]
    async fn test_global_hashes_pagination() {
        let store = MemoryStore::new();
        let records = append_chain(&store, "a1", 4).await;

        assert_eq!(store.tip_height().await.unwrap(), 4);
        let page = store.global_hashes(1, 2).await.unwrap();
        assert_eq!(page, vec![records[1].hash, records[2].hash]);
        assert!(store.global_hashes(4, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_receipts() {
        let store = MemoryStore::new();
        store
            .append_sync_receipt(SyncReceipt {
                peer_id: "peer-1".to_string(),
                ts: 1_000,
                kind: SyncReceiptKind::Quarantine { failures: 3 },
            })
            .await
            .unwrap();

        let receipts = store.list_sync_receipts("peer-1").await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert!(store.list_sync_receipts("peer-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tamper_helper_changes_payload_only() {
        let store = MemoryStore::new();
        let records = append_chain(&store, "a1", 1).await;

        assert!(store
            .tamper_payload(&records[0].rid, json!({"forged": true}))
            .unwrap());

        let stored = store.get_record(&records[0].rid).await.unwrap().unwrap();
        assert_eq!(stored.hash, records[0].hash);
        assert_ne!(stored.computed_hash(), stored.hash);
    }
}
