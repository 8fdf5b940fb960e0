//! SQLite implementation of the LedgerStore trait.
//!
//! The primary durable backend. Uses rusqlite with bundled SQLite, wrapped
//! in async via tokio::spawn_blocking. Rid blobs compare bytewise in
//! SQLite, which matches [`attest_core::RecordId`] ordering, so range
//! scans over rid are plain BLOB comparisons.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use attest_core::{
    merkle_root, AnchorId, Checkpoint, CheckpointHeader, CheckpointId, ContentHash,
    Ed25519Signature, KeyId, LedgerRecord, RecordId, RecordKind,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    AppendOutcome, CheckpointDraft, LedgerStats, LedgerStore, SearchFilter, SyncReceipt,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn on_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }
}

fn blob_array<const N: usize>(
    bytes: Vec<u8>,
    idx: usize,
    name: &str,
) -> rusqlite::Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, name.into(), rusqlite::types::Type::Blob)
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerRecord> {
    let rid_bytes: Vec<u8> = row.get("rid")?;
    let anchor_id: String = row.get("anchor_id")?;
    let slot: String = row.get("slot")?;
    let kind: String = row.get("kind")?;
    let ts: i64 = row.get("ts")?;
    let prev_hash_bytes: Option<Vec<u8>> = row.get("prev_hash")?;
    let hash_bytes: Vec<u8> = row.get("hash")?;
    let payload_json: String = row.get("payload")?;
    let sig_bytes: Option<Vec<u8>> = row.get("sig")?;
    let producer: String = row.get("producer")?;
    let version: String = row.get("version")?;

    let payload: serde_json::Value = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let prev_hash = match prev_hash_bytes {
        Some(b) => Some(ContentHash::from_bytes(blob_array(b, 5, "prev_hash")?)),
        None => None,
    };
    let sig = match sig_bytes {
        Some(b) => Some(Ed25519Signature::from_bytes(blob_array(b, 8, "sig")?)),
        None => None,
    };

    Ok(LedgerRecord {
        rid: RecordId::from_bytes(blob_array(rid_bytes, 0, "rid")?),
        anchor_id: AnchorId::new(anchor_id),
        slot,
        kind: RecordKind::parse(&kind),
        ts,
        prev_hash,
        hash: ContentHash::from_bytes(blob_array(hash_bytes, 6, "hash")?),
        payload,
        sig,
        producer,
        version,
    })
}

const RECORD_COLUMNS: &str =
    "rid, anchor_id, slot, kind, ts, prev_hash, hash, payload, sig, producer, version";

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let cid_bytes: Vec<u8> = row.get("cid")?;
    let anchor_id: Option<String> = row.get("anchor_id")?;
    let range_start_bytes: Vec<u8> = row.get("range_start")?;
    let range_end_bytes: Vec<u8> = row.get("range_end")?;
    let merkle_root_bytes: Vec<u8> = row.get("merkle_root")?;
    let prev_root_bytes: Option<Vec<u8>> = row.get("prev_root")?;
    let created_at: i64 = row.get("created_at")?;
    let record_count: i64 = row.get("record_count")?;
    let sig_bytes: Vec<u8> = row.get("sig")?;
    let pubkey_id: String = row.get("pubkey_id")?;

    let prev_root = match prev_root_bytes {
        Some(b) => Some(ContentHash::from_bytes(blob_array(b, 5, "prev_root")?)),
        None => None,
    };

    Ok(Checkpoint {
        cid: CheckpointId::from_bytes(blob_array(cid_bytes, 0, "cid")?),
        header: CheckpointHeader {
            anchor_id: anchor_id.map(AnchorId::new),
            merkle_root: ContentHash::from_bytes(blob_array(merkle_root_bytes, 4, "merkle_root")?),
            range_start: RecordId::from_bytes(blob_array(range_start_bytes, 2, "range_start")?),
            range_end: RecordId::from_bytes(blob_array(range_end_bytes, 3, "range_end")?),
            prev_root,
            created_at,
        },
        record_count: record_count as u64,
        sig: Ed25519Signature::from_bytes(blob_array(sig_bytes, 8, "sig")?),
        pubkey_id: KeyId(pubkey_id),
    })
}

fn range_hashes_sync(
    conn: &Connection,
    anchor_id: Option<&AnchorId>,
    start: &RecordId,
    end: &RecordId,
) -> Result<Vec<ContentHash>> {
    let (sql, anchor_param): (&str, Option<&str>) = match anchor_id {
        Some(a) => (
            "SELECT hash FROM records
             WHERE rid >= ?1 AND rid <= ?2 AND anchor_id = ?3 ORDER BY rid",
            Some(a.as_str()),
        ),
        None => (
            "SELECT hash FROM records WHERE rid >= ?1 AND rid <= ?2 ORDER BY rid",
            None,
        ),
    };

    let mut stmt = conn.prepare(sql)?;
    let map_row = |row: &rusqlite::Row<'_>| {
        let bytes: Vec<u8> = row.get(0)?;
        Ok(ContentHash::from_bytes(blob_array(bytes, 0, "hash")?))
    };

    let hashes = match anchor_param {
        Some(a) => stmt
            .query_map(
                params![start.as_bytes().as_slice(), end.as_bytes().as_slice(), a],
                map_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        None => stmt
            .query_map(
                params![start.as_bytes().as_slice(), end.as_bytes().as_slice()],
                map_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?,
    };

    Ok(hashes)
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append(&self, record: LedgerRecord) -> Result<AppendOutcome> {
        self.on_conn(move |conn| {
            let tx = conn.transaction()?;

            // Idempotency: a byte-identical record has the same hash.
            let existing = tx
                .query_row(
                    &format!("SELECT {RECORD_COLUMNS} FROM records WHERE hash = ?1"),
                    params![record.hash.as_bytes().as_slice()],
                    row_to_record,
                )
                .optional()?;

            if let Some(existing) = existing {
                tx.commit()?;
                return Ok(AppendOutcome {
                    record: existing,
                    created: false,
                });
            }

            let rid_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM records WHERE rid = ?1)",
                params![record.rid.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if rid_taken {
                return Err(StoreError::RidConflict(record.rid.to_hex()));
            }

            let payload_json = serde_json::to_string(&record.payload)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            tx.execute(
                "INSERT INTO records (
                    rid, anchor_id, slot, kind, ts, prev_hash, hash,
                    payload, sig, producer, version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.rid.as_bytes().as_slice(),
                    record.anchor_id.as_str(),
                    &record.slot,
                    record.kind.as_str(),
                    record.ts,
                    record.prev_hash.as_ref().map(|h| h.as_bytes().as_slice()),
                    record.hash.as_bytes().as_slice(),
                    payload_json,
                    record.sig.as_ref().map(|s| s.as_bytes().as_slice()),
                    &record.producer,
                    &record.version,
                ],
            )?;

            tx.commit()?;
            Ok(AppendOutcome {
                record,
                created: true,
            })
        })
        .await
    }

    async fn get_record(&self, rid: &RecordId) -> Result<Option<LedgerRecord>> {
        let rid = *rid;
        self.on_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE rid = ?1"),
                params![rid.as_bytes().as_slice()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_chain(&self, anchor_id: &AnchorId) -> Result<Vec<LedgerRecord>> {
        let anchor_id = anchor_id.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM records WHERE anchor_id = ?1 ORDER BY rid"
            ))?;
            let records = stmt
                .query_map(params![anchor_id.as_str()], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn tail_hash(&self, anchor_id: &AnchorId) -> Result<Option<ContentHash>> {
        let anchor_id = anchor_id.clone();
        self.on_conn(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT hash FROM records WHERE anchor_id = ?1 ORDER BY rid DESC LIMIT 1",
                    params![anchor_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            match bytes {
                Some(b) => Ok(Some(ContentHash::from_bytes(blob_array(b, 0, "hash")?))),
                None => Ok(None),
            }
        })
        .await
    }

    async fn tail_record(&self, anchor_id: &AnchorId) -> Result<Option<LedgerRecord>> {
        let anchor_id = anchor_id.clone();
        self.on_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE anchor_id = ?1 ORDER BY rid DESC LIMIT 1"
                ),
                params![anchor_id.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn search(&self, filter: SearchFilter) -> Result<Vec<LedgerRecord>> {
        self.on_conn(move |conn| {
            let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(slot) = &filter.slot {
                sql.push_str(&format!(" AND slot = ?{}", args.len() + 1));
                args.push(Box::new(slot.clone()));
            }
            if let Some(kind) = &filter.kind {
                sql.push_str(&format!(" AND kind = ?{}", args.len() + 1));
                args.push(Box::new(kind.as_str().to_string()));
            }
            if let Some(since) = filter.since {
                sql.push_str(&format!(" AND ts >= ?{}", args.len() + 1));
                args.push(Box::new(since));
            }
            sql.push_str(" ORDER BY rid");
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT ?{}", args.len() + 1));
                args.push(Box::new(limit as i64));
            }

            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn range_hashes(
        &self,
        anchor_id: Option<&AnchorId>,
        start: &RecordId,
        end: &RecordId,
    ) -> Result<Vec<ContentHash>> {
        let anchor_id = anchor_id.cloned();
        let start = *start;
        let end = *end;
        self.on_conn(move |conn| range_hashes_sync(conn, anchor_id.as_ref(), &start, &end))
            .await
    }

    async fn global_hashes(&self, from_height: u64, limit: usize) -> Result<Vec<ContentHash>> {
        self.on_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT hash FROM records ORDER BY rid LIMIT ?1 OFFSET ?2")?;
            let hashes = stmt
                .query_map(params![limit as i64, from_height as i64], |row| {
                    let bytes: Vec<u8> = row.get(0)?;
                    Ok(ContentHash::from_bytes(blob_array(bytes, 0, "hash")?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hashes)
        })
        .await
    }

    async fn tip_height(&self) -> Result<u64> {
        self.on_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn create_checkpoint(
        &self,
        anchor_id: Option<AnchorId>,
        start: RecordId,
        end: RecordId,
    ) -> Result<Option<CheckpointDraft>> {
        self.on_conn(move |conn| {
            let hashes = range_hashes_sync(conn, anchor_id.as_ref(), &start, &end)?;
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
        })
        .await
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let cp = checkpoint.clone();
        self.on_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (
                    cid, anchor_id, range_start, range_end, merkle_root,
                    prev_root, created_at, record_count, sig, pubkey_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    cp.cid.as_bytes().as_slice(),
                    cp.header.anchor_id.as_ref().map(|a| a.as_str()),
                    cp.header.range_start.as_bytes().as_slice(),
                    cp.header.range_end.as_bytes().as_slice(),
                    cp.header.merkle_root.as_bytes().as_slice(),
                    cp.header.prev_root.as_ref().map(|h| h.as_bytes().as_slice()),
                    cp.header.created_at,
                    cp.record_count as i64,
                    cp.sig.as_bytes().as_slice(),
                    cp.pubkey_id.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_checkpoint(&self, cid: &CheckpointId) -> Result<Option<Checkpoint>> {
        let cid = *cid;
        self.on_conn(move |conn| {
            conn.query_row(
                "SELECT cid, anchor_id, range_start, range_end, merkle_root,
                        prev_root, created_at, record_count, sig, pubkey_id
                 FROM checkpoints WHERE cid = ?1",
                params![cid.as_bytes().as_slice()],
                row_to_checkpoint,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn latest_checkpoint(&self, anchor_id: Option<&AnchorId>) -> Result<Option<Checkpoint>> {
        let anchor_id = anchor_id.cloned();
        self.on_conn(move |conn| {
            let select = "SELECT cid, anchor_id, range_start, range_end, merkle_root,
                                 prev_root, created_at, record_count, sig, pubkey_id
                          FROM checkpoints";
            let result = match &anchor_id {
                Some(a) => conn
                    .query_row(
                        &format!(
                            "{select} WHERE anchor_id = ?1 ORDER BY created_at DESC LIMIT 1"
                        ),
                        params![a.as_str()],
                        row_to_checkpoint,
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        &format!("{select} ORDER BY created_at DESC LIMIT 1"),
                        [],
                        row_to_checkpoint,
                    )
                    .optional()?,
            };
            Ok(result)
        })
        .await
    }

    async fn append_sync_receipt(&self, receipt: SyncReceipt) -> Result<()> {
        self.on_conn(move |conn| {
            let detail = serde_json::to_string(&receipt.kind)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            conn.execute(
                "INSERT INTO sync_receipts (peer_id, ts, detail) VALUES (?1, ?2, ?3)",
                params![&receipt.peer_id, receipt.ts, detail],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_sync_receipts(&self, peer_id: &str) -> Result<Vec<SyncReceipt>> {
        let peer_id = peer_id.to_string();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT peer_id, ts, detail FROM sync_receipts WHERE peer_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![&peer_id], |row| {
                    let peer_id: String = row.get(0)?;
                    let ts: i64 = row.get(1)?;
                    let detail: String = row.get(2)?;
                    Ok((peer_id, ts, detail))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut receipts = Vec::with_capacity(rows.len());
            for (peer_id, ts, detail) in rows {
                let kind = serde_json::from_str(&detail)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                receipts.push(SyncReceipt { peer_id, ts, kind });
            }
            Ok(receipts)
        })
        .await
    }

    async fn get_stats(&self) -> Result<LedgerStats> {
        self.on_conn(|conn| {
            let records: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
            let anchors: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT anchor_id) FROM records",
                [],
                |r| r.get(0),
            )?;
            let checkpoints: i64 =
                conn.query_row("SELECT COUNT(*) FROM checkpoints", [], |r| r.get(0))?;
            let sync_receipts: i64 =
                conn.query_row("SELECT COUNT(*) FROM sync_receipts", [], |r| r.get(0))?;

            Ok(LedgerStats {
                records: records as u64,
                anchors: anchors as u64,
                checkpoints: checkpoints as u64,
                sync_receipts: sync_receipts as u64,
            })
        })
        .await
    }
}
