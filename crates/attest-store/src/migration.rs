//! Database schema migrations for SQLite.
//!
//! Simple versioned migrations: each version is a SQL batch that takes the
//! schema from N-1 to N.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Ledger records, one row per sealed record
        CREATE TABLE records (
            rid BLOB PRIMARY KEY,             -- 16 bytes, time-sortable
            anchor_id TEXT NOT NULL,
            slot TEXT NOT NULL,
            kind TEXT NOT NULL,
            ts INTEGER NOT NULL,              -- producer-claimed (Unix ms)
            prev_hash BLOB,                   -- 32 bytes, NULL for chain head
            hash BLOB NOT NULL UNIQUE,        -- 32 bytes, Blake3 of canonical bytes
            payload TEXT NOT NULL,            -- JSON object
            sig BLOB,                         -- 64 bytes, optional producer signature
            producer TEXT NOT NULL,
            version TEXT NOT NULL
        );

        -- Signed checkpoints
        CREATE TABLE checkpoints (
            cid BLOB PRIMARY KEY,             -- 16 bytes
            anchor_id TEXT,                   -- NULL for global checkpoints
            range_start BLOB NOT NULL,        -- 16 bytes, inclusive
            range_end BLOB NOT NULL,          -- 16 bytes, inclusive
            merkle_root BLOB NOT NULL,        -- 32 bytes
            prev_root BLOB,                   -- 32 bytes, NULL for first in series
            created_at INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            sig BLOB NOT NULL,                -- 64 bytes
            pubkey_id TEXT NOT NULL
        );

        -- Durable sync-protocol events per peer
        CREATE TABLE sync_receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            peer_id TEXT NOT NULL,
            ts INTEGER NOT NULL,
            detail TEXT NOT NULL              -- JSON-encoded receipt kind
        );

        -- Indexes for common queries
        CREATE INDEX idx_records_anchor_rid ON records(anchor_id, rid);
        CREATE INDEX idx_records_anchor_ts ON records(anchor_id, ts);
        CREATE INDEX idx_records_slot ON records(slot);
        CREATE INDEX idx_records_kind ON records(kind);
        CREATE INDEX idx_checkpoints_anchor ON checkpoints(anchor_id, created_at);
        CREATE INDEX idx_sync_receipts_peer ON sync_receipts(peer_id, id);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
