//! # Attest Store
//!
//! Storage backends for the attest ledger.
//!
//! The [`LedgerStore`] trait defines the persistence interface: records,
//! checkpoints, sync receipts, and the range/height queries the checkpoint
//! and sync layers are built on. Two implementations:
//!
//! - [`MemoryStore`] - in-memory, for tests and ephemeral nodes
//! - [`SqliteStore`] - durable, rusqlite with bundled SQLite

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AppendOutcome, CheckpointDraft, LedgerStats, LedgerStore, SearchFilter, SyncReceipt,
    SyncReceiptKind,
};
