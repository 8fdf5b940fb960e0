//! # Attest Node
//!
//! The ledger node facade: what producers, operators, and peers talk to.
//!
//! [`LedgerNode`] composes a [`attest_store::LedgerStore`], the checkpoint
//! service, the federation boundary guards, and an injected metrics sink.
//! Appends to one anchor are linearized; the checkpoint-ingestion surface
//! applies the full rejection taxonomy before any protocol logic runs.

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use metrics::{AtomicMetrics, MetricsSink, MetricsSnapshot, NoopMetrics, SyncMetricsBridge};
pub use node::{
    AppendRequest, AppendResponse, CheckpointVerification, IngestOutcome, LedgerNode,
};
