//! # Attest Federation
//!
//! Peer-to-peer synchronization for the attest ledger.
//!
//! - [`PeerRegistry`] - static peer directory, fail-fast loading
//! - [`SignedManifest`] / [`ManifestCache`] - peer key and tip statements
//! - [`FederationClient`] - RPC seam over the wire protocol
//! - [`RangeSyncer`] - the per-peer sync state machine with divergence
//!   accounting and quarantine
//! - [`BoundaryGuards`] - replay, clock-skew, rate, and size checks on the
//!   checkpoint-ingestion surface
//!
//! The syncer verifies peer data against the local ledger; it never merges
//! peer data into local chains.

pub mod client;
pub mod error;
pub mod guards;
pub mod manifest;
pub mod messages;
pub mod metrics;
pub mod peers;
pub mod syncer;

pub use client::{FederationClient, LoopbackClient};
pub use error::{Result, SyncError};
pub use guards::{AdmitOutcome, BoundaryGuards, GuardConfig, ReplayMode, MEDIA_TYPE_JSON};
pub use manifest::{detect_rotation, ManifestCache, PeerManifest, SignedManifest};
pub use messages::{
    CheckpointEnvelope, ManifestTip, RangeChunk, RangeProof, RangeProofRequest, RejectCode,
};
pub use metrics::{NoopSyncMetrics, SyncMetrics};
pub use peers::{PeerId, PeerRecord, PeerRegistry, RegistryError};
pub use syncer::{PeerSyncState, RangeSyncer, SyncOutcome, SyncerConfig};
