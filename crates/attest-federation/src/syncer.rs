//! The range syncer: per-peer protocol state machine.
//!
//! Pulls range proofs from peers, verifies them against local hashes, and
//! maintains per-peer divergence accounting. Peer data is verified, never
//! merged: a disagreement produces a receipt and eventually quarantine,
//! not a local chain mutation.
//!
//! State per peer: `Unsynced -> Syncing -> {Synced | Diverged}` and, after
//! repeated divergence, `Quarantined`. Divergence counters live in process
//! memory; the receipts that justify them are durable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use attest_core::merkle_root;
use attest_store::{LedgerStore, SyncReceipt, SyncReceiptKind};

use crate::client::FederationClient;
use crate::error::{Result, SyncError};
use crate::manifest::{detect_rotation, ManifestCache};
use crate::messages::RangeProofRequest;
use crate::metrics::{NoopSyncMetrics, SyncMetrics};
use crate::peers::{PeerId, PeerRegistry};

const DEFAULT_DIVERGENCE_LIMIT: u32 = 2;
const DEFAULT_PAGE_SIZE: u32 = 256;
const DEFAULT_MANIFEST_TTL_MS: i64 = 30_000;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Sync state for one peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PeerSyncState {
    #[default]
    Unsynced,
    Syncing,
    Synced,
    Diverged,
    Quarantined,
}

/// Range syncer configuration, externally supplied.
#[derive(Clone, Copy, Debug)]
pub struct SyncerConfig {
    /// Consecutive divergences tolerated before quarantine.
    pub divergence_limit: u32,
    /// Heights requested per sync call.
    pub page_size: u32,
    pub manifest_ttl_ms: i64,
    /// Deadline applied to every peer RPC (ms).
    pub call_timeout_ms: u64,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            divergence_limit: DEFAULT_DIVERGENCE_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            manifest_ttl_ms: DEFAULT_MANIFEST_TTL_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

impl SyncerConfig {
    /// Replace out-of-range values with safe defaults.
    pub fn validated(mut self) -> Self {
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self.manifest_ttl_ms < 0 {
            self.manifest_ttl_ms = DEFAULT_MANIFEST_TTL_MS;
        }
        if self.call_timeout_ms == 0 {
            self.call_timeout_ms = DEFAULT_CALL_TIMEOUT_MS;
        }
        self
    }
}

/// A successful sync result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Highest height verified against the peer, `None` when the ranges
    /// did not overlap local data.
    pub verified_to: Option<u64>,
    /// Number of chunks checked.
    pub chunks: usize,
}

#[derive(Default)]
struct PeerSlot {
    state: PeerSyncState,
    divergences: u32,
    /// Serializes sync calls for this peer.
    lock: Arc<tokio::sync::Mutex<()>>,
}

/// The protocol state machine over all peers.
pub struct RangeSyncer<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    registry: PeerRegistry,
    config: SyncerConfig,
    metrics: Arc<dyn SyncMetrics>,
    slots: Mutex<HashMap<PeerId, PeerSlot>>,
    cache: Mutex<ManifestCache>,
}

impl<S: LedgerStore, C: FederationClient> RangeSyncer<S, C> {
    pub fn new(store: Arc<S>, client: Arc<C>, registry: PeerRegistry, config: SyncerConfig) -> Self {
        let config = config.validated();
        Self {
            store,
            client,
            registry,
            config,
            metrics: Arc::new(NoopSyncMetrics),
            slots: Mutex::new(HashMap::new()),
            cache: Mutex::new(ManifestCache::new(config.manifest_ttl_ms)),
        }
    }

    /// Report divergence and quarantine events into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Current state for a peer.
    pub fn state(&self, peer_id: &PeerId) -> PeerSyncState {
        self.with_slot(peer_id, |slot| slot.state)
    }

    /// Out-of-band trust decision: clear quarantine and divergence
    /// accounting for a peer.
    pub fn reset_quarantine(&self, peer_id: &PeerId) {
        self.with_slot(peer_id, |slot| {
            slot.state = PeerSyncState::Unsynced;
            slot.divergences = 0;
        });
        info!(peer = %peer_id, "quarantine reset");
    }

    /// Sync one page of heights starting at `start_height` against a peer.
    ///
    /// Calls for the same peer are serialized; different peers sync
    /// concurrently. Timeouts are retryable and never count as divergence.
    pub async fn sync(&self, peer_id: &PeerId, start_height: u64) -> Result<SyncOutcome> {
        let peer = self
            .registry
            .get(peer_id)
            .filter(|p| p.enabled)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPeer(peer_id.as_str().to_string()))?;

        let peer_lock = self.with_slot(peer_id, |slot| slot.lock.clone());
        let _guard = peer_lock.lock().await;

        // Read state under the lock: a concurrent sync for this peer may
        // have quarantined it while we waited.
        let (entry_state, failures) = self.with_slot(peer_id, |slot| {
            (slot.state, slot.divergences)
        });
        if entry_state == PeerSyncState::Quarantined {
            return Err(SyncError::Quarantined {
                peer: peer_id.as_str().to_string(),
                failures,
            });
        }

        self.ensure_manifest(peer_id, &peer).await?;
        self.set_state(peer_id, PeerSyncState::Syncing);

        let proof = match self
            .with_timeout(
                peer_id,
                self.client.fetch_range_proof(
                    &peer,
                    RangeProofRequest {
                        from_height: start_height,
                        max: self.config.page_size,
                    },
                ),
            )
            .await
        {
            Ok(proof) => proof,
            Err(err @ SyncError::Timeout { .. }) => {
                // Communication failure, not disagreement: restore state.
                self.set_state(peer_id, entry_state);
                return Err(err);
            }
            Err(err) => {
                self.set_state(peer_id, entry_state);
                return Err(err);
            }
        };

        let mut verified_to = None;
        for chunk in &proof.chunks {
            let local = self
                .store
                .global_hashes(chunk.start, chunk.roots.len())
                .await?;
            let overlap = local.len().min(chunk.roots.len());
            if overlap == 0 {
                // Peer is ahead of us here; nothing to verify against.
                continue;
            }

            let expected = merkle_root(&local[..overlap]);
            let observed = merkle_root(&chunk.roots[..overlap]);
            if expected != observed {
                return self
                    .record_divergence(peer_id, chunk.start, &expected, &observed)
                    .await;
            }
            verified_to = Some(chunk.start + overlap as u64 - 1);
        }

        self.store
            .append_sync_receipt(SyncReceipt {
                peer_id: peer_id.as_str().to_string(),
                ts: now_millis(),
                kind: SyncReceiptKind::Continuity {
                    verified_to: verified_to.unwrap_or(start_height),
                },
            })
            .await?;

        self.with_slot(peer_id, |slot| {
            slot.state = PeerSyncState::Synced;
            slot.divergences = 0;
        });
        debug!(peer = %peer_id, ?verified_to, chunks = proof.chunks.len(), "sync verified");

        Ok(SyncOutcome {
            verified_to,
            chunks: proof.chunks.len(),
        })
    }

    /// Fetch, verify, and cache the peer manifest; cache hits skip the
    /// round-trip. Rotation of the advertised key emits a durable receipt.
    async fn ensure_manifest(
        &self,
        peer_id: &PeerId,
        peer: &crate::peers::PeerRecord,
    ) -> Result<()> {
        let now = now_millis();
        {
            let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            if cache.get(peer_id, now).is_some() {
                return Ok(());
            }
        }

        let signed = self
            .with_timeout(peer_id, self.client.fetch_manifest(peer))
            .await?;
        if let Err(err) = signed.verify(&peer.pubkey) {
            self.set_state(peer_id, PeerSyncState::Unsynced);
            return Err(SyncError::Manifest {
                peer: peer_id.as_str().to_string(),
                reason: err.to_string(),
            });
        }

        let rotation = {
            let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            detect_rotation(peer_id, &signed.manifest, cache.get_stale(peer_id), now)
        };
        if let Some(receipt) = rotation {
            self.store.append_sync_receipt(receipt).await?;
        }

        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.insert(peer_id.clone(), signed.manifest, now);
        Ok(())
    }

    async fn record_divergence(
        &self,
        peer_id: &PeerId,
        height: u64,
        expected: &attest_core::ContentHash,
        observed: &attest_core::ContentHash,
    ) -> Result<SyncOutcome> {
        warn!(peer = %peer_id, height, expected = %expected, observed = %observed, "divergence");

        self.store
            .append_sync_receipt(SyncReceipt {
                peer_id: peer_id.as_str().to_string(),
                ts: now_millis(),
                kind: SyncReceiptKind::Divergence {
                    expected_root: expected.to_hex(),
                    observed_root: observed.to_hex(),
                    height,
                },
            })
            .await?;
        self.metrics.record_divergence();

        let failures = self.with_slot(peer_id, |slot| {
            slot.divergences += 1;
            slot.divergences
        });

        if failures > self.config.divergence_limit {
            self.store
                .append_sync_receipt(SyncReceipt {
                    peer_id: peer_id.as_str().to_string(),
                    ts: now_millis(),
                    kind: SyncReceiptKind::Quarantine { failures },
                })
                .await?;
            self.set_state(peer_id, PeerSyncState::Quarantined);
            self.metrics.record_quarantine();
            warn!(peer = %peer_id, failures, "peer quarantined");
            return Err(SyncError::Quarantined {
                peer: peer_id.as_str().to_string(),
                failures,
            });
        }

        self.set_state(peer_id, PeerSyncState::Diverged);
        Err(SyncError::Divergence {
            height,
            expected: expected.to_hex(),
            observed: observed.to_hex(),
        })
    }

    /// Apply the configured per-call deadline to a peer RPC.
    async fn with_timeout<T>(
        &self,
        peer_id: &PeerId,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(Duration::from_millis(self.config.call_timeout_ms), call).await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                peer: peer_id.as_str().to_string(),
            }),
        }
    }

    fn with_slot<T>(&self, peer_id: &PeerId, f: impl FnOnce(&mut PeerSlot) -> T) -> T {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        f(slots.entry(peer_id.clone()).or_default())
    }

    fn set_state(&self, peer_id: &PeerId, state: PeerSyncState) {
        self.with_slot(peer_id, |slot| slot.state = state);
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
