//! The ledger node: the facade producers and peers talk to.
//!
//! Composes the store, checkpoint service, boundary guards, and metrics.
//! Appends to one anchor are linearized under a per-anchor mutex; appends
//! to different anchors proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use attest_core::{
    verify_chain, AnchorId, ChainVerificationResult, Checkpoint, CheckpointId, LedgerRecord,
    RecordDraft, RecordId, RecordKind,
};
use attest_checkpoint::{CheckpointService, CheckpointSigner, SignatureVerdict};
use attest_federation::{
    AdmitOutcome, BoundaryGuards, CheckpointEnvelope, PeerId, PeerRegistry, RejectCode,
};
use attest_store::{LedgerStats, LedgerStore};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::metrics::MetricsSink;

/// What a producer submits to [`LedgerNode::append`].
#[derive(Clone, Debug)]
pub struct AppendRequest {
    pub anchor_id: AnchorId,
    pub slot: String,
    pub kind: RecordKind,
    pub payload: serde_json::Value,
    pub sig: Option<attest_core::Ed25519Signature>,
}

/// Result of an append: the record, and whether it was newly created.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendResponse {
    pub record: LedgerRecord,
    pub created: bool,
}

/// Full verification result for one checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointVerification {
    /// Signature verdict from the key registry.
    pub signature: SignatureVerdict,
    /// Whether the stored hashes still reproduce the sealed root.
    pub root_ok: bool,
}

/// The node facade.
pub struct LedgerNode<S> {
    store: Arc<S>,
    checkpoints: CheckpointService<S>,
    registry: PeerRegistry,
    guards: Mutex<BoundaryGuards>,
    metrics: Arc<dyn MetricsSink>,
    config: NodeConfig,
    /// One append lock per anchor, created on first use.
    append_locks: Mutex<HashMap<AnchorId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: LedgerStore> LedgerNode<S> {
    pub fn new(
        store: Arc<S>,
        signer: Arc<dyn CheckpointSigner>,
        registry: PeerRegistry,
        metrics: Arc<dyn MetricsSink>,
        config: NodeConfig,
    ) -> Self {
        let config = config.validated();
        Self {
            checkpoints: CheckpointService::new(store.clone(), signer),
            guards: Mutex::new(BoundaryGuards::new(config.guards)),
            store,
            registry,
            metrics,
            config,
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The checkpoint service.
    pub fn checkpoints(&self) -> &CheckpointService<S> {
        &self.checkpoints
    }

    fn anchor_lock(&self, anchor_id: &AnchorId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.append_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(anchor_id.clone()).or_default().clone()
    }

    /// Append a verification event to an anchor's chain.
    ///
    /// Linearized per anchor: the chain tail is read and the new record
    /// sealed against it under the anchor's lock. Submitting a request
    /// identical to the current tail is an idempotent no-op returning the
    /// existing record.
    pub async fn append(&self, request: AppendRequest) -> Result<AppendResponse> {
        let lock = self.anchor_lock(&request.anchor_id);
        let _guard = lock.lock().await;

        let tail = self.store.tail_record(&request.anchor_id).await?;

        if let Some(tail) = &tail {
            if tail.slot == request.slot
                && tail.kind == request.kind
                && tail.payload == request.payload
                && tail.producer == self.config.producer
                && tail.version == self.config.record_version
            {
                debug!(anchor = %request.anchor_id, rid = %tail.rid, "duplicate append, no-op");
                return Ok(AppendResponse {
                    record: tail.clone(),
                    created: false,
                });
            }
        }

        let draft = RecordDraft {
            anchor_id: request.anchor_id,
            slot: request.slot,
            kind: request.kind,
            ts: now_millis(),
            payload: request.payload,
            producer: self.config.producer.clone(),
            version: self.config.record_version.clone(),
        };
        let mut record = draft.seal(tail.map(|t| t.hash))?;
        record.sig = request.sig;

        let outcome = self.store.append(record).await?;
        self.metrics.record_append();
        Ok(AppendResponse {
            record: outcome.record,
            created: outcome.created,
        })
    }

    /// The full chain for an anchor, ascending.
    pub async fn get_chain(&self, anchor_id: &AnchorId) -> Result<Vec<LedgerRecord>> {
        Ok(self.store.get_chain(anchor_id).await?)
    }

    /// Verify an anchor's chain and derive its trust score.
    pub async fn verify_anchor(&self, anchor_id: &AnchorId) -> Result<ChainVerificationResult> {
        let chain = self.store.get_chain(anchor_id).await?;
        let result = verify_chain(&chain, self.config.trust_weights);
        self.metrics.record_verification();
        if !result.continuity_ok {
            info!(anchor = %anchor_id, errors = result.continuity_errors.len(), "continuity broken");
        }
        Ok(result)
    }

    /// Seal a checkpoint over an explicit range.
    pub async fn create_checkpoint(
        &self,
        anchor_id: Option<AnchorId>,
        start: RecordId,
        end: RecordId,
    ) -> Result<Option<Checkpoint>> {
        let checkpoint = self.checkpoints.build_and_sign(anchor_id, start, end).await?;
        if checkpoint.is_some() {
            self.metrics.record_checkpoint();
        }
        Ok(checkpoint)
    }

    /// Seal the next periodic global segment.
    pub async fn roll_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let checkpoint = self.checkpoints.roll_once(None, None).await?;
        if checkpoint.is_some() {
            self.metrics.record_checkpoint();
        }
        Ok(checkpoint)
    }

    /// The most recent checkpoint, optionally per anchor.
    pub async fn latest_checkpoint(
        &self,
        anchor_id: Option<&AnchorId>,
    ) -> Result<Option<Checkpoint>> {
        Ok(self.store.latest_checkpoint(anchor_id).await?)
    }

    /// Fetch a checkpoint by id.
    pub async fn get_checkpoint(&self, cid: &CheckpointId) -> Result<Option<Checkpoint>> {
        Ok(self.store.get_checkpoint(cid).await?)
    }

    /// Verify a stored checkpoint: signature against the key registry and
    /// the sealed root against the current stored hashes.
    pub async fn verify_checkpoint(&self, cid: &CheckpointId) -> Result<CheckpointVerification> {
        let checkpoint = self
            .store
            .get_checkpoint(cid)
            .await?
            .ok_or_else(|| NodeError::CheckpointNotFound(cid.to_hex()))?;

        let signature = self.checkpoints.verify_checkpoint(&checkpoint);
        let root_ok = self
            .checkpoints
            .verify_range(
                checkpoint.header.anchor_id.as_ref(),
                &checkpoint.header.range_start,
                &checkpoint.header.range_end,
                &checkpoint.header.merkle_root,
            )
            .await
            .is_ok();

        Ok(CheckpointVerification { signature, root_ok })
    }

    /// The checkpoint-ingestion surface: boundary checks, signature
    /// verification, then root verification of the enclosed checkpoint
    /// against local stored hashes.
    ///
    /// A rejection never mutates ledger state; an accepted envelope is
    /// verified but never merged into local chains.
    pub async fn ingest_checkpoint(
        &self,
        peer_id: &PeerId,
        content_type: &str,
        body_len: usize,
        envelope: &CheckpointEnvelope,
    ) -> std::result::Result<IngestOutcome, RejectCode> {
        let now = now_millis();
        let admitted = {
            let mut guards = self.guards.lock().unwrap_or_else(|p| p.into_inner());
            guards.admit(
                &self.registry,
                peer_id,
                content_type,
                body_len,
                envelope.envelope_id(),
                envelope.sent_at,
                now,
            )
        };

        let AdmitOutcome { replayed } = match admitted {
            Ok(outcome) => outcome,
            Err(code) => {
                self.metrics.record_rejection();
                return Err(code);
            }
        };

        let signature = self.checkpoints.verify_checkpoint(&envelope.checkpoint);
        let header = &envelope.checkpoint.header;
        let root_ok = self
            .checkpoints
            .verify_range(
                header.anchor_id.as_ref(),
                &header.range_start,
                &header.range_end,
                &header.merkle_root,
            )
            .await
            .is_ok();
        Ok(IngestOutcome {
            replayed,
            signature,
            root_ok,
        })
    }

    /// Operational counters.
    pub async fn stats(&self) -> Result<LedgerStats> {
        Ok(self.store.get_stats().await?)
    }
}

/// Result of ingesting a peer checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestOutcome {
    /// True when the envelope was seen before (MarkAccept replay mode).
    pub replayed: bool,
    /// Signature verdict for the enclosed checkpoint.
    pub signature: SignatureVerdict,
    /// Whether the sealed root reproduces from our stored hashes for the
    /// claimed range.
    pub root_ok: bool,
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
