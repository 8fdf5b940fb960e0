//! Common fixtures for ledger tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use attest_core::{Keypair, LedgerRecord, RecordDraft, RecordKind};
use attest_federation::{
    CheckpointEnvelope, FederationClient, PeerId, PeerRecord, PeerRegistry, RangeProof,
    RangeProofRequest, SignedManifest, SyncError,
};
use attest_store::LedgerStore;

/// Deterministic keypair for tests that need stable keys.
pub fn test_keypair(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

/// A registry with one enabled peer whose manifests are signed by `keypair`.
pub fn single_peer_registry(peer_id: &str, keypair: &Keypair) -> PeerRegistry {
    PeerRegistry::load(vec![PeerRecord {
        id: PeerId::new(peer_id),
        url: format!("https://{peer_id}.example"),
        pubkey: keypair.public_key(),
        enabled: true,
    }])
    .expect("single-entry registry always loads")
}

/// Append `n` linked records to `anchor`, returning them in chain order.
pub async fn seed_chain<S: LedgerStore>(
    store: &S,
    anchor: &str,
    n: usize,
) -> Vec<LedgerRecord> {
    let mut records = Vec::with_capacity(n);
    let mut prev = None;
    for i in 0..n {
        let record = RecordDraft::new(
            anchor,
            format!("s{i}"),
            RecordKind::Verified,
            1_000 + i as i64,
            serde_json::json!({"seq": i, "result": "pass"}),
            "test-producer",
        )
        .seal(prev)
        .expect("object payload seals");
        prev = Some(record.hash);
        let outcome = store.append(record).await.expect("append succeeds");
        records.push(outcome.record);
    }
    records
}

/// One scripted reply for [`ScriptedClient`].
pub enum ScriptedReply {
    Manifest(Box<SignedManifest>),
    RangeProof(Box<RangeProof>),
    Timeout,
}

/// A federation client that replays a script of responses, in order.
///
/// Manifest and range-proof requests each consume from their own queue;
/// an exhausted queue answers with a timeout.
#[derive(Default)]
pub struct ScriptedClient {
    manifests: Mutex<VecDeque<ScriptedReply>>,
    proofs: Mutex<VecDeque<ScriptedReply>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_manifest(&self, manifest: SignedManifest) {
        self.manifests
            .lock()
            .expect("scripted client lock")
            .push_back(ScriptedReply::Manifest(Box::new(manifest)));
    }

    pub fn push_proof(&self, proof: RangeProof) {
        self.proofs
            .lock()
            .expect("scripted client lock")
            .push_back(ScriptedReply::RangeProof(Box::new(proof)));
    }

    pub fn push_manifest_timeout(&self) {
        self.manifests
            .lock()
            .expect("scripted client lock")
            .push_back(ScriptedReply::Timeout);
    }

    pub fn push_proof_timeout(&self) {
        self.proofs
            .lock()
            .expect("scripted client lock")
            .push_back(ScriptedReply::Timeout);
    }
}

#[async_trait]
impl FederationClient for ScriptedClient {
    async fn fetch_manifest(
        &self,
        peer: &PeerRecord,
    ) -> Result<SignedManifest, SyncError> {
        let reply = self
            .manifests
            .lock()
            .expect("scripted client lock")
            .pop_front();
        match reply {
            Some(ScriptedReply::Manifest(manifest)) => Ok(*manifest),
            _ => Err(SyncError::Timeout {
                peer: peer.id.as_str().to_string(),
            }),
        }
    }

    async fn fetch_range_proof(
        &self,
        peer: &PeerRecord,
        _request: RangeProofRequest,
    ) -> Result<RangeProof, SyncError> {
        let reply = self.proofs.lock().expect("scripted client lock").pop_front();
        match reply {
            Some(ScriptedReply::RangeProof(proof)) => Ok(*proof),
            _ => Err(SyncError::Timeout {
                peer: peer.id.as_str().to_string(),
            }),
        }
    }

    async fn submit_checkpoint(
        &self,
        _peer: &PeerRecord,
        _envelope: CheckpointEnvelope,
    ) -> Result<(), SyncError> {
        Ok(())
    }
}
