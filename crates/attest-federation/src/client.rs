//! The federation client: transport abstraction for peer RPC.
//!
//! [`FederationClient`] is the thin RPC seam over the wire protocol.
//! [`LoopbackClient`] answers requests from a local store, standing in for
//! a remote node in tests and single-process federations.

use std::sync::Arc;

use async_trait::async_trait;

use attest_core::{merkle_root, Keypair};
use attest_store::LedgerStore;

use crate::error::{Result, SyncError};
use crate::manifest::{PeerManifest, SignedManifest};
use crate::messages::{
    CheckpointEnvelope, ManifestTip, RangeChunk, RangeProof, RangeProofRequest,
};
use crate::peers::PeerRecord;

/// RPC interface to one federation peer.
#[async_trait]
pub trait FederationClient: Send + Sync {
    /// `GET /federation/manifest`
    async fn fetch_manifest(&self, peer: &PeerRecord) -> Result<SignedManifest>;

    /// `POST /federation/range_proof`
    async fn fetch_range_proof(
        &self,
        peer: &PeerRecord,
        request: RangeProofRequest,
    ) -> Result<RangeProof>;

    /// `POST /federation/checkpoint`
    async fn submit_checkpoint(
        &self,
        peer: &PeerRecord,
        envelope: CheckpointEnvelope,
    ) -> Result<()>;
}

/// A client whose "remote" is a local store.
pub struct LoopbackClient<S> {
    store: Arc<S>,
    keypair: Keypair,
    producer: String,
    /// Heights per range-proof chunk.
    chunk_size: usize,
}

impl<S: LedgerStore> LoopbackClient<S> {
    pub fn new(store: Arc<S>, keypair: Keypair, producer: impl Into<String>) -> Self {
        Self {
            store,
            keypair,
            producer: producer.into(),
            chunk_size: 64,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn tip(&self) -> Result<ManifestTip> {
        let height = self.store.tip_height().await?;
        let hashes = self.store.global_hashes(0, height as usize).await?;
        Ok(ManifestTip {
            height,
            merkle_root: merkle_root(&hashes),
            ts: now_millis(),
            producer: self.producer.clone(),
        })
    }
}

#[async_trait]
impl<S: LedgerStore> FederationClient for LoopbackClient<S> {
    async fn fetch_manifest(&self, _peer: &PeerRecord) -> Result<SignedManifest> {
        let manifest = PeerManifest {
            epoch: 1,
            signing_pubkeys: vec![self.keypair.public_key()],
            tip: self.tip().await?,
        };
        Ok(SignedManifest::sign(manifest, &self.keypair))
    }

    async fn fetch_range_proof(
        &self,
        _peer: &PeerRecord,
        request: RangeProofRequest,
    ) -> Result<RangeProof> {
        let hashes = self
            .store
            .global_hashes(request.from_height, request.max as usize)
            .await?;

        let mut chunks = Vec::new();
        for (i, window) in hashes.chunks(self.chunk_size).enumerate() {
            let start = request.from_height + (i * self.chunk_size) as u64;
            chunks.push(RangeChunk {
                start,
                end: start + window.len() as u64 - 1,
                roots: window.to_vec(),
            });
        }

        Ok(RangeProof {
            tip: self.tip().await?,
            chunks,
        })
    }

    async fn submit_checkpoint(
        &self,
        peer: &PeerRecord,
        _envelope: CheckpointEnvelope,
    ) -> Result<()> {
        if !peer.enabled {
            return Err(SyncError::UnknownPeer(peer.id.as_str().to_string()));
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerId;
    use attest_core::{AnchorId, RecordDraft, RecordKind};
    use attest_store::MemoryStore;
    use serde_json::json;

    fn peer() -> PeerRecord {
        PeerRecord {
            id: PeerId::new("peer-1"),
            url: "loopback".to_string(),
            pubkey: Keypair::from_seed(&[3; 32]).public_key(),
            enabled: true,
        }
    }

    async fn seeded_store(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut prev = None;
        for i in 0..n {
            let record = RecordDraft::new(
                "a1",
                format!("s{i}"),
                RecordKind::Verified,
                1_000 + i as i64,
                json!({"i": i}),
                "peer-1",
            )
            .seal(prev)
            .unwrap();
            prev = Some(record.hash);
            store.append(record).await.unwrap();
        }
        let _ = store.tail_hash(&AnchorId::new("a1")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_manifest_reflects_tip() {
        let store = seeded_store(3).await;
        let keypair = Keypair::generate();
        let client = LoopbackClient::new(store.clone(), keypair.clone(), "peer-1");

        let signed = client.fetch_manifest(&peer()).await.unwrap();
        signed.verify(&keypair.public_key()).unwrap();
        assert_eq!(signed.manifest.tip.height, 3);

        let hashes = store.global_hashes(0, 3).await.unwrap();
        assert_eq!(signed.manifest.tip.merkle_root, merkle_root(&hashes));
    }

    #[tokio::test]
    async fn test_range_proof_chunking() {
        let store = seeded_store(5).await;
        let client =
            LoopbackClient::new(store, Keypair::generate(), "peer-1").with_chunk_size(2);

        let proof = client
            .fetch_range_proof(
                &peer(),
                RangeProofRequest {
                    from_height: 0,
                    max: 5,
                },
            )
            .await
            .unwrap();

        assert_eq!(proof.chunks.len(), 3);
        assert_eq!(proof.chunks[0].start, 0);
        assert_eq!(proof.chunks[0].end, 1);
        assert_eq!(proof.chunks[2].start, 4);
        assert_eq!(proof.chunks[2].end, 4);
        assert_eq!(proof.chunks[2].roots.len(), 1);
    }
}
