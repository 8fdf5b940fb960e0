//! End-to-end flows through the node facade: append, verify, checkpoint,
//! tamper detection, ingestion boundary, and peer sync.

use std::sync::Arc;

use serde_json::json;

use attest_checkpoint::{Ed25519CheckpointSigner, SignatureVerdict};
use attest_core::{merkle_root, AnchorId, ContinuityError, Ed25519Signature, RecordKind};
use attest_federation::{
    CheckpointEnvelope, GuardConfig, ManifestTip, PeerId, PeerManifest, PeerSyncState,
    RangeChunk, RangeProof, RangeSyncer, RejectCode, SignedManifest, SyncError, SyncerConfig,
    MEDIA_TYPE_JSON,
};
use attest_node::{AppendRequest, AtomicMetrics, LedgerNode, NodeConfig, SyncMetricsBridge};
use attest_store::{LedgerStore, MemoryStore, SyncReceiptKind};
use attest_testkit::{seed_chain, single_peer_registry, test_keypair, ScriptedClient};

fn build_node(
    config: NodeConfig,
) -> (Arc<MemoryStore>, Arc<AtomicMetrics>, LedgerNode<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let signer = Arc::new(Ed25519CheckpointSigner::new(test_keypair(9)));
    let registry = single_peer_registry("peer-1", &test_keypair(1));
    let metrics = Arc::new(AtomicMetrics::new());
    let node = LedgerNode::new(
        store.clone(),
        signer,
        registry,
        metrics.clone(),
        config,
    );
    (store, metrics, node)
}

fn request(anchor: &str, slot: &str, kind: RecordKind, payload: serde_json::Value) -> AppendRequest {
    AppendRequest {
        anchor_id: AnchorId::new(anchor),
        slot: slot.to_string(),
        kind,
        payload,
        sig: None,
    }
}

async fn append_three(node: &LedgerNode<MemoryStore>, anchor: &str) -> Vec<attest_core::LedgerRecord> {
    let kinds = [RecordKind::AnchorCreated, RecordKind::Signed, RecordKind::Verified];
    let mut records = Vec::new();
    for (i, kind) in kinds.into_iter().enumerate() {
        let response = node
            .append(request(anchor, &format!("s{i}"), kind, json!({"seq": i})))
            .await
            .unwrap();
        assert!(response.created);
        records.push(response.record);
    }
    records
}

#[tokio::test]
async fn test_append_links_chain_and_verifies() {
    let (_store, metrics, node) = build_node(NodeConfig::default());
    let records = append_three(&node, "a1").await;

    let chain = node.get_chain(&AnchorId::new("a1")).await.unwrap();
    assert_eq!(chain, records);
    assert!(chain[0].prev_hash.is_none());
    assert_eq!(chain[1].prev_hash, Some(chain[0].hash));
    assert_eq!(chain[2].prev_hash, Some(chain[1].hash));

    let result = node.verify_anchor(&AnchorId::new("a1")).await.unwrap();
    assert!(result.continuity_ok);
    assert!(result.continuity_errors.is_empty());
    assert!(result.trust_score > 0.0 && result.trust_score <= 1.0);

    let snap = metrics.snapshot();
    assert_eq!(snap.appends, 3);
    assert_eq!(snap.verifications, 1);
}

#[tokio::test]
async fn test_duplicate_append_is_idempotent() {
    let (_store, _metrics, node) = build_node(NodeConfig::default());

    let req = request("a1", "s0", RecordKind::AnchorCreated, json!({"v": 1}));
    let first = node.append(req.clone()).await.unwrap();
    assert!(first.created);

    let second = node.append(req).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.record, first.record);

    let chain = node.get_chain(&AnchorId::new("a1")).await.unwrap();
    assert_eq!(chain.len(), 1);

    // A different payload in the same slot is a new record, not a replay
    let third = node
        .append(request("a1", "s0", RecordKind::AnchorCreated, json!({"v": 2})))
        .await
        .unwrap();
    assert!(third.created);
    assert_eq!(third.record.prev_hash, Some(first.record.hash));
}

#[tokio::test]
async fn test_checkpoint_seals_and_verifies() {
    let (_store, metrics, node) = build_node(NodeConfig::default());
    let records = append_three(&node, "a1").await;

    let cp = node
        .create_checkpoint(None, records[0].rid, records[2].rid)
        .await
        .unwrap()
        .unwrap();
    let hashes: Vec<_> = records.iter().map(|r| r.hash).collect();
    assert_eq!(cp.header.merkle_root, merkle_root(&hashes));
    assert_eq!(cp.record_count, 3);

    let verification = node.verify_checkpoint(&cp.cid).await.unwrap();
    assert_eq!(
        verification.signature,
        SignatureVerdict::Valid { rotated: false }
    );
    assert!(verification.root_ok);

    let latest = node.latest_checkpoint(None).await.unwrap().unwrap();
    assert_eq!(latest.cid, cp.cid);
    assert_eq!(metrics.snapshot().checkpoints, 1);

    let stats = node.stats().await.unwrap();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.checkpoints, 1);
}

#[tokio::test]
async fn test_payload_tamper_breaks_continuity() {
    let (store, _metrics, node) = build_node(NodeConfig::default());
    let records = append_three(&node, "a1").await;

    let cp = node
        .create_checkpoint(None, records[0].rid, records[2].rid)
        .await
        .unwrap()
        .unwrap();

    assert!(store
        .tamper_payload(&records[1].rid, json!({"forged": true}))
        .unwrap());

    let result = node.verify_anchor(&AnchorId::new("a1")).await.unwrap();
    assert!(!result.continuity_ok);
    assert!(result.continuity_errors.iter().any(|e| matches!(
        e,
        ContinuityError::HashMismatch { rid, .. } if *rid == records[1].rid
    )));

    // The stored-hash index is untouched, so the sealed root still matches;
    // only recomputation from payloads exposes the tamper.
    let verification = node.verify_checkpoint(&cp.cid).await.unwrap();
    assert!(verification.root_ok);

    let chain = node.get_chain(&AnchorId::new("a1")).await.unwrap();
    let recomputed: Vec<_> = chain.iter().map(|r| r.computed_hash()).collect();
    assert_ne!(merkle_root(&recomputed), cp.header.merkle_root);
}

#[tokio::test]
async fn test_signatures_raise_trust_score() {
    let (_store, _metrics, node) = build_node(NodeConfig::default());

    append_three(&node, "unsigned").await;
    for i in 0..3 {
        let mut req = request("signed", &format!("s{i}"), RecordKind::Verified, json!({"seq": i}));
        req.sig = Some(Ed25519Signature::from_bytes([7; 64]));
        node.append(req).await.unwrap();
    }

    let unsigned = node.verify_anchor(&AnchorId::new("unsigned")).await.unwrap();
    let signed = node.verify_anchor(&AnchorId::new("signed")).await.unwrap();
    assert!(signed.continuity_ok && unsigned.continuity_ok);
    assert_eq!(signed.signed_ratio, 1.0);
    assert!(signed.trust_score > unsigned.trust_score);
}

async fn sealed_envelope(node: &LedgerNode<MemoryStore>, sent_at: i64) -> CheckpointEnvelope {
    let records = node.get_chain(&AnchorId::new("a1")).await.unwrap();
    let cp = node
        .create_checkpoint(None, records[0].rid, records[records.len() - 1].rid)
        .await
        .unwrap()
        .unwrap();
    CheckpointEnvelope {
        peer_id: "peer-1".to_string(),
        sent_at,
        checkpoint: cp,
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_ingest_rejection_taxonomy() {
    let (_store, metrics, node) = build_node(NodeConfig::default());
    append_three(&node, "a1").await;
    let envelope = sealed_envelope(&node, now_ms()).await;
    let peer = PeerId::new("peer-1");

    let err = node
        .ingest_checkpoint(&PeerId::new("peer-x"), MEDIA_TYPE_JSON, 512, &envelope)
        .await
        .unwrap_err();
    assert_eq!(err, RejectCode::UnknownPeer);
    assert_eq!(err.status(), 401);

    let err = node
        .ingest_checkpoint(&peer, "text/plain", 512, &envelope)
        .await
        .unwrap_err();
    assert_eq!(err, RejectCode::UnsupportedMedia);

    let err = node
        .ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 2 << 20, &envelope)
        .await
        .unwrap_err();
    assert_eq!(err, RejectCode::TooLarge);

    let stale = CheckpointEnvelope {
        sent_at: now_ms() - 600_000,
        ..envelope.clone()
    };
    let err = node
        .ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 512, &stale)
        .await
        .unwrap_err();
    assert_eq!(err, RejectCode::ClockSkew);

    // Accepted, then blocked as a replay
    let outcome = node
        .ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 512, &envelope)
        .await
        .unwrap();
    assert!(!outcome.replayed);
    assert_eq!(outcome.signature, SignatureVerdict::Valid { rotated: false });
    assert!(outcome.root_ok);

    let err = node
        .ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 512, &envelope)
        .await
        .unwrap_err();
    assert_eq!(err, RejectCode::Replay);

    assert_eq!(metrics.snapshot().rejections, 5);

    // A forged root clears the boundary but fails both signature and
    // root verification
    let mut forged = CheckpointEnvelope {
        sent_at: now_ms() + 1,
        ..envelope.clone()
    };
    forged.checkpoint.header.merkle_root = attest_core::ContentHash::hash(b"forged");
    let outcome = node
        .ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 512, &forged)
        .await
        .unwrap();
    assert_ne!(outcome.signature, SignatureVerdict::Valid { rotated: false });
    assert!(!outcome.root_ok);
}

#[tokio::test]
async fn test_ingest_rate_limit() {
    let config = NodeConfig {
        guards: GuardConfig {
            rate_per_sec: 1.0,
            burst: 2.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let (_store, _metrics, node) = build_node(config);
    append_three(&node, "a1").await;
    let peer = PeerId::new("peer-1");

    let base = now_ms();
    for i in 0..2 {
        // Distinct sent_at values keep the envelope ids distinct
        let envelope = sealed_envelope(&node, base + i).await;
        node.ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 512, &envelope)
            .await
            .unwrap();
    }

    let envelope = sealed_envelope(&node, base + 2).await;
    let err = node
        .ingest_checkpoint(&peer, MEDIA_TYPE_JSON, 512, &envelope)
        .await
        .unwrap_err();
    assert_eq!(err, RejectCode::RateLimited);
    assert_eq!(err.status(), 429);
}

#[tokio::test]
async fn test_sync_against_scripted_peer() {
    let store = Arc::new(MemoryStore::new());
    let records = seed_chain(store.as_ref(), "a1", 3).await;
    let hashes: Vec<_> = records.iter().map(|r| r.hash).collect();

    let peer_keypair = test_keypair(1);
    let registry = single_peer_registry("peer-1", &peer_keypair);
    let peer = PeerId::new("peer-1");

    let manifest = PeerManifest {
        epoch: 1,
        signing_pubkeys: vec![peer_keypair.public_key()],
        tip: ManifestTip {
            height: 3,
            merkle_root: merkle_root(&hashes),
            ts: now_ms(),
            producer: "peer-1".to_string(),
        },
    };

    let client = ScriptedClient::new();
    client.push_manifest(SignedManifest::sign(manifest, &peer_keypair));
    client.push_proof(RangeProof {
        tip: ManifestTip {
            height: 3,
            merkle_root: merkle_root(&hashes),
            ts: now_ms(),
            producer: "peer-1".to_string(),
        },
        chunks: vec![RangeChunk {
            start: 0,
            end: 2,
            roots: hashes.clone(),
        }],
    });

    let metrics = Arc::new(AtomicMetrics::new());
    let syncer = RangeSyncer::new(store.clone(), client.clone(), registry, SyncerConfig::default())
        .with_metrics(Arc::new(SyncMetricsBridge(metrics.clone())));

    let outcome = syncer.sync(&peer, 0).await.unwrap();
    assert_eq!(outcome.verified_to, Some(2));
    assert_eq!(syncer.state(&peer), PeerSyncState::Synced);

    // Second page from the same peer: manifest cache hit, tampered leaf
    let mut tampered = hashes.clone();
    tampered[0] = attest_core::ContentHash::hash(b"tampered");
    client.push_proof(RangeProof {
        tip: ManifestTip {
            height: 3,
            merkle_root: merkle_root(&tampered),
            ts: now_ms(),
            producer: "peer-1".to_string(),
        },
        chunks: vec![RangeChunk {
            start: 0,
            end: 2,
            roots: tampered,
        }],
    });

    let err = syncer.sync(&peer, 0).await.unwrap_err();
    assert!(matches!(err, SyncError::Divergence { .. }));
    assert_eq!(syncer.state(&peer), PeerSyncState::Diverged);

    let receipts = store.list_sync_receipts("peer-1").await.unwrap();
    assert!(receipts
        .iter()
        .any(|r| matches!(r.kind, SyncReceiptKind::Continuity { verified_to: 2 })));
    assert!(receipts
        .iter()
        .any(|r| matches!(r.kind, SyncReceiptKind::Divergence { .. })));

    let snap = metrics.snapshot();
    assert_eq!(snap.divergences, 1);
    assert_eq!(snap.quarantines, 0);
}
