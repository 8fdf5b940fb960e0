//! Peer manifests: signed statements of a peer's signing keys and tip.
//!
//! Manifests are cached per peer with a TTL so repeated syncs within the
//! window skip a round-trip. A manifest whose advertised signing key
//! differs from the previously cached one is a rotation event and is
//! recorded as a durable receipt for downstream trust decisions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use attest_core::{canonical_manifest_bytes, CoreError, Ed25519PublicKey, Ed25519Signature};
use attest_store::{SyncReceipt, SyncReceiptKind};

use crate::messages::ManifestTip;
use crate::peers::PeerId;

/// A peer's statement of its current signing keys and ledger tip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerManifest {
    /// Monotonic manifest epoch; bumped on every key change.
    pub epoch: u64,
    /// Currently valid signing keys, primary first.
    pub signing_pubkeys: Vec<Ed25519PublicKey>,
    pub tip: ManifestTip,
}

impl PeerManifest {
    /// The canonical bytes the manifest signature covers.
    pub fn signed_bytes(&self) -> Vec<u8> {
        canonical_manifest_bytes(
            self.epoch,
            &self.signing_pubkeys,
            self.tip.height,
            &self.tip.merkle_root,
            self.tip.ts,
            &self.tip.producer,
        )
    }

    /// The primary signing key, if any.
    pub fn primary_key(&self) -> Option<&Ed25519PublicKey> {
        self.signing_pubkeys.first()
    }
}

/// A manifest plus the signature over its canonical bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedManifest {
    pub manifest: PeerManifest,
    pub sig: Ed25519Signature,
}

impl SignedManifest {
    /// Sign a manifest.
    pub fn sign(manifest: PeerManifest, keypair: &attest_core::Keypair) -> Self {
        let sig = keypair.sign(&manifest.signed_bytes());
        Self { manifest, sig }
    }

    /// Verify the signature under the peer's configured key.
    pub fn verify(&self, pubkey: &Ed25519PublicKey) -> Result<(), CoreError> {
        pubkey.verify(&self.manifest.signed_bytes(), &self.sig)
    }
}

/// Emit a rotation receipt when the advertised primary key changed.
pub fn detect_rotation(
    peer_id: &PeerId,
    new: &PeerManifest,
    previous: Option<&PeerManifest>,
    now_ms: i64,
) -> Option<SyncReceipt> {
    let prev_key = previous.and_then(|m| m.primary_key())?;
    let new_key = new.primary_key()?;
    if prev_key == new_key {
        return None;
    }

    info!(peer = %peer_id, old = %prev_key.to_hex(), new = %new_key.to_hex(), "peer key rotation");
    Some(SyncReceipt {
        peer_id: peer_id.as_str().to_string(),
        ts: now_ms,
        kind: SyncReceiptKind::KeyRotation {
            old_key: prev_key.to_hex(),
            new_key: new_key.to_hex(),
        },
    })
}

/// TTL-bounded per-peer manifest cache.
pub struct ManifestCache {
    ttl_ms: i64,
    entries: HashMap<PeerId, (PeerManifest, i64)>,
}

impl ManifestCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    /// The cached manifest for a peer, if still fresh at `now_ms`.
    pub fn get(&self, peer_id: &PeerId, now_ms: i64) -> Option<&PeerManifest> {
        self.entries.get(peer_id).and_then(|(manifest, fetched_at)| {
            if now_ms.saturating_sub(*fetched_at) <= self.ttl_ms {
                Some(manifest)
            } else {
                None
            }
        })
    }

    /// The cached manifest regardless of freshness; rotation detection
    /// compares against this even when the entry has expired.
    pub fn get_stale(&self, peer_id: &PeerId) -> Option<&PeerManifest> {
        self.entries.get(peer_id).map(|(m, _)| m)
    }

    /// Cache a manifest fetched at `now_ms`.
    pub fn insert(&mut self, peer_id: PeerId, manifest: PeerManifest, now_ms: i64) {
        self.entries.insert(peer_id, (manifest, now_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{ContentHash, Keypair};

    fn manifest(keypair: &Keypair, epoch: u64) -> PeerManifest {
        PeerManifest {
            epoch,
            signing_pubkeys: vec![keypair.public_key()],
            tip: ManifestTip {
                height: 5,
                merkle_root: ContentHash::hash(b"tip"),
                ts: 1_000,
                producer: "peer-1".to_string(),
            },
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let signed = SignedManifest::sign(manifest(&keypair, 1), &keypair);
        signed.verify(&keypair.public_key()).unwrap();

        let other = Keypair::generate();
        assert!(signed.verify(&other.public_key()).is_err());
    }

    #[test]
    fn test_tampered_manifest_rejected() {
        let keypair = Keypair::generate();
        let mut signed = SignedManifest::sign(manifest(&keypair, 1), &keypair);
        signed.manifest.tip.height = 99;
        assert!(signed.verify(&keypair.public_key()).is_err());
    }

    #[test]
    fn test_cache_ttl() {
        let keypair = Keypair::generate();
        let mut cache = ManifestCache::new(1_000);
        let peer = PeerId::new("peer-1");
        cache.insert(peer.clone(), manifest(&keypair, 1), 10_000);

        assert!(cache.get(&peer, 10_500).is_some());
        assert!(cache.get(&peer, 11_000).is_some());
        assert!(cache.get(&peer, 11_001).is_none());
        assert!(cache.get_stale(&peer).is_some());
    }

    #[test]
    fn test_rotation_detection() {
        let old_kp = Keypair::from_seed(&[1; 32]);
        let new_kp = Keypair::from_seed(&[2; 32]);
        let peer = PeerId::new("peer-1");

        let old = manifest(&old_kp, 1);
        let same = detect_rotation(&peer, &manifest(&old_kp, 2), Some(&old), 5_000);
        assert!(same.is_none());

        let rotated = detect_rotation(&peer, &manifest(&new_kp, 2), Some(&old), 5_000).unwrap();
        assert!(matches!(
            rotated.kind,
            SyncReceiptKind::KeyRotation { .. }
        ));

        // No previous manifest: nothing to compare against
        assert!(detect_rotation(&peer, &manifest(&new_kp, 1), None, 5_000).is_none());
    }
}
