//! Checkpoint signing capability and the signer key registry.
//!
//! Signing is behind a trait so the algorithm can be swapped without
//! touching the service: the contract is bytes in, signature out. The
//! registry tracks which keys are active and which have been rotated out;
//! a checkpoint verifying under a rotated key is cryptographically valid
//! but flagged, because validity and current trust are distinct.

use std::collections::HashMap;

use attest_core::{Checkpoint, Ed25519PublicKey, KeyId, Keypair};

/// The signing capability used for checkpoints.
pub trait CheckpointSigner: Send + Sync {
    /// Identifier of the signing key, recorded on every checkpoint.
    fn key_id(&self) -> KeyId;

    /// The public half of the signing key.
    fn public_key(&self) -> Ed25519PublicKey;

    /// Sign a canonical header.
    fn sign(&self, message: &[u8]) -> attest_core::Ed25519Signature;
}

/// Ed25519-backed checkpoint signer.
pub struct Ed25519CheckpointSigner {
    keypair: Keypair,
}

impl Ed25519CheckpointSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

impl CheckpointSigner for Ed25519CheckpointSigner {
    fn key_id(&self) -> KeyId {
        KeyId::derive(self.keypair.public_key().as_bytes())
    }

    fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    fn sign(&self, message: &[u8]) -> attest_core::Ed25519Signature {
        self.keypair.sign(message)
    }
}

/// Lifecycle status of a registered signing key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    Active,
    Rotated,
}

/// Outcome of verifying a checkpoint signature against the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureVerdict {
    /// The signature verifies. `rotated` is set when the signing key has
    /// since been rotated out.
    Valid { rotated: bool },
    /// The checkpoint's `pubkey_id` is not in the registry.
    UnknownKey,
    /// The signature does not verify under the registered key.
    BadSignature,
}

/// Registry of checkpoint signing keys.
#[derive(Default)]
pub struct KeyRegistry {
    keys: HashMap<KeyId, (Ed25519PublicKey, KeyStatus)>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key as active.
    pub fn register_active(&mut self, pubkey: Ed25519PublicKey) -> KeyId {
        let key_id = KeyId::derive(pubkey.as_bytes());
        self.keys.insert(key_id.clone(), (pubkey, KeyStatus::Active));
        key_id
    }

    /// Mark a key as rotated. Returns false when the key is unknown.
    pub fn rotate(&mut self, key_id: &KeyId) -> bool {
        match self.keys.get_mut(key_id) {
            Some(entry) => {
                entry.1 = KeyStatus::Rotated;
                true
            }
            None => false,
        }
    }

    /// Look up a key and its status.
    pub fn get(&self, key_id: &KeyId) -> Option<(&Ed25519PublicKey, KeyStatus)> {
        self.keys.get(key_id).map(|(pk, status)| (pk, *status))
    }

    /// Verify a checkpoint's signature against the registered key for its
    /// `pubkey_id`.
    pub fn verify(&self, checkpoint: &Checkpoint) -> SignatureVerdict {
        let Some((pubkey, status)) = self.get(&checkpoint.pubkey_id) else {
            return SignatureVerdict::UnknownKey;
        };

        match checkpoint.verify_signature(pubkey) {
            Ok(()) => SignatureVerdict::Valid {
                rotated: status == KeyStatus::Rotated,
            },
            Err(_) => SignatureVerdict::BadSignature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{AnchorId, CheckpointHeader, ContentHash, RecordId};

    fn signed_checkpoint(keypair: &Keypair) -> Checkpoint {
        Checkpoint::sign(
            CheckpointHeader {
                anchor_id: Some(AnchorId::new("a1")),
                merkle_root: ContentHash::hash(b"root"),
                range_start: RecordId::from_bytes([1; 16]),
                range_end: RecordId::from_bytes([2; 16]),
                prev_root: None,
                created_at: 1_000,
            },
            4,
            keypair,
        )
    }

    #[test]
    fn test_active_key_verifies() {
        let keypair = Keypair::generate();
        let mut registry = KeyRegistry::new();
        registry.register_active(keypair.public_key());

        let cp = signed_checkpoint(&keypair);
        assert_eq!(registry.verify(&cp), SignatureVerdict::Valid { rotated: false });
    }

    #[test]
    fn test_rotated_key_flagged_not_failed() {
        let keypair = Keypair::generate();
        let mut registry = KeyRegistry::new();
        let key_id = registry.register_active(keypair.public_key());

        let cp = signed_checkpoint(&keypair);
        assert!(registry.rotate(&key_id));
        assert_eq!(registry.verify(&cp), SignatureVerdict::Valid { rotated: true });
    }

    #[test]
    fn test_unknown_key() {
        let keypair = Keypair::generate();
        let registry = KeyRegistry::new();
        let cp = signed_checkpoint(&keypair);
        assert_eq!(registry.verify(&cp), SignatureVerdict::UnknownKey);
    }

    #[test]
    fn test_bad_signature() {
        let keypair = Keypair::generate();
        let mut registry = KeyRegistry::new();
        registry.register_active(keypair.public_key());

        let mut cp = signed_checkpoint(&keypair);
        cp.header.merkle_root = ContentHash::hash(b"forged");
        assert_eq!(registry.verify(&cp), SignatureVerdict::BadSignature);
    }

    #[test]
    fn test_signer_trait_matches_key_id() {
        let keypair = Keypair::generate();
        let signer = Ed25519CheckpointSigner::new(keypair.clone());
        assert_eq!(signer.key_id(), KeyId::derive(keypair.public_key().as_bytes()));
    }
}
