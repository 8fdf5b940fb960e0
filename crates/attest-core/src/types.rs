//! Strong type definitions for the attest ledger.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 16-byte, time-sortable record identifier.
///
/// Layout: 8 bytes of big-endian Unix milliseconds followed by 8 random
/// bytes. Lexicographic byte order therefore equals creation-time order,
/// which makes rid ranges meaningful for checkpointing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub [u8; 16]);

impl RecordId {
    /// Generate a new id for the given timestamp (Unix ms).
    pub fn generate(ts_millis: i64) -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&(ts_millis.max(0) as u64).to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[8..]);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The embedded creation timestamp (Unix ms).
    pub fn timestamp_millis(&self) -> i64 {
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(ts) as i64
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// The zero record ID (sentinel, sorts before every real id).
    pub const ZERO: Self = Self([0u8; 16]);

    /// The maximum record ID (sorts after every real id).
    pub const MAX: Self = Self([0xff; 16]);
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.to_hex())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for RecordId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 16-byte checkpoint identifier, generated like [`RecordId`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub [u8; 16]);

impl CheckpointId {
    /// Generate a new id for the given timestamp (Unix ms).
    pub fn generate(ts_millis: i64) -> Self {
        Self(RecordId::generate(ts_millis).0)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckpointId({})", self.to_hex())
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The identity whose verification history forms one hash chain.
///
/// Anchor ids are assigned by external producers and treated as opaque
/// strings by the ledger core.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnchorId(pub String);

impl AnchorId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnchorId({})", self.0)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AnchorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a signing key, derived from the public key bytes.
///
/// Checkpoints record the `KeyId` of their signer so verifiers can look the
/// key up in a registry and distinguish active from rotated keys.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub String);

impl KeyId {
    /// Derive a key id from public key bytes (first 8 bytes of the Blake3
    /// hash, hex-encoded).
    pub fn derive(pubkey_bytes: &[u8]) -> Self {
        let digest = blake3::hash(pubkey_bytes);
        Self(hex::encode(&digest.as_bytes()[..8]))
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_time_sortable() {
        let earlier = RecordId::generate(1_000);
        let later = RecordId::generate(2_000);
        assert!(earlier < later);
        assert_eq!(earlier.timestamp_millis(), 1_000);
        assert_eq!(later.timestamp_millis(), 2_000);
    }

    #[test]
    fn test_record_id_hex_roundtrip() {
        let id = RecordId::generate(1_736_870_400_000);
        let recovered = RecordId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_record_id_unique() {
        let a = RecordId::generate(1_000);
        let b = RecordId::generate(1_000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_id_sentinels() {
        let id = RecordId::generate(1_000);
        assert!(RecordId::ZERO < id);
        assert!(id < RecordId::MAX);
    }

    #[test]
    fn test_key_id_deterministic() {
        let a = KeyId::derive(&[0x42; 32]);
        let b = KeyId::derive(&[0x42; 32]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);

        let c = KeyId::derive(&[0x43; 32]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_anchor_id_display() {
        let anchor = AnchorId::new("a1");
        assert_eq!(anchor.to_string(), "a1");
        assert_eq!(anchor.as_str(), "a1");
    }
}
