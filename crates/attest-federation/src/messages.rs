//! Wire message types for the federation protocol.
//!
//! The protocol is request/response over HTTP+JSON; these types are the
//! bodies. Transport is behind [`crate::client::FederationClient`], so the
//! protocol logic never touches sockets directly.

use serde::{Deserialize, Serialize};

use attest_core::{Checkpoint, ContentHash};

/// A peer's advertised ledger tip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestTip {
    /// Number of records in the peer's global sequence.
    pub height: u64,
    /// Merkle root over the peer's full global sequence.
    pub merkle_root: ContentHash,
    /// When the tip was computed (Unix ms).
    pub ts: i64,
    /// The producing node's identifier.
    pub producer: String,
}

/// Request for a proof over a height range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeProofRequest {
    /// First height requested (0-based, inclusive).
    pub from_height: u64,
    /// Maximum number of record hashes to return.
    pub max: u32,
}

/// One chunk of a range proof: the record hashes for an inclusive height
/// range. The verifier recomputes the chunk's Merkle root from these
/// leaves and compares against its own hashes for the same heights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeChunk {
    pub start: u64,
    pub end: u64,
    pub roots: Vec<ContentHash>,
}

/// Response to a [`RangeProofRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeProof {
    pub tip: ManifestTip,
    pub chunks: Vec<RangeChunk>,
}

/// A checkpoint submitted by a peer for ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    /// The sender's peer id.
    pub peer_id: String,
    /// When the sender produced the envelope (Unix ms). Checked against
    /// the receiver's clock-skew window.
    pub sent_at: i64,
    pub checkpoint: Checkpoint,
}

impl CheckpointEnvelope {
    /// Content hash of the envelope, used for replay detection.
    pub fn envelope_id(&self) -> ContentHash {
        let mut buf = Vec::new();
        // Struct field order is fixed, so this encoding is deterministic.
        if ciborium::into_writer(self, &mut buf).is_err() {
            buf.clear();
        }
        ContentHash::hash(&buf)
    }
}

/// Structured rejection codes for the checkpoint-ingestion boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    UnknownPeer,
    UnsupportedMedia,
    TooLarge,
    ClockSkew,
    Replay,
    RateLimited,
}

impl RejectCode {
    /// The HTTP status this rejection maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::UnknownPeer => 401,
            Self::UnsupportedMedia => 415,
            Self::TooLarge => 413,
            Self::ClockSkew => 422,
            Self::Replay => 409,
            Self::RateLimited => 429,
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnknownPeer => "unknown peer",
            Self::UnsupportedMedia => "unsupported content type",
            Self::TooLarge => "body too large",
            Self::ClockSkew => "timestamp outside clock-skew window",
            Self::Replay => "replayed envelope",
            Self::RateLimited => "rate limited",
        };
        write!(f, "{name} ({})", self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{AnchorId, CheckpointHeader, Keypair, RecordId};

    fn envelope(sent_at: i64) -> CheckpointEnvelope {
        let keypair = Keypair::from_seed(&[7; 32]);
        let checkpoint = Checkpoint::sign(
            CheckpointHeader {
                anchor_id: Some(AnchorId::new("a1")),
                merkle_root: ContentHash::hash(b"root"),
                range_start: RecordId::from_bytes([1; 16]),
                range_end: RecordId::from_bytes([2; 16]),
                prev_root: None,
                created_at: 1_000,
            },
            2,
            &keypair,
        );
        CheckpointEnvelope {
            peer_id: "peer-1".to_string(),
            sent_at,
            checkpoint,
        }
    }

    #[test]
    fn test_envelope_id_stable_and_content_sensitive() {
        let a = envelope(5_000);
        assert_eq!(a.envelope_id(), a.clone().envelope_id());

        let b = envelope(6_000);
        assert_ne!(a.envelope_id(), b.envelope_id());
    }

    #[test]
    fn test_reject_statuses() {
        assert_eq!(RejectCode::UnknownPeer.status(), 401);
        assert_eq!(RejectCode::Replay.status(), 409);
        assert_eq!(RejectCode::TooLarge.status(), 413);
        assert_eq!(RejectCode::UnsupportedMedia.status(), 415);
        assert_eq!(RejectCode::ClockSkew.status(), 422);
        assert_eq!(RejectCode::RateLimited.status(), 429);
    }

    #[test]
    fn test_range_proof_json_roundtrip() {
        let proof = RangeProof {
            tip: ManifestTip {
                height: 10,
                merkle_root: ContentHash::hash(b"tip"),
                ts: 5_000,
                producer: "peer-1".to_string(),
            },
            chunks: vec![RangeChunk {
                start: 0,
                end: 1,
                roots: vec![ContentHash::hash(b"r0"), ContentHash::hash(b"r1")],
            }],
        };
        let encoded = serde_json::to_string(&proof).unwrap();
        let decoded: RangeProof = serde_json::from_str(&encoded).unwrap();
        assert_eq!(proof, decoded);
    }
}
