//! Ledger records: immutable, hash-chained verification events.
//!
//! Every record belongs to exactly one anchor and links to its
//! predecessor on that anchor's chain via `prev_hash`. The record hash
//! covers all canonical fields (not the advisory producer signature), so
//! any payload or metadata tamper is detectable by recomputation.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_record_bytes, canonical_record_field_bytes};
use crate::crypto::{ContentHash, Ed25519Signature};
use crate::error::CoreError;
use crate::types::{AnchorId, RecordId};

/// The kind of verification event a record describes.
///
/// Open set: peers may introduce kinds this node does not know, so unknown
/// tags round-trip through [`RecordKind::Other`] rather than failing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// The first record on an anchor's chain.
    AnchorCreated,
    /// A signing event against the anchor.
    Signed,
    /// A verification outcome for the anchor.
    Verified,
    /// A third-party attestation about the anchor.
    Attested,
    /// A kind this node does not recognize.
    Other(String),
}

impl RecordKind {
    /// The wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AnchorCreated => "anchor_created",
            Self::Signed => "signed",
            Self::Verified => "verified",
            Self::Attested => "attested",
            Self::Other(s) => s,
        }
    }

    /// Parse a wire tag. Never fails: unknown tags become [`Self::Other`].
    pub fn parse(s: &str) -> Self {
        match s {
            "anchor_created" => Self::AnchorCreated,
            "signed" => Self::Signed,
            "verified" => Self::Verified,
            "attested" => Self::Attested,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecordKind {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordKind {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Ok(Self::parse(&s))
    }
}

/// An immutable ledger record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Unique, time-sortable record id.
    pub rid: RecordId,
    /// The anchor whose chain this record extends.
    pub anchor_id: AnchorId,
    /// Producer-assigned logical slot within the anchor's history.
    pub slot: String,
    /// What kind of event this is.
    pub kind: RecordKind,
    /// Event time (Unix ms) as claimed by the producer.
    pub ts: i64,
    /// Hash of the previous record on this anchor's chain, `None` for the
    /// chain head.
    pub prev_hash: Option<ContentHash>,
    /// Blake3 hash of the record's canonical encoding.
    pub hash: ContentHash,
    /// Opaque event payload. Must be a JSON object.
    pub payload: serde_json::Value,
    /// Optional producer signature over the record hash. Advisory: its
    /// absence never breaks the chain, its presence feeds trust scoring.
    pub sig: Option<Ed25519Signature>,
    /// Identifier of the producing node or service.
    pub producer: String,
    /// Record schema version tag.
    pub version: String,
}

impl LedgerRecord {
    /// Recompute this record's canonical hash from its fields.
    pub fn computed_hash(&self) -> ContentHash {
        ContentHash::hash(&canonical_record_bytes(self))
    }
}

/// Compute the hash a record with these fields would carry.
pub fn record_hash(record: &LedgerRecord) -> ContentHash {
    record.computed_hash()
}

/// Check that a record's stored hash matches its recomputed hash.
pub fn verify_record_hash(record: &LedgerRecord) -> Result<(), CoreError> {
    let actual = record.computed_hash();
    if actual != record.hash {
        return Err(CoreError::RecordHashMismatch {
            expected: record.hash.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}

/// Builder for a new record; assigns the rid and computes the hash.
#[derive(Clone, Debug)]
pub struct RecordDraft {
    pub anchor_id: AnchorId,
    pub slot: String,
    pub kind: RecordKind,
    pub ts: i64,
    pub payload: serde_json::Value,
    pub producer: String,
    pub version: String,
}

impl RecordDraft {
    /// Create a draft with the default schema version.
    pub fn new(
        anchor_id: impl Into<AnchorId>,
        slot: impl Into<String>,
        kind: RecordKind,
        ts: i64,
        payload: serde_json::Value,
        producer: impl Into<String>,
    ) -> Self {
        Self {
            anchor_id: anchor_id.into(),
            slot: slot.into(),
            kind,
            ts,
            payload,
            producer: producer.into(),
            version: "1".to_string(),
        }
    }

    /// Seal the draft into a record linked after `prev_hash`.
    ///
    /// Fails if the payload is not a JSON object: scalar or array payloads
    /// are almost always producer bugs and would silently hash-chain junk.
    pub fn seal(self, prev_hash: Option<ContentHash>) -> Result<LedgerRecord, CoreError> {
        if !self.payload.is_object() {
            return Err(CoreError::NonObjectPayload(json_type_name(&self.payload)));
        }

        let rid = RecordId::generate(self.ts);
        let bytes = canonical_record_field_bytes(
            &rid,
            &self.anchor_id,
            &self.slot,
            self.kind.as_str(),
            self.ts,
            prev_hash.as_ref(),
            &self.payload,
            &self.producer,
            &self.version,
        );
        let hash = ContentHash::hash(&bytes);

        Ok(LedgerRecord {
            rid,
            anchor_id: self.anchor_id,
            slot: self.slot,
            kind: self.kind,
            ts: self.ts,
            prev_hash,
            hash,
            payload: self.payload,
            sig: None,
            producer: self.producer,
            version: self.version,
        })
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
