//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Floats always encode as 64-bit (payloads are opaque JSON and may
//!   carry them; ledger metadata never does)
//!
//! The canonical encoding is critical: two logically equal documents must
//! produce identical bytes (and thus identical hashes) regardless of how
//! they were constructed.

use ciborium::value::Value;

use crate::crypto::{ContentHash, Ed25519PublicKey};
use crate::record::LedgerRecord;
use crate::types::{AnchorId, RecordId};

/// Record field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR. The `hash` and `sig` fields
/// are deliberately absent: the hash is computed *over* this encoding and
/// the signature is advisory metadata, not chain content.
mod keys {
    pub const RID: u64 = 0;
    pub const ANCHOR_ID: u64 = 1;
    pub const SLOT: u64 = 2;
    pub const KIND: u64 = 3;
    pub const TS: u64 = 4;
    pub const PREV_HASH: u64 = 5;
    pub const PAYLOAD: u64 = 6;
    pub const PRODUCER: u64 = 7;
    pub const VERSION: u64 = 8;
}

/// Checkpoint header field keys.
mod cp_keys {
    pub const ANCHOR_ID: u64 = 0;
    pub const MERKLE_ROOT: u64 = 1;
    pub const RANGE_START: u64 = 2;
    pub const RANGE_END: u64 = 3;
    pub const PREV_ROOT: u64 = 4;
    pub const CREATED_AT: u64 = 5;
}

/// Manifest field keys.
mod mf_keys {
    pub const EPOCH: u64 = 0;
    pub const SIGNING_PUBKEYS: u64 = 1;
    pub const TIP_HEIGHT: u64 = 2;
    pub const TIP_ROOT: u64 = 3;
    pub const TIP_TS: u64 = 4;
    pub const TIP_PRODUCER: u64 = 5;
}

/// Encode the hash-defining fields of a record to canonical bytes.
///
/// `record_hash` is the Blake3 digest of exactly this encoding.
pub fn canonical_record_bytes(record: &LedgerRecord) -> Vec<u8> {
    canonical_record_field_bytes(
        &record.rid,
        &record.anchor_id,
        &record.slot,
        record.kind.as_str(),
        record.ts,
        record.prev_hash.as_ref(),
        &record.payload,
        &record.producer,
        &record.version,
    )
}

/// Encode record fields to canonical bytes without a constructed record.
///
/// Used while building a record, before its hash exists.
#[allow(clippy::too_many_arguments)]
pub fn canonical_record_field_bytes(
    rid: &RecordId,
    anchor_id: &AnchorId,
    slot: &str,
    kind: &str,
    ts: i64,
    prev_hash: Option<&ContentHash>,
    payload: &serde_json::Value,
    producer: &str,
    version: &str,
) -> Vec<u8> {
    let prev_value = match prev_hash {
        Some(h) => Value::Bytes(h.0.to_vec()),
        None => Value::Null,
    };

    let entries = vec![
        (Value::Integer(keys::RID.into()), Value::Bytes(rid.0.to_vec())),
        (
            Value::Integer(keys::ANCHOR_ID.into()),
            Value::Text(anchor_id.as_str().to_string()),
        ),
        (Value::Integer(keys::SLOT.into()), Value::Text(slot.to_string())),
        (Value::Integer(keys::KIND.into()), Value::Text(kind.to_string())),
        (Value::Integer(keys::TS.into()), Value::Integer(ts.into())),
        (Value::Integer(keys::PREV_HASH.into()), prev_value),
        (Value::Integer(keys::PAYLOAD.into()), json_to_cbor_value(payload)),
        (
            Value::Integer(keys::PRODUCER.into()),
            Value::Text(producer.to_string()),
        ),
        (
            Value::Integer(keys::VERSION.into()),
            Value::Text(version.to_string()),
        ),
    ];

    let mut buf = Vec::new();
    encode_map_canonical(&mut buf, &entries);
    buf
}

/// Encode an opaque payload to canonical bytes.
pub fn canonical_payload_bytes(payload: &serde_json::Value) -> Vec<u8> {
    canonical_value_bytes(&json_to_cbor_value(payload))
}

/// Encode the signed header of a checkpoint.
///
/// The signature covers exactly these fields; `cid`, `record_count`, and
/// `pubkey_id` are lookup metadata outside the signed message.
pub fn canonical_checkpoint_header_bytes(
    anchor_id: Option<&AnchorId>,
    merkle_root: &ContentHash,
    range_start: &RecordId,
    range_end: &RecordId,
    prev_root: Option<&ContentHash>,
    created_at: i64,
) -> Vec<u8> {
    let anchor_value = match anchor_id {
        Some(a) => Value::Text(a.as_str().to_string()),
        None => Value::Null,
    };
    let prev_value = match prev_root {
        Some(h) => Value::Bytes(h.0.to_vec()),
        None => Value::Null,
    };

    let entries = vec![
        (Value::Integer(cp_keys::ANCHOR_ID.into()), anchor_value),
        (
            Value::Integer(cp_keys::MERKLE_ROOT.into()),
            Value::Bytes(merkle_root.0.to_vec()),
        ),
        (
            Value::Integer(cp_keys::RANGE_START.into()),
            Value::Bytes(range_start.0.to_vec()),
        ),
        (
            Value::Integer(cp_keys::RANGE_END.into()),
            Value::Bytes(range_end.0.to_vec()),
        ),
        (Value::Integer(cp_keys::PREV_ROOT.into()), prev_value),
        (
            Value::Integer(cp_keys::CREATED_AT.into()),
            Value::Integer(created_at.into()),
        ),
    ];

    let mut buf = Vec::new();
    encode_map_canonical(&mut buf, &entries);
    buf
}

/// Encode the signed body of a peer manifest.
pub fn canonical_manifest_bytes(
    epoch: u64,
    signing_pubkeys: &[Ed25519PublicKey],
    tip_height: u64,
    tip_root: &ContentHash,
    tip_ts: i64,
    tip_producer: &str,
) -> Vec<u8> {
    let pubkeys: Vec<Value> = signing_pubkeys
        .iter()
        .map(|k| Value::Bytes(k.0.to_vec()))
        .collect();

    let entries = vec![
        (
            Value::Integer(mf_keys::EPOCH.into()),
            Value::Integer(epoch.into()),
        ),
        (
            Value::Integer(mf_keys::SIGNING_PUBKEYS.into()),
            Value::Array(pubkeys),
        ),
        (
            Value::Integer(mf_keys::TIP_HEIGHT.into()),
            Value::Integer(tip_height.into()),
        ),
        (
            Value::Integer(mf_keys::TIP_ROOT.into()),
            Value::Bytes(tip_root.0.to_vec()),
        ),
        (
            Value::Integer(mf_keys::TIP_TS.into()),
            Value::Integer(tip_ts.into()),
        ),
        (
            Value::Integer(mf_keys::TIP_PRODUCER.into()),
            Value::Text(tip_producer.to_string()),
        ),
    ];

    let mut buf = Vec::new();
    encode_map_canonical(&mut buf, &entries);
    buf
}

/// Convert a JSON value to a CBOR value for canonical encoding.
fn json_to_cbor_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Integer(u.into())
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(json_to_cbor_value).collect())
        }
        serde_json::Value::Object(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), json_to_cbor_value(v)))
                .collect();
            Value::Map(entries)
        }
    }
}

/// Encode a CBOR Value to canonical bytes.
pub fn canonical_value_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            encode_integer(buf, *i);
        }
        Value::Bytes(b) => {
            encode_bytes(buf, b);
        }
        Value::Text(s) => {
            encode_text(buf, s);
        }
        Value::Array(arr) => {
            encode_array(buf, arr);
        }
        Value::Map(entries) => {
            encode_map_canonical(buf, entries);
        }
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
        }
        Value::Null => {
            buf.push(0xf6);
        }
        Value::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        _ => {
            // Tags and simple values never occur in ledger documents.
            debug_assert!(false, "unsupported CBOR value type");
        }
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        // Major type 0: unsigned integer
        encode_uint(buf, 0, n as u64);
    } else {
        // Major type 1: negative integer
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    // Encode all keys first to sort by encoded bytes
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    // Sort by encoded key bytes (lexicographic)
    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    // Write map header
    encode_uint(buf, 5, key_value_pairs.len() as u64);

    // Write sorted key-value pairs
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_insertion_order_independent() {
        let mut a = serde_json::Map::new();
        a.insert("result".into(), json!("pass"));
        a.insert("engine".into(), json!("detector-7"));
        a.insert("score".into(), json!(42));

        let mut b = serde_json::Map::new();
        b.insert("score".into(), json!(42));
        b.insert("engine".into(), json!("detector-7"));
        b.insert("result".into(), json!("pass"));

        let bytes_a = canonical_payload_bytes(&serde_json::Value::Object(a));
        let bytes_b = canonical_payload_bytes(&serde_json::Value::Object(b));
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn test_nested_payload_deterministic() {
        let p1 = json!({"outer": {"b": 2, "a": 1}, "list": [1, 2, 3]});
        let p2 = json!({"list": [1, 2, 3], "outer": {"a": 1, "b": 2}});
        assert_eq!(canonical_payload_bytes(&p1), canonical_payload_bytes(&p2));
    }

    #[test]
    fn test_payload_content_sensitive() {
        let p1 = json!({"a": 1});
        let p2 = json!({"a": 2});
        assert_ne!(canonical_payload_bytes(&p1), canonical_payload_bytes(&p2));
    }

    #[test]
    fn test_integer_encoding() {
        // Smallest encoding for various integer sizes
        let mut buf = Vec::new();

        // 0-23: single byte
        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        // 24-255: two bytes
        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 255);
        assert_eq!(buf, vec![0x18, 255]);

        // 256-65535: three bytes
        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 65535);
        assert_eq!(buf, vec![0x19, 0xff, 0xff]);
    }

    #[test]
    fn test_map_key_ordering() {
        // Integer keys must come out sorted regardless of construction order
        let mut buf = Vec::new();
        let entries = vec![
            (Value::Integer(8.into()), Value::Integer(80.into())),
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(5.into()), Value::Integer(50.into())),
        ];
        encode_map_canonical(&mut buf, &entries);

        // Map header (3 entries)
        assert_eq!(buf[0], 0xa3);
        // Keys should be in order: 0, 5, 8
        assert_eq!(buf[1], 0x00); // key 0
        assert_eq!(buf[2], 0x00); // value 0
        assert_eq!(buf[3], 0x05); // key 5
        assert_eq!(buf[4], 0x18); // value 50 (>23)
        assert_eq!(buf[5], 50);
        assert_eq!(buf[6], 0x08); // key 8
        assert_eq!(buf[7], 0x18); // value 80 (>23)
        assert_eq!(buf[8], 80);
    }

    #[test]
    fn test_checkpoint_header_prev_root_distinguishes() {
        let anchor = AnchorId::new("a1");
        let root = ContentHash::hash(b"root");
        let start = RecordId::from_bytes([1; 16]);
        let end = RecordId::from_bytes([2; 16]);

        let without = canonical_checkpoint_header_bytes(Some(&anchor), &root, &start, &end, None, 1000);
        let with = canonical_checkpoint_header_bytes(
            Some(&anchor),
            &root,
            &start,
            &end,
            Some(&ContentHash::hash(b"prev")),
            1000,
        );
        assert_ne!(without, with);
    }

    #[test]
    fn test_manifest_bytes_deterministic() {
        let key = Ed25519PublicKey::from_bytes([7; 32]);
        let root = ContentHash::hash(b"tip");
        let a = canonical_manifest_bytes(3, &[key], 10, &root, 5000, "peer-a");
        let b = canonical_manifest_bytes(3, &[key], 10, &root, 5000, "peer-a");
        assert_eq!(a, b);

        let c = canonical_manifest_bytes(4, &[key], 10, &root, 5000, "peer-a");
        assert_ne!(a, c);
    }
}
