//! Proptest strategies for ledger types.

use proptest::collection::btree_map;
use proptest::prelude::*;

use attest_core::{ContentHash, RecordKind};

/// Any known kind, plus arbitrary unknown tags.
pub fn arb_record_kind() -> impl Strategy<Value = RecordKind> {
    prop_oneof![
        Just(RecordKind::AnchorCreated),
        Just(RecordKind::Signed),
        Just(RecordKind::Verified),
        Just(RecordKind::Attested),
        "[a-z][a-z_]{0,15}".prop_map(RecordKind::Other),
    ]
}

/// Scalar JSON values, including non-finite-free floats.
pub fn arb_json_scalar() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        (-1.0e12f64..1.0e12).prop_map(serde_json::Value::from),
        "[ -~]{0,32}".prop_map(serde_json::Value::from),
    ]
}

/// Flat JSON object payloads, the only shape records accept.
pub fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
    btree_map("[a-z][a-z0-9_]{0,11}", arb_json_scalar(), 0..8)
        .prop_map(|m| serde_json::Value::Object(m.into_iter().collect()))
}

/// Nested JSON objects, up to two levels, for canonical-encoding checks.
pub fn arb_nested_payload() -> impl Strategy<Value = serde_json::Value> {
    let inner = prop_oneof![
        arb_json_scalar(),
        proptest::collection::vec(arb_json_scalar(), 0..4)
            .prop_map(serde_json::Value::Array),
        arb_payload(),
    ];
    btree_map("[a-z][a-z0-9_]{0,11}", inner, 0..6)
        .prop_map(|m| serde_json::Value::Object(m.into_iter().collect()))
}

pub fn arb_anchor_id() -> impl Strategy<Value = String> {
    "[a-z]{2,8}-[0-9]{1,6}".prop_map(String::from)
}

pub fn arb_content_hash() -> impl Strategy<Value = ContentHash> {
    any::<[u8; 32]>().prop_map(ContentHash::from_bytes)
}

/// Leaf lists for Merkle properties, skewed toward small trees.
pub fn arb_leaves() -> impl Strategy<Value = Vec<ContentHash>> {
    proptest::collection::vec(arb_content_hash(), 0..32)
}
