//! Chain continuity verification and trust scoring.
//!
//! A chain is the ascending record list for one anchor. Continuity holds
//! when the first record has no `prev_hash`, every later record links to
//! its predecessor's hash, and every stored hash matches its recomputed
//! canonical hash.
//!
//! The trust score is a weighted combination of fidelity, signature
//! coverage, and continuity. Invariant: a continuity violation can never
//! be compensated by payload-level signals, so fidelity inputs are clamped
//! to neutral when the chain is broken.

use serde::{Deserialize, Serialize};

use crate::record::LedgerRecord;
use crate::types::RecordId;

/// Weights for the trust score components. Must sum to 1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    /// Weight of the mean payload fidelity signal.
    pub fidelity: f64,
    /// Weight of the signed-record ratio.
    pub signature: f64,
    /// Weight of the continuity flag.
    pub continuity: f64,
}

/// Default weights: continuity dominates.
pub const DEFAULT_TRUST_WEIGHTS: TrustWeights = TrustWeights {
    fidelity: 0.25,
    signature: 0.25,
    continuity: 0.50,
};

impl TrustWeights {
    /// Check that the weights are non-negative and sum to 1.0.
    pub fn is_valid(&self) -> bool {
        self.fidelity >= 0.0
            && self.signature >= 0.0
            && self.continuity >= 0.0
            && (self.fidelity + self.signature + self.continuity - 1.0).abs() < 1e-9
    }

    /// Return these weights if valid, otherwise the defaults.
    pub fn or_default(self) -> Self {
        if self.is_valid() {
            self
        } else {
            DEFAULT_TRUST_WEIGHTS
        }
    }
}

impl Default for TrustWeights {
    fn default() -> Self {
        DEFAULT_TRUST_WEIGHTS
    }
}

/// A single continuity violation found during verification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ContinuityError {
    /// The first record carries a `prev_hash` but should be a chain head.
    UnexpectedHead { rid: RecordId },
    /// A record's `prev_hash` does not match its predecessor's hash.
    BrokenLink {
        rid: RecordId,
        expected: String,
        actual: String,
    },
    /// A record's stored hash does not match its recomputed hash.
    HashMismatch {
        rid: RecordId,
        expected: String,
        actual: String,
    },
    /// Records are not in ascending rid order.
    OutOfOrder { rid: RecordId },
}

impl std::fmt::Display for ContinuityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedHead { rid } => {
                write!(f, "record {rid} should be the chain head but has prev_hash")
            }
            Self::BrokenLink { rid, expected, actual } => {
                write!(f, "record {rid} links to {actual} but predecessor hash is {expected}")
            }
            Self::HashMismatch { rid, expected, actual } => {
                write!(f, "record {rid} stored hash {expected} but recomputed {actual}")
            }
            Self::OutOfOrder { rid } => write!(f, "record {rid} out of rid order"),
        }
    }
}

/// The result of verifying one anchor's chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    /// True when no continuity violations were found.
    pub continuity_ok: bool,
    /// All violations found; empty when `continuity_ok`.
    pub continuity_errors: Vec<ContinuityError>,
    /// Mean of payload fidelity signals, neutral 0.5 when absent or when
    /// continuity is broken.
    pub fidelity_mean: f64,
    /// 95% confidence half-width (1.96 x standard error) of the fidelity
    /// samples, 0.0 for single-record chains.
    pub fidelity_ci: f64,
    /// Fidelity mean minus the neutral 0.5.
    pub fidelity_bias: f64,
    /// Fraction of records carrying a producer signature.
    pub signed_ratio: f64,
    /// Weighted [0,1] trust score. An empty chain scores 0.0.
    pub trust_score: f64,
}

const NEUTRAL_FIDELITY: f64 = 0.5;

/// Verify a chain and derive its trust score.
///
/// `records` must be the ascending record list for one anchor, as returned
/// by the store's chain query.
pub fn verify_chain(records: &[LedgerRecord], weights: TrustWeights) -> ChainVerificationResult {
    let weights = weights.or_default();

    if records.is_empty() {
        return ChainVerificationResult {
            continuity_ok: true,
            continuity_errors: Vec::new(),
            fidelity_mean: NEUTRAL_FIDELITY,
            fidelity_ci: 0.0,
            fidelity_bias: 0.0,
            signed_ratio: 0.0,
            trust_score: 0.0,
        };
    }

    let mut errors = Vec::new();

    if records[0].prev_hash.is_some() {
        errors.push(ContinuityError::UnexpectedHead { rid: records[0].rid });
    }

    for (i, record) in records.iter().enumerate() {
        let actual = record.computed_hash();
        if actual != record.hash {
            errors.push(ContinuityError::HashMismatch {
                rid: record.rid,
                expected: record.hash.to_hex(),
                actual: actual.to_hex(),
            });
        }

        if i > 0 {
            let prev = &records[i - 1];
            if record.rid < prev.rid {
                errors.push(ContinuityError::OutOfOrder { rid: record.rid });
            }
            if record.prev_hash != Some(prev.hash) {
                errors.push(ContinuityError::BrokenLink {
                    rid: record.rid,
                    expected: prev.hash.to_hex(),
                    actual: record
                        .prev_hash
                        .map(|h| h.to_hex())
                        .unwrap_or_else(|| "none".to_string()),
                });
            }
        }
    }

    let continuity_ok = errors.is_empty();

    let (mut fidelity_mean, fidelity_ci, fidelity_bias) = fidelity_signals(records);
    if !continuity_ok {
        // Payload signals must never raise a broken chain's score.
        fidelity_mean = fidelity_mean.min(NEUTRAL_FIDELITY);
    }

    let signed = records.iter().filter(|r| r.sig.is_some()).count();
    let signed_ratio = signed as f64 / records.len() as f64;

    let continuity_component = if continuity_ok { 1.0 } else { 0.0 };
    let trust_score = (weights.fidelity * fidelity_mean
        + weights.signature * signed_ratio
        + weights.continuity * continuity_component)
        .clamp(0.0, 1.0);

    ChainVerificationResult {
        continuity_ok,
        continuity_errors: errors,
        fidelity_mean,
        fidelity_ci,
        fidelity_bias,
        signed_ratio,
        trust_score,
    }
}

/// Derive fidelity statistics from record payloads.
///
/// Each record contributes one sample: its numeric `fidelity` payload
/// field clamped to [0,1], or the neutral 0.5 when absent. The statistics
/// are computed here from those samples; producer-supplied summary fields
/// are never trusted. ci is 1.96 x the standard error of the sample mean,
/// bias is the mean's offset from neutral.
fn fidelity_signals(records: &[LedgerRecord]) -> (f64, f64, f64) {
    let samples: Vec<f64> = records
        .iter()
        .map(|r| {
            payload_f64(&r.payload, "fidelity")
                .map(|f| f.clamp(0.0, 1.0))
                .unwrap_or(NEUTRAL_FIDELITY)
        })
        .collect();

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let ci = if samples.len() > 1 {
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        1.96 * (variance / n).sqrt()
    } else {
        0.0
    };
    (mean, ci, mean - NEUTRAL_FIDELITY)
}

fn payload_f64(payload: &serde_json::Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(|v| v.as_f64())
}
