//! Protocol boundary guards for the checkpoint-ingestion surface.
//!
//! Every inbound envelope passes the same gauntlet before any protocol
//! logic runs: known peer, supported media type, body-size cap, clock-skew
//! window, replay detection, and a per-peer token-bucket rate limit. A
//! rejection never mutates ledger state.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use attest_core::ContentHash;

use crate::messages::RejectCode;
use crate::peers::{PeerId, PeerRegistry};

/// The only media type the ingestion surface accepts.
pub const MEDIA_TYPE_JSON: &str = "application/json";

const DEFAULT_CLOCK_SKEW_MS: i64 = 120_000;
const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;
const DEFAULT_RATE_PER_SEC: f64 = 5.0;
const DEFAULT_BURST: f64 = 10.0;
const REPLAY_SET_CAPACITY: usize = 4096;

/// How to treat a replayed envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// Reject with 409.
    #[default]
    Block,
    /// Accept, but flag the envelope as replayed.
    MarkAccept,
}

/// Boundary guard configuration, externally supplied.
#[derive(Clone, Copy, Debug)]
pub struct GuardConfig {
    /// Accepted |sender clock - local clock| (ms).
    pub clock_skew_ms: i64,
    pub replay_mode: ReplayMode,
    /// Token replenish rate per peer (tokens per second).
    pub rate_per_sec: f64,
    /// Token bucket capacity per peer.
    pub burst: f64,
    /// Maximum accepted body size (bytes).
    pub max_body_bytes: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            clock_skew_ms: DEFAULT_CLOCK_SKEW_MS,
            replay_mode: ReplayMode::Block,
            rate_per_sec: DEFAULT_RATE_PER_SEC,
            burst: DEFAULT_BURST,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl GuardConfig {
    /// Replace out-of-range values with safe defaults.
    pub fn validated(mut self) -> Self {
        if self.clock_skew_ms <= 0 {
            self.clock_skew_ms = DEFAULT_CLOCK_SKEW_MS;
        }
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            self.rate_per_sec = DEFAULT_RATE_PER_SEC;
        }
        if !self.burst.is_finite() || self.burst < 1.0 {
            self.burst = DEFAULT_BURST;
        }
        if self.max_body_bytes == 0 {
            self.max_body_bytes = DEFAULT_MAX_BODY_BYTES;
        }
        self
    }
}

/// A per-peer token bucket. Time is explicit so the bucket is pure state.
#[derive(Clone, Copy, Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill_ms: i64,
}

impl TokenBucket {
    fn new(burst: f64, now_ms: i64) -> Self {
        Self {
            tokens: burst,
            last_refill_ms: now_ms,
        }
    }

    /// Replenish up to `burst`, then try to take one token.
    fn try_consume(&mut self, rate_per_sec: f64, burst: f64, now_ms: i64) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_refill_ms).max(0) as f64;
        self.tokens = (self.tokens + elapsed / 1_000.0 * rate_per_sec).min(burst);
        self.last_refill_ms = now_ms;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Bounded set of recently seen envelope ids, FIFO eviction.
struct ReplaySet {
    seen: HashSet<ContentHash>,
    order: VecDeque<ContentHash>,
    capacity: usize,
}

impl ReplaySet {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, id: &ContentHash) -> bool {
        self.seen.contains(id)
    }

    /// Record an id; already-present ids keep their original position.
    fn insert(&mut self, id: ContentHash) {
        if self.seen.contains(&id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(id);
        self.seen.insert(id);
    }
}

/// Whether an admitted envelope was a replay (MarkAccept mode only).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmitOutcome {
    pub replayed: bool,
}

/// The guard state for the ingestion surface.
pub struct BoundaryGuards {
    config: GuardConfig,
    buckets: HashMap<PeerId, TokenBucket>,
    replays: ReplaySet,
}

impl BoundaryGuards {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config: config.validated(),
            buckets: HashMap::new(),
            replays: ReplaySet::new(REPLAY_SET_CAPACITY),
        }
    }

    /// Run all boundary checks for one inbound envelope.
    ///
    /// Check order matches the rejection taxonomy: identity, media type,
    /// size, clock skew, replay, rate. The first failure wins.
    pub fn admit(
        &mut self,
        registry: &PeerRegistry,
        peer_id: &PeerId,
        content_type: &str,
        body_len: usize,
        envelope_id: ContentHash,
        sent_at: i64,
        now_ms: i64,
    ) -> Result<AdmitOutcome, RejectCode> {
        let known = registry.get(peer_id).map(|p| p.enabled).unwrap_or(false);
        if !known {
            return Err(RejectCode::UnknownPeer);
        }

        if content_type != MEDIA_TYPE_JSON {
            return Err(RejectCode::UnsupportedMedia);
        }

        if body_len > self.config.max_body_bytes {
            return Err(RejectCode::TooLarge);
        }

        // Hostile sent_at values (e.g. i64::MIN) must reject, not overflow.
        let skew = now_ms
            .checked_sub(sent_at)
            .map(i64::saturating_abs)
            .unwrap_or(i64::MAX);
        if skew > self.config.clock_skew_ms {
            return Err(RejectCode::ClockSkew);
        }

        let replayed = self.replays.contains(&envelope_id);
        if replayed && self.config.replay_mode == ReplayMode::Block {
            warn!(peer = %peer_id, "blocked replayed envelope");
            return Err(RejectCode::Replay);
        }

        let bucket = self
            .buckets
            .entry(peer_id.clone())
            .or_insert_with(|| TokenBucket::new(self.config.burst, now_ms));
        if !bucket.try_consume(self.config.rate_per_sec, self.config.burst, now_ms) {
            return Err(RejectCode::RateLimited);
        }

        // Only admitted envelopes are remembered: a rate-limited envelope
        // must stay admissible for its retry after backoff.
        self.replays.insert(envelope_id);
        Ok(AdmitOutcome { replayed })
    }
}
