//! Counter seam for the sync state machine.
//!
//! The syncer reports divergence and quarantine events into an injected
//! sink; rendering and aggregation happen elsewhere.

/// Counters the syncer reports into.
pub trait SyncMetrics: Send + Sync {
    fn record_divergence(&self);
    fn record_quarantine(&self);
}

/// Sink that drops everything.
#[derive(Default)]
pub struct NoopSyncMetrics;

impl SyncMetrics for NoopSyncMetrics {
    fn record_divergence(&self) {}
    fn record_quarantine(&self) {}
}
