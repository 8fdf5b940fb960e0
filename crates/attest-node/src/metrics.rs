//! Metrics sink interface.
//!
//! The node exposes counters; rendering them is a collaborator's job.
//! The sink is injected at construction, never a module-level global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter sink the node reports into.
pub trait MetricsSink: Send + Sync {
    fn record_append(&self);
    fn record_checkpoint(&self);
    fn record_verification(&self);
    fn record_rejection(&self);
    fn record_divergence(&self);
    fn record_quarantine(&self);
}

/// Sink that drops everything.
#[derive(Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_append(&self) {}
    fn record_checkpoint(&self) {}
    fn record_verification(&self) {}
    fn record_rejection(&self) {}
    fn record_divergence(&self) {}
    fn record_quarantine(&self) {}
}

/// Atomic counters, readable via [`AtomicMetrics::snapshot`].
#[derive(Default)]
pub struct AtomicMetrics {
    appends: AtomicU64,
    checkpoints: AtomicU64,
    verifications: AtomicU64,
    rejections: AtomicU64,
    divergences: AtomicU64,
    quarantines: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub appends: u64,
    pub checkpoints: u64,
    pub verifications: u64,
    pub rejections: u64,
    pub divergences: u64,
    pub quarantines: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            appends: self.appends.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            divergences: self.divergences.load(Ordering::Relaxed),
            quarantines: self.quarantines.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for AtomicMetrics {
    fn record_append(&self) {
        self.appends.fetch_add(1, Ordering::Relaxed);
    }

    fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    fn record_verification(&self) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_divergence(&self) {
        self.divergences.fetch_add(1, Ordering::Relaxed);
    }

    fn record_quarantine(&self) {
        self.quarantines.fetch_add(1, Ordering::Relaxed);
    }
}

/// Adapts a [`MetricsSink`] to the syncer's counter seam, so one sink
/// collects both node and sync counters.
pub struct SyncMetricsBridge(pub Arc<dyn MetricsSink>);

impl attest_federation::SyncMetrics for SyncMetricsBridge {
    fn record_divergence(&self) {
        self.0.record_divergence();
    }

    fn record_quarantine(&self) {
        self.0.record_quarantine();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_counters() {
        let metrics = AtomicMetrics::new();
        metrics.record_append();
        metrics.record_append();
        metrics.record_checkpoint();
        metrics.record_divergence();

        let snap = metrics.snapshot();
        assert_eq!(snap.appends, 2);
        assert_eq!(snap.checkpoints, 1);
        assert_eq!(snap.divergences, 1);
        assert_eq!(snap.rejections, 0);
        assert_eq!(snap.quarantines, 0);
    }

    #[test]
    fn test_bridge_forwards_sync_counters() {
        use attest_federation::SyncMetrics;

        let metrics = Arc::new(AtomicMetrics::new());
        let bridge = SyncMetricsBridge(metrics.clone());
        bridge.record_divergence();
        bridge.record_quarantine();

        let snap = metrics.snapshot();
        assert_eq!(snap.divergences, 1);
        assert_eq!(snap.quarantines, 1);
    }
}
