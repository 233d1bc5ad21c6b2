//! Balance cache metrics
//!
//! Counters are kept in-process and exported by the service layer.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot of cache activity counters
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that fell back to the ledger
    pub misses: u64,
    /// Successful populations after a miss
    pub populates: u64,
    /// Populations that failed or timed out
    pub populate_failures: u64,
    /// Incremental updates committed
    pub delta_updates: u64,
    /// Incremental updates skipped because the entry was not populated
    pub skipped_updates: u64,
    /// Incremental updates that failed and cleared the entry
    pub update_failures: u64,
    /// Full ledger aggregations
    pub ledger_scans: u64,
}

impl CacheMetrics {
    /// Percentage of reads served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64) * 100.0
        }
    }
}

/// Kind of cache activity being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// Cache hit
    Hit,
    /// Cache miss
    Miss,
    /// Population committed
    Populate,
    /// Population failed
    PopulateFailure,
    /// Delta committed
    DeltaUpdate,
    /// Delta skipped
    SkippedUpdate,
    /// Delta failed
    UpdateFailure,
    /// Ledger aggregation executed
    LedgerScan,
}

/// Shared, async-safe metrics recorder
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    metrics: Arc<RwLock<CacheMetrics>>,
}

impl MetricsRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event
    pub async fn record(&self, event: CacheEvent) {
        let mut metrics = self.metrics.write().await;
        match event {
            CacheEvent::Hit => metrics.hits += 1,
            CacheEvent::Miss => metrics.misses += 1,
            CacheEvent::Populate => metrics.populates += 1,
            CacheEvent::PopulateFailure => metrics.populate_failures += 1,
            CacheEvent::DeltaUpdate => metrics.delta_updates += 1,
            CacheEvent::SkippedUpdate => metrics.skipped_updates += 1,
            CacheEvent::UpdateFailure => metrics.update_failures += 1,
            CacheEvent::LedgerScan => metrics.ledger_scans += 1,
        }
    }

    /// Current counters
    pub async fn snapshot(&self) -> CacheMetrics {
        *self.metrics.read().await
    }

    /// Reset all counters to zero
    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = CacheMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_metrics_hit_rate() {
        let mut metrics = CacheMetrics::default();

        // 0 total = 0% hit rate
        assert_eq!(metrics.hit_rate(), 0.0);

        // 8 hits, 2 misses = 80% hit rate
        metrics.hits = 8;
        metrics.misses = 2;
        assert_eq!(metrics.hit_rate(), 80.0);

        metrics.hits = 10;
        metrics.misses = 0;
        assert_eq!(metrics.hit_rate(), 100.0);
    }

    #[tokio::test]
    async fn test_recorder_counts_and_resets() {
        let recorder = MetricsRecorder::new();
        recorder.record(CacheEvent::Hit).await;
        recorder.record(CacheEvent::Hit).await;
        recorder.record(CacheEvent::Miss).await;
        recorder.record(CacheEvent::LedgerScan).await;

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.ledger_scans, 1);

        recorder.reset().await;
        assert_eq!(recorder.snapshot().await, CacheMetrics::default());
    }
}
