//! Throughput and latency tracking for the analytics service.

use crate::analytics::binning::TierCounts;
use crate::types::alert::RiskTier;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the analytics service
pub struct AnalyticsMetrics {
    /// Batches derived into reports
    pub batches_processed: AtomicU64,
    /// Batches dropped because the payload was not a record collection
    pub batches_rejected: AtomicU64,
    /// Records across all derived batches
    pub records_processed: AtomicU64,
    /// Feed alerts raised
    pub feed_alerts: AtomicU64,
    /// Rule alerts raised
    pub rule_alerts: AtomicU64,
    /// Derivation times (in microseconds)
    derivation_times: RwLock<Vec<u64>>,
    /// Records per tier across all batches
    tiers: RwLock<TierCounts>,
    start_time: Instant,
}

impl AnalyticsMetrics {
    pub fn new() -> Self {
        Self {
            batches_processed: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            records_processed: AtomicU64::new(0),
            feed_alerts: AtomicU64::new(0),
            rule_alerts: AtomicU64::new(0),
            derivation_times: RwLock::new(Vec::with_capacity(1000)),
            tiers: RwLock::new(TierCounts::default()),
            start_time: Instant::now(),
        }
    }

    /// Record a derived batch
    pub fn record_batch(&self, records: usize, derivation_time: Duration, tiers: &TierCounts) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.records_processed.fetch_add(records as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.derivation_times.write() {
            times.push(derivation_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut total) = self.tiers.write() {
            total.low += tiers.low;
            total.medium += tiers.medium;
            total.high += tiers.high;
            total.critical += tiers.critical;
        }
    }

    pub fn record_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alerts(&self, feed: usize, rules: usize) {
        self.feed_alerts.fetch_add(feed as u64, Ordering::Relaxed);
        self.rule_alerts.fetch_add(rules as u64, Ordering::Relaxed);
    }

    /// Derivation time statistics
    pub fn get_derivation_stats(&self) -> DerivationStats {
        let Ok(times) = self.derivation_times.read() else {
            return DerivationStats::default();
        };
        if times.is_empty() {
            return DerivationStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        DerivationStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_tier_distribution(&self) -> TierCounts {
        self.tiers.read().map(|t| *t).unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let rejected = self.batches_rejected.load(Ordering::Relaxed);
        let records = self.records_processed.load(Ordering::Relaxed);
        let derivation = self.get_derivation_stats();
        let tiers = self.get_tier_distribution();

        info!(
            batches = batches,
            rejected = rejected,
            records = records,
            throughput = format!("{:.1} rec/s", self.get_throughput()),
            feed_alerts = self.feed_alerts.load(Ordering::Relaxed),
            rule_alerts = self.rule_alerts.load(Ordering::Relaxed),
            "Analytics metrics summary"
        );
        info!(
            mean_us = derivation.mean_us,
            p50_us = derivation.p50_us,
            p95_us = derivation.p95_us,
            p99_us = derivation.p99_us,
            max_us = derivation.max_us,
            "Derivation latency"
        );
        for tier in RiskTier::ALL {
            info!(
                tier = tier.as_str(),
                count = tiers.get(tier),
                percent = format!("{:.1}%", tiers.percent(tier)),
                "Tier distribution"
            );
        }
    }
}

impl Default for AnalyticsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Derivation time statistics
#[derive(Debug, Default)]
pub struct DerivationStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<AnalyticsMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<AnalyticsMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_recording() {
        let metrics = AnalyticsMetrics::new();
        let tiers = TierCounts {
            low: 3,
            medium: 1,
            high: 1,
            critical: 0,
        };

        metrics.record_batch(5, Duration::from_micros(100), &tiers);
        metrics.record_batch(5, Duration::from_micros(300), &tiers);
        metrics.record_rejected();
        metrics.record_alerts(2, 7);

        assert_eq!(metrics.batches_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.records_processed.load(Ordering::Relaxed), 10);
        assert_eq!(metrics.batches_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rule_alerts.load(Ordering::Relaxed), 7);
        assert_eq!(metrics.get_tier_distribution().low, 6);
        assert_eq!(metrics.get_tier_distribution().total(), 10);
    }

    #[test]
    fn test_derivation_stats() {
        let metrics = AnalyticsMetrics::new();
        assert_eq!(metrics.get_derivation_stats().count, 0);

        for us in [100, 200, 300, 400] {
            metrics.record_batch(1, Duration::from_micros(us), &TierCounts::default());
        }

        let stats = metrics.get_derivation_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.p50_us, 300);
        assert_eq!(stats.max_us, 400);
    }
}
