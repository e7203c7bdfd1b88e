//! Risk binning and snapshot-wide aggregates.

use crate::types::alert::{RiskTier, TierScheme};
use crate::types::transaction::ScoredTransaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of categories kept in a breakdown
pub const CATEGORY_LIMIT: usize = 8;

/// Per-tier transaction counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl TierCounts {
    pub fn get(&self, tier: RiskTier) -> usize {
        match tier {
            RiskTier::Low => self.low,
            RiskTier::Medium => self.medium,
            RiskTier::High => self.high,
            RiskTier::Critical => self.critical,
        }
    }

    fn increment(&mut self, tier: RiskTier) {
        match tier {
            RiskTier::Low => self.low += 1,
            RiskTier::Medium => self.medium += 1,
            RiskTier::High => self.high += 1,
            RiskTier::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }

    /// Share of `tier` in percent; zero when empty.
    pub fn percent(&self, tier: RiskTier) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.get(tier) as f64 / total as f64 * 100.0
    }
}

/// Snapshot-wide risk aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAggregate {
    pub total: usize,
    pub counts_by_tier: TierCounts,
    /// Transactions with `probability > 0.5`
    pub fraud_count: usize,
    pub non_fraud_count: usize,
    pub fraud_rate: f64,
    pub avg_probability: f64,
}

/// Risk statistics for one merchant category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRisk {
    pub name: String,
    pub total: usize,
    pub fraud_count: usize,
    pub avg_risk: f64,
    /// Percentage of fraudulent transactions
    pub fraud_rate: f64,
}

/// Coarse probability mix of a snapshot, in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPulse {
    pub avg_probability: f64,
    /// `probability >= 0.7`
    pub high_risk_ratio: f64,
    /// `0.5 <= probability < 0.7`
    pub medium_risk_ratio: f64,
    /// `probability < 0.3`
    pub low_risk_ratio: f64,
}

/// Overall alarm level of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterLevel {
    /// No transactions to judge
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl MeterLevel {
    /// Level for a mean probability and a high-risk share in percent.
    ///
    /// Both must stay under a band's limits to land in it.
    pub fn classify(avg_probability: f64, high_risk_ratio: f64) -> Self {
        if avg_probability < 0.2 && high_risk_ratio < 5.0 {
            MeterLevel::Low
        } else if avg_probability < 0.4 && high_risk_ratio < 15.0 {
            MeterLevel::Medium
        } else if avg_probability < 0.6 && high_risk_ratio < 30.0 {
            MeterLevel::High
        } else {
            MeterLevel::Critical
        }
    }
}

/// Single gauge summarizing snapshot risk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMeter {
    pub level: MeterLevel,
    /// Mean probability scaled to 0..=100
    pub score: f64,
    /// Share of `probability > 0.7`, in percent
    pub high_risk_ratio: f64,
    pub high_risk_count: usize,
    pub total: usize,
}

/// Buckets transactions into ordered risk tiers.
#[derive(Debug, Clone, Default)]
pub struct RiskBinner {
    scheme: TierScheme,
}

impl RiskBinner {
    /// Create a binner for a tier scheme.
    pub fn new(scheme: TierScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> TierScheme {
        self.scheme
    }

    /// Tier of a single probability
    pub fn bin(&self, probability: f64) -> RiskTier {
        self.scheme.bin(probability)
    }

    /// Aggregate a snapshot in a single pass.
    ///
    /// Fraud is counted as `probability > 0.5` regardless of the tier scheme.
    pub fn aggregate(&self, records: &[ScoredTransaction]) -> RiskAggregate {
        let mut counts = TierCounts::default();
        let mut fraud_count = 0;
        let mut probability_sum = 0.0;

        for tx in records {
            counts.increment(self.bin(tx.probability));
            if tx.is_fraud() {
                fraud_count += 1;
            }
            probability_sum += tx.probability;
        }

        let total = records.len();
        let (fraud_rate, avg_probability) = if total > 0 {
            (fraud_count as f64 / total as f64, probability_sum / total as f64)
        } else {
            (0.0, 0.0)
        };

        RiskAggregate {
            total,
            counts_by_tier: counts,
            fraud_count,
            non_fraud_count: total - fraud_count,
            fraud_rate,
            avg_probability,
        }
    }

    /// Categories ranked by fraud rate, highest first.
    ///
    /// Ties keep first-seen order.
    pub fn category_breakdown(&self, records: &[ScoredTransaction], limit: usize) -> Vec<CategoryRisk> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        // (name, total, fraud, risk sum)
        let mut acc: Vec<(&str, usize, usize, f64)> = Vec::new();

        for tx in records {
            let slot = *index.entry(tx.category.as_str()).or_insert_with(|| {
                acc.push((tx.category.as_str(), 0, 0, 0.0));
                acc.len() - 1
            });
            let entry = &mut acc[slot];
            entry.1 += 1;
            entry.3 += tx.probability;
            if tx.is_fraud() {
                entry.2 += 1;
            }
        }

        let mut categories: Vec<CategoryRisk> = acc
            .into_iter()
            .map(|(name, total, fraud_count, risk_sum)| CategoryRisk {
                name: name.to_string(),
                total,
                fraud_count,
                avg_risk: risk_sum / total as f64,
                fraud_rate: fraud_count as f64 / total as f64 * 100.0,
            })
            .collect();

        categories.sort_by(|a, b| b.fraud_rate.total_cmp(&a.fraud_rate));
        categories.truncate(limit);
        categories
    }

    /// Probability mix of the snapshot.
    pub fn risk_pulse(&self, records: &[ScoredTransaction]) -> RiskPulse {
        if records.is_empty() {
            return RiskPulse::default();
        }

        let total = records.len() as f64;
        let ratio = |pred: fn(f64) -> bool| {
            records.iter().filter(|tx| pred(tx.probability)).count() as f64 / total * 100.0
        };

        RiskPulse {
            avg_probability: records.iter().map(|tx| tx.probability).sum::<f64>() / total,
            high_risk_ratio: ratio(|p| p >= 0.7),
            medium_risk_ratio: ratio(|p| (0.5..0.7).contains(&p)),
            low_risk_ratio: ratio(|p| p < 0.3),
        }
    }

    /// Gauge level and score of the snapshot.
    ///
    /// Unlike the pulse, the high-risk count here is strictly above 0.7.
    pub fn risk_meter(&self, records: &[ScoredTransaction]) -> RiskMeter {
        if records.is_empty() {
            return RiskMeter::default();
        }

        let total = records.len();
        let avg_probability = records.iter().map(|tx| tx.probability).sum::<f64>() / total as f64;
        let high_risk_count = records.iter().filter(|tx| tx.probability > 0.7).count();
        let high_risk_ratio = high_risk_count as f64 / total as f64 * 100.0;

        RiskMeter {
            level: MeterLevel::classify(avg_probability, high_risk_ratio),
            score: avg_probability * 100.0,
            high_risk_ratio,
            high_risk_count,
            total,
        }
    }
}
