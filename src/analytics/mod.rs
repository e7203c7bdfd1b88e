//! Derivations over a snapshot of scored transactions.
//!
//! Every derivation is a pure function of its input. None of them holds
//! state between calls, and none fails: degenerate input yields the
//! documented empty result.

pub mod alerts;
pub mod binning;
pub mod chains;
pub mod daily;
pub mod entities;
pub mod filter;
pub mod forecast;
pub mod graph;
pub mod report;

pub use alerts::{AlertEvaluator, AlertFeed};
pub use binning::{MeterLevel, RiskAggregate, RiskBinner, RiskMeter};
pub use chains::{Chain, ChainAssembler, Pattern, PatternClassifier};
pub use daily::{DailyAggregate, DailyCalendar};
pub use entities::EntityRanker;
pub use filter::RecordFilter;
pub use forecast::{ForecastMetric, ForecastOptions, TrendForecast, TrendForecaster};
pub use graph::{EntityGraph, EntityGraphBuilder, GraphOptions};
pub use report::{AnalyticsEngine, AnalyticsReport};

use crate::types::transaction::ScoredTransaction;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identity of a normalized snapshot.
///
/// Equal snapshots always share a fingerprint within one build. It keys the
/// report memo, seeds synthetic forecast noise and namespaces feed ids.
pub fn fingerprint(records: &[ScoredTransaction]) -> u64 {
    let mut hasher = DefaultHasher::new();
    records.len().hash(&mut hasher);
    for tx in records {
        tx.id.hash(&mut hasher);
        tx.customer_id.hash(&mut hasher);
        tx.merchant_id.hash(&mut hasher);
        tx.category.hash(&mut hasher);
        tx.amount.to_bits().hash(&mut hasher);
        tx.probability.to_bits().hash(&mut hasher);
        tx.timestamp.map(|ts| ts.timestamp_millis()).hash(&mut hasher);
        tx.position.hash(&mut hasher);
    }
    hasher.finish()
}
