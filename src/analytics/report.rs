//! All derivations over one snapshot, memoized by snapshot identity.

use super::alerts::{AlertEvaluation, AlertEvaluator, AlertFeed};
use super::binning::{CategoryRisk, RiskAggregate, RiskBinner, RiskMeter, RiskPulse, CATEGORY_LIMIT};
use super::chains::{Chain, ChainAssembler, ChainOptions, ChainStats};
use super::daily::DailyCalendar;
use super::entities::{EntityRanker, SuspiciousEntities};
use super::filter::RecordFilter;
use super::forecast::{ForecastOptions, TrendForecast, TrendForecaster};
use super::graph::{EntityGraph, EntityGraphBuilder, GraphOptions};
use super::fingerprint;
use crate::normalizer::RecordNormalizer;
use crate::types::alert::{AlertRules, FeedAlert, TierScheme};
use crate::types::transaction::{RawRecord, ScoredTransaction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::debug;

/// Settings for every derivation in a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsOptions {
    /// Tier scheme for aggregate binning
    #[serde(default)]
    pub scheme: TierScheme,
    #[serde(default)]
    pub graph: GraphOptions,
    #[serde(default)]
    pub chains: ChainOptions,
    #[serde(default)]
    pub forecast: ForecastOptions,
    /// Records outside the filter are dropped before any derivation
    #[serde(default)]
    pub filter: RecordFilter,
}

/// Everything derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub fingerprint: u64,
    /// Last historical day of the forecast
    pub anchor: NaiveDate,
    pub aggregate: RiskAggregate,
    pub categories: Vec<CategoryRisk>,
    pub pulse: RiskPulse,
    pub meter: RiskMeter,
    pub daily: DailyCalendar,
    pub graph: EntityGraph,
    /// False when the graph is too small to be worth drawing
    pub graph_renderable: bool,
    pub chains: Vec<Chain>,
    pub chain_stats: ChainStats,
    pub forecast: TrendForecast,
    pub entities: SuspiciousEntities,
    pub alerts: AlertEvaluation,
    /// Feed entries for the riskiest records
    pub feed: Vec<FeedAlert>,
    /// Feed entries for the first rule alerts
    pub rule_feed: Vec<FeedAlert>,
}

/// Runs the derivations and caches the last report.
///
/// The cache holds a single entry keyed by the snapshot fingerprint and the
/// forecast anchor. A report is recomputed when the snapshot changes, or
/// when an undated snapshot is derived on a new day.
pub struct AnalyticsEngine {
    normalizer: RecordNormalizer,
    filter: RecordFilter,
    binner: RiskBinner,
    graph: EntityGraphBuilder,
    chains: ChainAssembler,
    forecaster: TrendForecaster,
    ranker: EntityRanker,
    evaluator: AlertEvaluator,
    last: RwLock<Option<Arc<AnalyticsReport>>>,
}

impl AnalyticsEngine {
    pub fn new(options: AnalyticsOptions, rules: AlertRules) -> Self {
        Self {
            normalizer: RecordNormalizer::new(),
            filter: options.filter,
            binner: RiskBinner::new(options.scheme),
            graph: EntityGraphBuilder::new(options.graph).with_scheme(options.scheme),
            chains: ChainAssembler::new(options.chains),
            forecaster: TrendForecaster::new(options.forecast),
            ranker: EntityRanker::default(),
            evaluator: AlertEvaluator::new(rules),
            last: RwLock::new(None),
        }
    }

    /// Normalize raw records and derive a report.
    pub fn derive(&self, raw: &[RawRecord]) -> Arc<AnalyticsReport> {
        let records = self.normalizer.normalize_all(raw);
        self.derive_normalized(&records)
    }

    /// Derive a report from already normalized records.
    pub fn derive_normalized(&self, records: &[ScoredTransaction]) -> Arc<AnalyticsReport> {
        let filtered;
        let records = if self.filter.is_empty() {
            records
        } else {
            filtered = self.filter.apply(records);
            &filtered[..]
        };

        let fingerprint = fingerprint(records);
        let latest = records.iter().filter_map(|tx| tx.timestamp).max();
        let anchor = self.forecaster.resolve_anchor(latest.map(|ts| ts.date_naive()));

        if let Some(cached) = self.cached(fingerprint, anchor) {
            debug!(fingerprint = fingerprint, "Reusing memoized report");
            return cached;
        }

        let started = Instant::now();
        let report = Arc::new(self.compute(records, fingerprint, anchor));
        debug!(
            fingerprint = fingerprint,
            records = records.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Derived analytics report"
        );

        if let Ok(mut last) = self.last.write() {
            *last = Some(report.clone());
        }
        report
    }

    fn cached(&self, fingerprint: u64, anchor: NaiveDate) -> Option<Arc<AnalyticsReport>> {
        let last = self.last.read().ok()?;
        last.as_ref()
            .filter(|report| report.fingerprint == fingerprint && report.anchor == anchor)
            .cloned()
    }

    fn compute(&self, records: &[ScoredTransaction], fingerprint: u64, anchor: NaiveDate) -> AnalyticsReport {
        let daily = DailyCalendar::from_records(records);
        let graph = self.graph.build(records);
        let chains = self.chains.assemble(records);
        let alerts = self.evaluator.evaluate(records);

        AnalyticsReport {
            fingerprint,
            anchor,
            aggregate: self.binner.aggregate(records),
            categories: self.binner.category_breakdown(records, CATEGORY_LIMIT),
            pulse: self.binner.risk_pulse(records),
            meter: self.binner.risk_meter(records),
            forecast: self
                .forecaster
                .forecast_at(records, &daily, fingerprint, anchor),
            daily,
            graph_renderable: graph.is_renderable(),
            graph,
            chain_stats: ChainStats::from_chains(&chains),
            chains,
            entities: self.ranker.rank(records),
            feed: AlertFeed::entries_for(records, fingerprint),
            rule_feed: AlertFeed::rule_entries(&alerts.alerts, fingerprint),
            alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::binning::MeterLevel;
    use serde_json::json;

    fn snapshot() -> Vec<RawRecord> {
        vec![
            json!({"transaction_id": "t1", "customer_id": "c1", "merchant_id": "m1", "amount": 2500.0,
                   "fraud_probability": 0.92, "merchant_category": "travel", "timestamp": "2024-05-01 10:00:00"}),
            json!({"transaction_id": "t2", "customer_id": "c1", "merchant_id": "m2", "amount": 120.0,
                   "fraud_probability": 0.71, "category": "gaming", "timestamp": "2024-05-02 11:00:00"}),
            json!({"transaction_id": "t3", "customer_id": "c2", "merchant_id": "m1", "amount": 40.0,
                   "probability": 0.2, "timestamp": "not a date"}),
            json!({"customer_id": "c1", "merchant_id": "m3", "amount": "300", "probability": "0.55"}),
        ]
        .into_iter()
        .map(RawRecord::from)
        .collect()
    }

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::new(AnalyticsOptions::default(), AlertRules::default())
    }

    #[test]
    fn test_report_sections() {
        let report = engine().derive(&snapshot());

        assert_eq!(report.aggregate.total, 4);
        assert_eq!(report.aggregate.fraud_count, 3);
        assert_eq!(report.daily.days.len(), 2);
        assert_eq!(report.chains.len(), 1);
        assert_eq!(report.chains[0].customer_id, "c1");
        assert_eq!(report.chain_stats.total, 1);
        assert!(report.graph_renderable);
        assert!(report.forecast.observed);
        assert_eq!(report.entities.customers[0].id, "c1");
        assert_eq!(report.alerts.summary.amount_breaches, 1);
        assert_eq!(report.feed.len(), 2);
        // amount and critical on t1, high on t2
        assert_eq!(report.rule_feed.len(), 3);
        assert_eq!(report.rule_feed[0].title, "Rule trigger: amount");
        assert_eq!(report.anchor, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(report.meter.high_risk_count, 2);
        assert_eq!(report.meter.level, MeterLevel::Critical);
    }

    #[test]
    fn test_memo_is_keyed_by_anchor() {
        let engine = engine();
        let undated = vec![
            ScoredTransaction::new("t1", "c1", "m1", 10.0, 0.9),
            ScoredTransaction::new("t2", "c2", "m1", 20.0, 0.1).at(1),
        ];
        let report = engine.derive_normalized(&undated);

        assert!(engine.cached(report.fingerprint, report.anchor).is_some());
        let previous_day = report.anchor.pred_opt().unwrap();
        assert!(engine.cached(report.fingerprint, previous_day).is_none());
        assert_eq!(report.forecast.historical.last().map(|p| p.date), Some(report.anchor));
    }

    #[test]
    fn test_configured_anchor_pins_undated_reports() {
        let anchor = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let options = AnalyticsOptions {
            forecast: ForecastOptions::default().with_anchor(anchor),
            ..AnalyticsOptions::default()
        };
        let undated = vec![ScoredTransaction::new("t1", "c1", "m1", 10.0, 0.9)];

        let a = AnalyticsEngine::new(options.clone(), AlertRules::default()).derive_normalized(&undated);
        let b = AnalyticsEngine::new(options, AlertRules::default()).derive_normalized(&undated);
        assert_eq!(a.anchor, anchor);
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_filter_applies_before_derivation() {
        let options = AnalyticsOptions {
            filter: RecordFilter::new().with_search("c1"),
            ..AnalyticsOptions::default()
        };
        let engine = AnalyticsEngine::new(options, AlertRules::default());
        let report = engine.derive(&snapshot());

        assert_eq!(report.aggregate.total, 3);
        assert!(report.entities.customers.iter().all(|c| c.id == "c1"));
        assert_ne!(report.fingerprint, self::engine().derive(&snapshot()).fingerprint);
    }

    #[test]
    fn test_memoized_by_snapshot() {
        let engine = engine();
        let first = engine.derive(&snapshot());
        let second = engine.derive(&snapshot());
        assert!(Arc::ptr_eq(&first, &second));

        let mut changed = snapshot();
        changed.pop();
        let third = engine.derive(&changed);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.aggregate.total, 3);
    }

    #[test]
    fn test_deterministic_across_engines() {
        let a = engine().derive(&snapshot());
        let b = engine().derive(&snapshot());
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_empty_snapshot() {
        let report = engine().derive(&[]);

        assert_eq!(report.aggregate, RiskAggregate::default());
        assert!(report.graph.is_empty());
        assert!(!report.graph_renderable);
        assert!(report.chains.is_empty());
        assert!(report.forecast.forecast.is_empty());
        assert!(report.forecast.historical.iter().all(|p| p.value == 0.0));
        assert!(report.feed.is_empty());
        assert!(report.rule_feed.is_empty());
        assert_eq!(report.meter.level, MeterLevel::Unknown);
    }

    #[test]
    fn test_report_serializes() {
        let report = engine().derive(&snapshot());
        let value = serde_json::to_value(&*report).unwrap();
        assert!(value.get("chainStats").is_some());
        assert!(value["graph"]["links"].is_array());
    }
}
