//! Rule-based alerting and the investigator alert feed.
//!
//! [`AlertEvaluator`] checks every record of a snapshot against the
//! investigator's [`AlertRules`]. [`AlertFeed`] turns the riskiest records of
//! a snapshot and its first rule alerts into feed entries and merges them
//! with entries kept from earlier snapshots; persisting the feed is left to an
//! [`crate::store::AlertStore`].

use crate::types::alert::{
    AlertKind, AlertRules, AlertSummary, FeedAlert, FeedSeverity, RiskTier, RuleAlert, TierScheme,
    WatchlistHit,
};
use crate::types::transaction::ScoredTransaction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Cap on rule alerts and on watchlist hits per evaluation
pub const RESULT_LIMIT: usize = 100;

/// New feed entries taken from one snapshot
pub const FEED_BATCH: usize = 5;

/// Default number of entries the feed keeps
pub const FEED_CAPACITY: usize = 20;

/// Result of evaluating rules over a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvaluation {
    pub alerts: Vec<RuleAlert>,
    pub watchlist_hits: Vec<WatchlistHit>,
    pub summary: AlertSummary,
}

/// Applies investigator rules to scored transactions.
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    rules: AlertRules,
    scheme: TierScheme,
    customers: HashSet<String>,
    merchants: HashSet<String>,
}

impl AlertEvaluator {
    pub fn new(rules: AlertRules) -> Self {
        let customers = rules.watchlist.customers.iter().cloned().collect();
        let merchants = rules.watchlist.merchants.iter().cloned().collect();
        Self {
            rules,
            scheme: TierScheme::Alert,
            customers,
            merchants,
        }
    }

    pub fn rules(&self) -> &AlertRules {
        &self.rules
    }

    pub fn evaluate(&self, records: &[ScoredTransaction]) -> AlertEvaluation {
        let t = &self.rules.thresholds;
        let mut alerts = Vec::new();
        let mut watchlist_hits = Vec::new();
        let mut summary = AlertSummary::default();

        for tx in records {
            let tier = self.scheme.bin(tx.probability);

            if t.amount_limit > 0.0 && tx.amount >= t.amount_limit {
                summary.amount_breaches += 1;
                alerts.push(self.alert(
                    AlertKind::Amount,
                    format!("Amount {:.2} exceeds limit {:.2}", tx.amount, t.amount_limit),
                    tx,
                    tier,
                ));
            }

            // probability alerts carry the tier their rule names
            if tx.probability >= t.critical_probability {
                summary.critical_flags += 1;
                alerts.push(self.alert(
                    AlertKind::CriticalProbability,
                    format!("Fraud probability {:.1}% is critical", tx.probability * 100.0),
                    tx,
                    RiskTier::Critical,
                ));
            } else if tx.probability >= t.high_probability {
                summary.high_flags += 1;
                alerts.push(self.alert(
                    AlertKind::HighProbability,
                    format!("Fraud probability {:.1}% is high", tx.probability * 100.0),
                    tx,
                    RiskTier::High,
                ));
            }

            if self.customers.contains(&tx.customer_id) || self.merchants.contains(&tx.merchant_id) {
                watchlist_hits.push(WatchlistHit {
                    transaction_id: tx.id.clone(),
                    customer_id: tx.customer_id.clone(),
                    merchant_id: tx.merchant_id.clone(),
                    amount: tx.amount,
                    risk_tier: tier,
                    probability: tx.probability,
                });
            }
        }

        // summary counts everything, only the lists are capped
        for alert in &alerts {
            *summary.by_kind.entry(alert.kind).or_insert(0) += 1;
        }
        summary.total_alerts = alerts.len();
        summary.watchlist_hits = watchlist_hits.len();

        alerts.truncate(RESULT_LIMIT);
        watchlist_hits.truncate(RESULT_LIMIT);

        debug!(
            records = records.len(),
            alerts = summary.total_alerts,
            watchlist_hits = summary.watchlist_hits,
            "Evaluated alert rules"
        );

        AlertEvaluation {
            alerts,
            watchlist_hits,
            summary,
        }
    }

    fn alert(&self, kind: AlertKind, message: String, tx: &ScoredTransaction, tier: RiskTier) -> RuleAlert {
        RuleAlert {
            kind,
            message,
            transaction_id: tx.id.clone(),
            customer_id: tx.customer_id.clone(),
            merchant_id: tx.merchant_id.clone(),
            risk_tier: tier,
            probability: tx.probability,
        }
    }
}

/// Rolling feed of alerts shown to the investigator, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFeed {
    entries: Vec<FeedAlert>,
    capacity: usize,
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl AlertFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Feed restored from previously stored entries.
    pub fn with_entries(capacity: usize, mut entries: Vec<FeedAlert>) -> Self {
        entries.truncate(capacity);
        Self { entries, capacity }
    }

    pub fn entries(&self) -> &[FeedAlert] {
        &self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Feed entries for the first High or Critical records of a snapshot.
    ///
    /// Tiers follow the alert scheme. Ids are derived from `fingerprint` and
    /// the record position, so the same snapshot always yields the same ids.
    pub fn entries_for(records: &[ScoredTransaction], fingerprint: u64) -> Vec<FeedAlert> {
        let scheme = TierScheme::Alert;
        records
            .iter()
            .enumerate()
            .filter_map(|(idx, tx)| {
                let severity = match scheme.bin(tx.probability) {
                    RiskTier::Critical => FeedSeverity::Critical,
                    RiskTier::High => FeedSeverity::Warning,
                    _ => return None,
                };
                let title = match severity {
                    FeedSeverity::Critical => "Critical fraud risk detected",
                    FeedSeverity::Warning => "High fraud risk detected",
                };
                Some(FeedAlert {
                    id: Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}-{}", fingerprint, idx).as_bytes()),
                    severity,
                    title: title.to_string(),
                    message: format!(
                        "Transaction {} from customer {}: {:.1}% fraud probability, amount {:.2}",
                        tx.id,
                        tx.customer_id,
                        tx.probability * 100.0,
                        tx.amount
                    ),
                    read: false,
                })
            })
            .take(FEED_BATCH)
            .collect()
    }

    /// Feed entries for the first rule alerts of an evaluation.
    ///
    /// Alerts tagged `Critical` become critical entries, every other alert a
    /// warning. Ids use a namespace distinct from [`AlertFeed::entries_for`].
    pub fn rule_entries(alerts: &[RuleAlert], fingerprint: u64) -> Vec<FeedAlert> {
        alerts
            .iter()
            .take(FEED_BATCH)
            .enumerate()
            .map(|(idx, alert)| FeedAlert {
                id: Uuid::new_v5(
                    &Uuid::NAMESPACE_OID,
                    format!("{}-rule-{}", fingerprint, idx).as_bytes(),
                ),
                severity: match alert.risk_tier {
                    RiskTier::Critical => FeedSeverity::Critical,
                    _ => FeedSeverity::Warning,
                },
                title: format!("Rule trigger: {}", alert.kind.label()),
                message: alert.message.clone(),
                read: false,
            })
            .collect()
    }

    /// Prepend the entries for a new snapshot and drop the oldest beyond
    /// capacity. Returns how many entries were added.
    ///
    /// Entries whose id is already in the feed are not added again.
    pub fn ingest(&mut self, records: &[ScoredTransaction], fingerprint: u64) -> usize {
        self.ingest_entries(Self::entries_for(records, fingerprint))
    }

    /// Prepend entries produced elsewhere, such as a report's feed section.
    ///
    /// A merge keeps at most `capacity - FEED_BATCH` stored entries however
    /// few are added, so the feed can shrink below capacity.
    pub fn ingest_entries(&mut self, entries: Vec<FeedAlert>) -> usize {
        let fresh: Vec<FeedAlert> = entries
            .into_iter()
            .filter(|a| !self.entries.iter().any(|e| e.id == a.id))
            .take(FEED_BATCH)
            .collect();
        let added = fresh.len();
        if added == 0 {
            return 0;
        }

        self.entries.truncate(self.capacity.saturating_sub(FEED_BATCH));
        let mut merged = fresh;
        merged.append(&mut self.entries);
        merged.truncate(self.capacity);
        self.entries = merged;
        added
    }

    /// Mark one entry read. Returns false when no entry has `id`.
    pub fn mark_read(&mut self, id: Uuid) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for entry in &mut self.entries {
            entry.read = true;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
