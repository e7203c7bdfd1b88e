//! Most suspicious customers, merchants and transactions of a snapshot.

use crate::types::transaction::ScoredTransaction;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Probability at or above which a transaction counts as high risk here
pub const HIGH_RISK_PROBABILITY: f64 = 0.7;

/// Entries kept per ranking
pub const TOP_LIMIT: usize = 5;

/// Per-entity risk profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProfile {
    pub id: String,
    pub transaction_count: usize,
    pub total_amount: f64,
    pub avg_probability: f64,
    pub high_risk_count: usize,
}

/// Rankings over one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousEntities {
    pub customers: Vec<EntityProfile>,
    pub merchants: Vec<EntityProfile>,
    pub transactions: Vec<ScoredTransaction>,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    amount: f64,
    probability_sum: f64,
    high_risk: usize,
}

/// Ranks entities by how much high-risk activity they carry.
#[derive(Debug, Clone)]
pub struct EntityRanker {
    limit: usize,
}

impl Default for EntityRanker {
    fn default() -> Self {
        Self::new(TOP_LIMIT)
    }
}

impl EntityRanker {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn rank(&self, records: &[ScoredTransaction]) -> SuspiciousEntities {
        SuspiciousEntities {
            customers: self.rank_by(records, |tx| &tx.customer_id),
            merchants: self.rank_by(records, |tx| &tx.merchant_id),
            transactions: self.top_transactions(records),
        }
    }

    /// Highest-probability transactions; ties keep input order.
    pub fn top_transactions(&self, records: &[ScoredTransaction]) -> Vec<ScoredTransaction> {
        let mut sorted: Vec<&ScoredTransaction> = records.iter().collect();
        sorted.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        sorted.into_iter().take(self.limit).cloned().collect()
    }

    /// Profiles grouped by `key`, sorted by high-risk count, then mean
    /// probability, then transaction count, all descending.
    pub fn rank_by<F>(&self, records: &[ScoredTransaction], key: F) -> Vec<EntityProfile>
    where
        F: Fn(&ScoredTransaction) -> &String,
    {
        let mut order: Vec<&str> = Vec::new();
        let mut acc: HashMap<&str, Accumulator> = HashMap::new();

        for tx in records {
            let id = key(tx).as_str();
            let entry = acc.entry(id).or_insert_with(|| {
                order.push(id);
                Accumulator::default()
            });
            entry.count += 1;
            entry.amount += tx.amount;
            entry.probability_sum += tx.probability;
            if tx.probability >= HIGH_RISK_PROBABILITY {
                entry.high_risk += 1;
            }
        }

        let mut profiles: Vec<EntityProfile> = order
            .into_iter()
            .filter_map(|id| {
                let a = acc.get(id)?;
                Some(EntityProfile {
                    id: id.to_string(),
                    transaction_count: a.count,
                    total_amount: a.amount,
                    avg_probability: a.probability_sum / a.count as f64,
                    high_risk_count: a.high_risk,
                })
            })
            .collect();

        profiles.sort_by(compare_profiles);
        profiles.truncate(self.limit);
        profiles
    }
}

fn compare_profiles(a: &EntityProfile, b: &EntityProfile) -> Ordering {
    b.high_risk_count
        .cmp(&a.high_risk_count)
        .then_with(|| b.avg_probability.total_cmp(&a.avg_probability))
        .then_with(|| b.transaction_count.cmp(&a.transaction_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, customer: &str, merchant: &str, amount: f64, probability: f64) -> ScoredTransaction {
        ScoredTransaction::new(id, customer, merchant, amount, probability)
    }

    #[test]
    fn test_customer_ranking_order() {
        let records = vec![
            tx("t1", "alice", "m1", 100.0, 0.9),
            tx("t2", "alice", "m1", 50.0, 0.2),
            tx("t3", "bob", "m2", 10.0, 0.75),
            tx("t4", "bob", "m2", 10.0, 0.8),
            tx("t5", "carol", "m3", 10.0, 0.6),
            tx("t6", "dave", "m3", 10.0, 0.6),
            tx("t7", "dave", "m3", 10.0, 0.6),
        ];

        let ranked = EntityRanker::default().rank(&records);
        let ids: Vec<&str> = ranked.customers.iter().map(|p| p.id.as_str()).collect();

        // bob has two high-risk transactions; alice one; carol and dave tie on
        // probability and dave wins on count
        assert_eq!(ids, vec!["bob", "alice", "dave", "carol"]);

        let alice = &ranked.customers[1];
        assert_eq!(alice.transaction_count, 2);
        assert_eq!(alice.total_amount, 150.0);
        assert!((alice.avg_probability - 0.55).abs() < 1e-9);
        assert_eq!(alice.high_risk_count, 1);

        assert_eq!(ranked.merchants[0].id, "m2");
    }

    #[test]
    fn test_high_risk_boundary_is_inclusive() {
        let ranked = EntityRanker::default().rank(&[tx("t1", "c", "m", 1.0, 0.7)]);
        assert_eq!(ranked.customers[0].high_risk_count, 1);
    }

    #[test]
    fn test_limits_and_top_transactions() {
        let records: Vec<_> = (0..8)
            .map(|i| tx(&format!("t{}", i), &format!("c{}", i), "m", 1.0, i as f64 / 10.0))
            .collect();

        let ranked = EntityRanker::default().rank(&records);
        assert_eq!(ranked.customers.len(), TOP_LIMIT);
        assert_eq!(ranked.merchants.len(), 1);

        let top: Vec<&str> = ranked.transactions.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(top, vec!["t7", "t6", "t5", "t4", "t3"]);
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(EntityRanker::default().rank(&[]), SuspiciousEntities::default());
    }
}
