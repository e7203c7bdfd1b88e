//! Per-customer transaction chains and their behavioral patterns.

use crate::types::alert::RiskTier;
use crate::types::transaction::ScoredTransaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Behavioral tag attached to a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Standard,
    Rapid,
    Escalating,
    Smurfing,
    /// Reserved: no rule produces it yet, consumers must not expect it.
    RoundRobin,
}

impl Pattern {
    pub fn label(&self) -> &'static str {
        match self {
            Pattern::Standard => "Standard Chain",
            Pattern::Rapid => "Rapid Succession",
            Pattern::Escalating => "Escalating Amounts",
            Pattern::Smurfing => "Smurfing Pattern",
            Pattern::RoundRobin => "Round Robin",
        }
    }
}

/// Transactions of one customer within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: String,
    pub customer_id: String,
    /// First transactions of the group in input order, for display
    pub transactions: Vec<ScoredTransaction>,
    /// Size of the full group
    pub transaction_count: usize,
    pub total_amount: f64,
    pub avg_probability: f64,
    pub max_probability: f64,
    pub risk_level: RiskTier,
    pub pattern: Pattern,
}

/// Summary across the assembled chains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub total_amount: f64,
    /// Mean length of the displayed transaction lists
    pub avg_chain_length: f64,
}

impl ChainStats {
    pub fn from_chains(chains: &[Chain]) -> Self {
        if chains.is_empty() {
            return Self::default();
        }

        let count_level = |level: RiskTier| chains.iter().filter(|c| c.risk_level == level).count();
        let displayed: usize = chains.iter().map(|c| c.transactions.len()).sum();

        Self {
            total: chains.len(),
            critical: count_level(RiskTier::Critical),
            high: count_level(RiskTier::High),
            total_amount: chains.iter().map(|c| c.total_amount).sum(),
            avg_chain_length: displayed as f64 / chains.len() as f64,
        }
    }
}

/// Chain assembly limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOptions {
    /// Smallest group that forms a chain
    #[serde(default = "default_min_transactions")]
    pub min_transactions: usize,
    /// Transactions kept per chain for display
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    /// Chains kept per snapshot, in first-encountered order
    #[serde(default = "default_max_chains")]
    pub max_chains: usize,
}

fn default_min_transactions() -> usize {
    2
}

fn default_display_limit() -> usize {
    6
}

fn default_max_chains() -> usize {
    15
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            min_transactions: default_min_transactions(),
            display_limit: default_display_limit(),
            max_chains: default_max_chains(),
        }
    }
}

/// Rule-based pattern labelling over a chain's amounts.
///
/// Rules are tried in order and the first match wins:
/// smurfing, escalating, rapid, then standard.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    /// Each amount must stay below this for smurfing
    pub structuring_ceiling: f64,
    /// Sum must exceed this for smurfing
    pub reporting_threshold: f64,
    /// Minimum sequence length for escalating and rapid
    pub min_sequence: usize,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self {
            structuring_ceiling: 10_000.0,
            reporting_threshold: 20_000.0,
            min_sequence: 3,
        }
    }
}

impl PatternClassifier {
    /// Classify a sequence of amounts in input order.
    pub fn classify(&self, amounts: &[f64]) -> Pattern {
        if self.is_smurfing(amounts) {
            Pattern::Smurfing
        } else if amounts.len() >= self.min_sequence && is_non_decreasing(amounts) {
            Pattern::Escalating
        } else if amounts.len() >= self.min_sequence {
            // no timing check: any long enough group qualifies
            Pattern::Rapid
        } else {
            Pattern::Standard
        }
    }

    fn is_smurfing(&self, amounts: &[f64]) -> bool {
        amounts.iter().all(|&a| a < self.structuring_ceiling)
            && amounts.iter().sum::<f64>() > self.reporting_threshold
    }
}

fn is_non_decreasing(amounts: &[f64]) -> bool {
    amounts.windows(2).all(|w| w[1] >= w[0])
}

/// Chain risk from the group's average and maximum probability
pub fn chain_risk(avg_probability: f64, max_probability: f64) -> RiskTier {
    if max_probability > 0.8 || avg_probability > 0.6 {
        RiskTier::Critical
    } else if max_probability > 0.6 || avg_probability > 0.4 {
        RiskTier::High
    } else if max_probability > 0.4 || avg_probability > 0.25 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Groups transactions per customer into classified chains.
#[derive(Debug, Clone, Default)]
pub struct ChainAssembler {
    options: ChainOptions,
    classifier: PatternClassifier,
}

impl ChainAssembler {
    pub fn new(options: ChainOptions) -> Self {
        Self {
            options,
            classifier: PatternClassifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: PatternClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Assemble chains for a snapshot.
    ///
    /// Chains come out in the order their customers first appear, not by
    /// risk. Statistics and the pattern use the whole group; only the
    /// displayed transaction list is truncated.
    pub fn assemble(&self, records: &[ScoredTransaction]) -> Vec<Chain> {
        let mut groups: Vec<(&str, Vec<&ScoredTransaction>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for tx in records {
            let slot = *index.entry(tx.customer_id.as_str()).or_insert_with(|| {
                groups.push((tx.customer_id.as_str(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(tx);
        }

        let group_count = groups.len();
        let chains: Vec<Chain> = groups
            .into_iter()
            .filter(|(_, txs)| txs.len() >= self.options.min_transactions.max(1))
            .take(self.options.max_chains)
            .map(|(customer_id, txs)| self.chain(customer_id, &txs))
            .collect();

        debug!(
            records = records.len(),
            customers = group_count,
            chains = chains.len(),
            "Assembled transaction chains"
        );

        chains
    }

    fn chain(&self, customer_id: &str, txs: &[&ScoredTransaction]) -> Chain {
        let count = txs.len() as f64;
        let amounts: Vec<f64> = txs.iter().map(|tx| tx.amount).collect();
        let avg_probability = txs.iter().map(|tx| tx.probability).sum::<f64>() / count;
        let max_probability = txs.iter().map(|tx| tx.probability).fold(0.0, f64::max);

        Chain {
            id: format!("chain_{}", customer_id),
            customer_id: customer_id.to_string(),
            transactions: txs
                .iter()
                .take(self.options.display_limit)
                .map(|tx| (*tx).clone())
                .collect(),
            transaction_count: txs.len(),
            total_amount: amounts.iter().sum(),
            avg_probability,
            max_probability,
            risk_level: chain_risk(avg_probability, max_probability),
            pattern: self.classifier.classify(&amounts),
        }
    }
}
