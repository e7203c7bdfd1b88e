//! Investigator filters over a snapshot.
//!
//! Every criterion is optional; unset criteria match everything, and the
//! criteria that are set must all match.

use crate::types::alert::{RiskTier, TierScheme};
use crate::types::transaction::ScoredTransaction;
use serde::{Deserialize, Serialize};

/// Conjunction of record criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Tier under the standard scheme
    #[serde(default)]
    pub tier: Option<RiskTier>,
    /// Exact category name
    #[serde(default)]
    pub category: Option<String>,
    /// Inclusive lower amount bound
    #[serde(default)]
    pub amount_min: Option<f64>,
    /// Inclusive upper amount bound
    #[serde(default)]
    pub amount_max: Option<f64>,
    /// Case-insensitive substring of the transaction, customer or merchant id
    #[serde(default)]
    pub search: Option<String>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, tier: RiskTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_amount_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.amount_min = min;
        self.amount_max = max;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// True when no criterion is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, tx: &ScoredTransaction) -> bool {
        if let Some(tier) = self.tier {
            if TierScheme::Standard.bin(tx.probability) != tier {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if tx.category != *category {
                return false;
            }
        }
        if self.amount_min.is_some_and(|min| tx.amount < min) {
            return false;
        }
        if self.amount_max.is_some_and(|max| tx.amount > max) {
            return false;
        }
        match self.search.as_deref().map(str::to_lowercase) {
            Some(term) if !term.is_empty() => [&tx.id, &tx.customer_id, &tx.merchant_id]
                .iter()
                .any(|field| field.to_lowercase().contains(&term)),
            _ => true,
        }
    }

    /// Matching records in input order.
    pub fn apply(&self, records: &[ScoredTransaction]) -> Vec<ScoredTransaction> {
        records.iter().filter(|tx| self.matches(tx)).cloned().collect()
    }
}
