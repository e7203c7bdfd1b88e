//! Risk tiers, tier schemes and alert data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Ordered risk severity band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// All tiers in ascending severity
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

/// Exclusive lower bounds of the upper three tiers.
///
/// A probability `p` is `Critical` if `p > critical`, `High` if `p > high`,
/// `Medium` if `p > medium`, otherwise `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl TierThresholds {
    /// Thresholds must be strictly increasing inside [0, 1].
    pub fn is_valid(&self) -> bool {
        0.0 <= self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical <= 1.0
    }
}

/// Named tier schemes.
///
/// The dashboard bins with `Standard` and raises alerts with the finer
/// `Alert` split; `Custom` carries caller-provided thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum TierScheme {
    #[default]
    Standard,
    Alert,
    Custom(TierThresholds),
}

impl TierScheme {
    pub fn thresholds(&self) -> TierThresholds {
        match self {
            TierScheme::Standard => TierThresholds {
                medium: 0.3,
                high: 0.6,
                critical: 0.8,
            },
            TierScheme::Alert => TierThresholds {
                medium: 0.3,
                high: 0.65,
                critical: 0.85,
            },
            TierScheme::Custom(thresholds) => *thresholds,
        }
    }

    /// Bin a probability into its tier
    pub fn bin(&self, probability: f64) -> RiskTier {
        let t = self.thresholds();
        if probability > t.critical {
            RiskTier::Critical
        } else if probability > t.high {
            RiskTier::High
        } else if probability > t.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Highest probability that still bins into `tier`.
    pub fn ceiling(&self, tier: RiskTier) -> f64 {
        let t = self.thresholds();
        match tier {
            RiskTier::Low => t.medium,
            RiskTier::Medium => t.high,
            RiskTier::High => t.critical,
            RiskTier::Critical => 1.0,
        }
    }
}

/// Probability and amount thresholds for rule alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_critical_probability")]
    pub critical_probability: f64,
    #[serde(default = "default_high_probability")]
    pub high_probability: f64,
    /// Zero disables amount alerts
    #[serde(default = "default_amount_limit")]
    pub amount_limit: f64,
}

fn default_critical_probability() -> f64 {
    0.85
}

fn default_high_probability() -> f64 {
    0.65
}

fn default_amount_limit() -> f64 {
    2000.0
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical_probability: default_critical_probability(),
            high_probability: default_high_probability(),
            amount_limit: default_amount_limit(),
        }
    }
}

/// Customers and merchants under watch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    #[serde(default)]
    pub customers: Vec<String>,
    #[serde(default)]
    pub merchants: Vec<String>,
}

/// Investigator-maintained alert rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRules {
    #[serde(default)]
    pub thresholds: AlertThresholds,
    #[serde(default)]
    pub watchlist: Watchlist,
    #[serde(default)]
    pub notes: String,
}

/// Kind of rule that produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Amount,
    CriticalProbability,
    HighProbability,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Amount => "amount",
            AlertKind::CriticalProbability => "critical probability",
            AlertKind::HighProbability => "high probability",
        }
    }
}

/// Alert raised by a rule against a single transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAlert {
    pub kind: AlertKind,
    pub message: String,
    pub transaction_id: String,
    pub customer_id: String,
    pub merchant_id: String,
    pub risk_tier: RiskTier,
    pub probability: f64,
}

/// Transaction touching a watched customer or merchant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistHit {
    pub transaction_id: String,
    pub customer_id: String,
    pub merchant_id: String,
    pub amount: f64,
    pub risk_tier: RiskTier,
    pub probability: f64,
}

/// Counts over one rule evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub watchlist_hits: usize,
    pub by_kind: BTreeMap<AlertKind, usize>,
    pub amount_breaches: usize,
    pub critical_flags: usize,
    pub high_flags: usize,
}

/// Severity of a feed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSeverity {
    Critical,
    Warning,
}

/// Entry in the investigator's alert feed.
///
/// The feed is the only alert state that outlives a snapshot; it is kept
/// by an [`crate::store::AlertStore`], never inside the derivations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedAlert {
    pub id: Uuid,
    pub severity: FeedSeverity,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
}
