//! Prediction record structures: the loosely-typed input shape and the
//! canonical scored transaction every derivation works on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Probability above which a transaction counts as fraud for rate purposes.
///
/// Independent of the four-tier binning; both definitions are consumed.
pub const FRAUD_THRESHOLD: f64 = 0.5;

/// A raw prediction record as returned by the scoring service.
///
/// Every field is optional and unknown fields are ignored. Field aliases are
/// resolved once by [`crate::normalizer::RecordNormalizer`]; nothing else
/// should read from this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// Wrap an arbitrary JSON value. Anything that is not an object becomes
    /// an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Look up a field, treating explicit `null` as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Canonical transaction annotated with a fraud probability.
///
/// Created once per input record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTransaction {
    /// Transaction identifier (synthesized from position when absent)
    pub id: String,

    /// Customer identifier (synthesized per record when absent)
    pub customer_id: String,

    /// Merchant identifier (synthesized per record when absent)
    pub merchant_id: String,

    /// Merchant category
    pub category: String,

    /// Transaction amount, never negative
    pub amount: f64,

    /// Fraud probability in [0, 1]
    pub probability: f64,

    /// Event time, if the record carried a parseable one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Zero-based position in the input snapshot
    pub position: usize,
}

impl ScoredTransaction {
    /// Create a transaction with explicit ids; category defaults to "Unknown".
    pub fn new(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        merchant_id: impl Into<String>,
        amount: f64,
        probability: f64,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            merchant_id: merchant_id.into(),
            category: "Unknown".to_string(),
            amount,
            probability,
            timestamp: None,
            position: 0,
        }
    }

    /// Set the merchant category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the event time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the snapshot position
    pub fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Whether this transaction counts as fraud (`probability > 0.5`).
    pub fn is_fraud(&self) -> bool {
        self.probability > FRAUD_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_from_non_object() {
        assert_eq!(RawRecord::from_value(json!(42)), RawRecord::default());
        assert_eq!(RawRecord::from_value(json!([1, 2])), RawRecord::default());
    }

    #[test]
    fn test_raw_record_null_is_absent() {
        let raw = RawRecord::from_value(json!({"amount": null, "customer_id": "c1"}));
        assert!(raw.get("amount").is_none());
        assert_eq!(raw.get("customer_id"), Some(&json!("c1")));
    }

    #[test]
    fn test_fraud_threshold_is_exclusive() {
        let at = ScoredTransaction::new("t1", "c1", "m1", 10.0, 0.5);
        let above = ScoredTransaction::new("t2", "c1", "m1", 10.0, 0.51);
        assert!(!at.is_fraud());
        assert!(above.is_fraud());
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = ScoredTransaction::new("tx_123", "c1", "m1", 250.0, 0.7).with_category("travel");

        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("customerId"));
        assert!(!json.contains("timestamp"));

        let deserialized: ScoredTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, deserialized);
    }
}
