//! Record normalization for scored predictions.
//!
//! The scoring service returns loosely-typed records: numbers may arrive as
//! strings, probabilities under several names, ids may be missing. This
//! module resolves all of that once, so downstream derivations only ever see
//! [`ScoredTransaction`].

use crate::types::transaction::{RawRecord, ScoredTransaction};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Probability fields in precedence order
const PROBABILITY_FIELDS: [&str; 3] = ["ensemble_fraud_probability", "fraud_probability", "probability"];

/// Category fields in precedence order
const CATEGORY_FIELDS: [&str; 2] = ["merchant_category", "category"];

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Normalizer that turns raw prediction records into canonical transactions.
///
/// Missing amounts and probabilities default to zero; missing ids are
/// synthesized from the record's position so that repeated runs over the
/// same snapshot produce identical ids.
pub struct RecordNormalizer;

impl RecordNormalizer {
    /// Create a new record normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Normalize a single record at `position` in its snapshot.
    pub fn normalize(&self, position: usize, raw: &RawRecord) -> ScoredTransaction {
        let id = text_field(raw, &["transaction_id"]).unwrap_or_else(|| format!("TXN-{}", position));
        let customer_id = text_field(raw, &["customer_id"])
            .unwrap_or_else(|| format!("anon-customer-{}", position));
        let merchant_id = text_field(raw, &["merchant_id"])
            .unwrap_or_else(|| format!("unknown-merchant-{}", position));
        let category = text_field(raw, &CATEGORY_FIELDS).unwrap_or_else(|| "Unknown".to_string());

        let amount = number_field(raw, &["amount"]).unwrap_or(0.0).max(0.0);
        let probability = number_field(raw, &PROBABILITY_FIELDS)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let timestamp = raw.get("timestamp").and_then(parse_timestamp);

        ScoredTransaction {
            id,
            customer_id,
            merchant_id,
            category,
            amount,
            probability,
            timestamp,
            position,
        }
    }

    /// Normalize a whole snapshot, preserving input order.
    pub fn normalize_all(&self, records: &[RawRecord]) -> Vec<ScoredTransaction> {
        let transactions: Vec<ScoredTransaction> = records
            .iter()
            .enumerate()
            .map(|(position, raw)| self.normalize(position, raw))
            .collect();

        let malformed_timestamps = records
            .iter()
            .zip(&transactions)
            .filter(|(raw, tx)| raw.get("timestamp").is_some() && tx.timestamp.is_none())
            .count();

        debug!(
            records = transactions.len(),
            malformed_timestamps = malformed_timestamps,
            "Normalized prediction snapshot"
        );

        transactions
    }

    /// Input fields this normalizer recognizes.
    pub fn recognized_fields(&self) -> Vec<&'static str> {
        let mut fields = vec!["transaction_id", "customer_id", "merchant_id", "amount", "timestamp"];
        fields.extend(CATEGORY_FIELDS);
        fields.extend(PROBABILITY_FIELDS);
        fields
    }
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// First field in `keys` that coerces to a finite number.
fn number_field(raw: &RawRecord, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| raw.get(key))
        .find_map(coerce_number)
}

/// First field in `keys` that coerces to a non-empty identifier.
fn text_field(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| raw.get(key)).find_map(coerce_text)
}

fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the timestamp formats seen in prediction exports, all as UTC.
///
/// JSON numbers are epoch milliseconds; fractional milliseconds are
/// truncated. Epoch seconds are not detected and land in January 1970.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
