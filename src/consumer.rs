//! NATS message consumer for scored prediction batches

use crate::types::transaction::RawRecord;
use anyhow::{bail, Context, Result};
use async_nats::{Client, Subscriber};
use serde_json::Value;
use tracing::info;

/// Keys under which a wrapped batch may carry its records
const BATCH_KEYS: [&str; 2] = ["results", "predictions"];

/// Consumer for receiving prediction batches from NATS
pub struct PredictionConsumer {
    client: Client,
    subject: String,
}

impl PredictionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the prediction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to prediction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode a message payload into raw records.
///
/// Accepts a JSON array or an object wrapping one under `results` or
/// `predictions`. Array elements that are not objects become empty records.
/// Anything else is not a record collection and is an error.
pub fn parse_batch(payload: &[u8]) -> Result<Vec<RawRecord>> {
    let value: Value = serde_json::from_slice(payload).context("Payload is not valid JSON")?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match BATCH_KEYS.iter().find_map(|k| map.remove(*k)) {
            Some(Value::Array(items)) => items,
            Some(_) => bail!("Batch field is not an array"),
            None => bail!("Object payload has no results or predictions array"),
        },
        other => bail!("Payload is not a record collection: {}", type_name(&other)),
    };

    Ok(items.into_iter().map(RawRecord::from_value).collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
