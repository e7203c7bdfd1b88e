//! Test Prediction Producer
//!
//! Generates batches of scored predictions and publishes them to NATS for
//! testing the analytics service.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Prediction record in the shape the scoring service returns
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Prediction {
    transaction_id: String,
    customer_id: String,
    merchant_id: String,
    merchant_category: String,
    amount: f64,
    fraud_probability: f64,
    timestamp: String,
}

/// Prediction generator for testing
struct PredictionGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
    customers: u32,
}

impl PredictionGenerator {
    fn new(customers: u32) -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
            customers: customers.max(1),
        }
    }

    /// Timestamp somewhere in the last 30 days
    fn timestamp(&mut self) -> String {
        let back = ChronoDuration::minutes(self.rng.gen_range(0..30 * 24 * 60));
        (Utc::now() - back).format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn base(&mut self, amount: f64, fraud_probability: f64) -> Prediction {
        self.counter += 1;
        Prediction {
            transaction_id: format!("tx_{:012}", self.counter),
            customer_id: format!("customer_{}", self.rng.gen_range(1..=self.customers)),
            merchant_id: format!("merchant_{}", self.rng.gen_range(1..200)),
            merchant_category: self
                .random_choice(&["grocery", "restaurant", "fuel", "pharmacy", "retail"])
                .to_string(),
            amount,
            fraud_probability,
            timestamp: self.timestamp(),
        }
    }

    /// A low-risk prediction
    fn generate_legitimate(&mut self) -> Prediction {
        let amount = self.rng.gen_range(10.0..500.0);
        let probability = self.rng.gen_range(0.0..0.35);
        self.base(amount, probability)
    }

    /// A high-risk prediction with a large amount
    fn generate_suspicious(&mut self) -> Prediction {
        let amount = self.rng.gen_range(1000.0..9500.0);
        let probability = self.rng.gen_range(0.55..0.99);
        let mut prediction = self.base(amount, probability);
        prediction.merchant_category = self
            .random_choice(&["electronics", "gift_cards", "travel"])
            .to_string();
        prediction
    }

    fn batch(&mut self, size: usize, fraud_rate: f64) -> (Vec<Prediction>, usize) {
        let mut suspicious = 0;
        let batch = (0..size)
            .map(|_| {
                if self.rng.gen_bool(fraud_rate) {
                    suspicious += 1;
                    self.generate_suspicious()
                } else {
                    self.generate_legitimate()
                }
            })
            .collect();
        (batch, suspicious)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("predictions");
    let batches: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);
    let batch_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(200);
    let fraud_rate: f64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let fraud_rate = fraud_rate.clamp(0.0, 1.0);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        batches = batches,
        batch_size = batch_size,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(batches, batch_size, fraud_rate).await;
        }
    };

    // Fewer customers than records so chains form
    let mut generator = PredictionGenerator::new((batch_size / 4) as u32);
    let mut total_suspicious = 0;

    for i in 0..batches {
        let (batch, suspicious) = generator.batch(batch_size, fraud_rate);
        total_suspicious += suspicious;

        let payload = serde_json::to_vec(&batch)?;
        client.publish(subject.to_string(), payload.into()).await?;

        info!(
            batch = i + 1,
            records = batch.len(),
            suspicious = suspicious,
            "Published prediction batch"
        );

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    client.flush().await?;

    info!(
        batches = batches,
        suspicious = total_suspicious,
        "Completed publishing"
    );

    Ok(())
}

async fn run_dry_mode(batches: u64, batch_size: usize, fraud_rate: f64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = PredictionGenerator::new((batch_size / 4) as u32);

    for i in 0..batches {
        let (batch, suspicious) = generator.batch(batch_size, fraud_rate);
        if let Some(sample) = batch.first() {
            info!(
                "Sample from batch {} ({} suspicious):\n{}",
                i + 1,
                suspicious,
                serde_json::to_string_pretty(sample)?
            );
        }
    }

    Ok(())
}
