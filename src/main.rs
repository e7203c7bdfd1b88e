//! Fraud Analytics Service - Main Entry Point
//!
//! Consumes scored prediction batches from NATS, derives an analytics report
//! for each batch and publishes it. Batches are derived in parallel on a
//! bounded number of workers.

use anyhow::Result;
use fraud_analytics::{
    analytics::{AlertFeed, AnalyticsEngine},
    config::{AppConfig, LoggingConfig},
    consumer::{parse_batch, PredictionConsumer},
    metrics::{AnalyticsMetrics, MetricsReporter},
    producer::ReportProducer,
    store::{AlertStore, FeedPersister, JsonFileAlertStore, MemoryAlertStore},
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("fraud_analytics={}", logging.level)))?;

    match logging.format.as_str() {
        "pretty" => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Fraud Analytics Service");
    info!(
        scheme = ?config.analytics.scheme,
        max_nodes = config.analytics.graph.max_nodes,
        max_chains = config.analytics.chains.max_chains,
        range_days = config.analytics.forecast.range_days,
        metric = ?config.analytics.forecast.metric,
        "Configuration loaded"
    );

    let metrics = Arc::new(AnalyticsMetrics::new());
    let engine = Arc::new(AnalyticsEngine::new(
        config.analytics.clone(),
        config.alerts.rules.clone(),
    ));

    // Alert feed survives restarts when a store path is configured
    let store: Arc<dyn AlertStore> = match &config.alerts.store_path {
        Some(path) => {
            info!(path = %path, "Using file alert store");
            Arc::new(JsonFileAlertStore::new(path))
        }
        None => Arc::new(MemoryAlertStore::new()),
    };
    let stored = store.load()?;
    info!(entries = stored.len(), "Alert feed restored");
    let feed = Arc::new(Mutex::new(AlertFeed::with_entries(
        config.alerts.feed_capacity,
        stored,
    )));
    let (persister, persister_task) = FeedPersister::spawn(store);
    let persister = Arc::new(persister);

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!(url = %config.nats.url, "Connected to NATS");

    let consumer = PredictionConsumer::new(client.clone(), &config.nats.prediction_subject);
    let producer = Arc::new(ReportProducer::new(client.clone(), &config.nats.report_subject));

    let num_workers = config.pipeline.workers;
    info!(
        workers = num_workers,
        predictions = %consumer.subject(),
        reports = %producer.subject(),
        "Starting batch processing loop"
    );

    // Semaphore to limit concurrent derivations
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.report_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    loop {
        let message = tokio::select! {
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        let engine = engine.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let feed = feed.clone();
        let persister = persister.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let raw = match parse_batch(&message.payload) {
                Ok(raw) => raw,
                Err(e) => {
                    metrics.record_rejected();
                    warn!(error = %e, "Skipping batch");
                    return;
                }
            };

            let start_time = Instant::now();
            let report = engine.derive(&raw);
            let derivation_time = start_time.elapsed();

            metrics.record_batch(raw.len(), derivation_time, &report.aggregate.counts_by_tier);
            metrics.record_alerts(
                report.feed.len() + report.rule_feed.len(),
                report.alerts.summary.total_alerts,
            );

            {
                let mut feed = feed.lock().await;
                let added = feed.ingest_entries(report.feed.clone())
                    + feed.ingest_entries(report.rule_feed.clone());
                if added > 0 {
                    // written by the persister task, not under this lock
                    persister.publish(feed.entries().to_vec());
                    info!(
                        added = added,
                        unread = feed.unread_count(),
                        "Alert feed updated"
                    );
                }
            }

            match producer.publish(&report).await {
                Ok(()) => debug!(
                    fingerprint = report.fingerprint,
                    records = raw.len(),
                    chains = report.chains.len(),
                    graph_nodes = report.graph.nodes.len(),
                    derivation_time_us = derivation_time.as_micros() as u64,
                    "Report published"
                ),
                Err(e) => error!(
                    fingerprint = report.fingerprint,
                    error = %e,
                    "Failed to publish report"
                ),
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;

            // Log progress every 100 batches
            if count % 100 == 0 {
                let stats = metrics.get_derivation_stats();
                info!(
                    processed = count,
                    throughput = format!("{:.1} rec/s", metrics.get_throughput()),
                    avg_latency_us = stats.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Service shutting down...");
    metrics.print_summary();

    // The persister flushes once in-flight batches release their handles
    drop(persister);
    match tokio::time::timeout(Duration::from_secs(5), persister_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Alert feed persister failed"),
        Err(_) => warn!("Timed out flushing the alert feed"),
    }

    Ok(())
}
