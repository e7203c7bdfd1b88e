//! Fraud Analytics Library
//!
//! Turns snapshots of scored fraud predictions into investigative
//! structures: risk tiers, an entity graph, per-customer transaction chains,
//! trend forecasts and alerts.

pub mod analytics;
pub mod config;
pub mod consumer;
pub mod metrics;
pub mod normalizer;
pub mod producer;
pub mod store;
pub mod types;

pub use analytics::{AnalyticsEngine, AnalyticsReport};
pub use config::AppConfig;
pub use consumer::PredictionConsumer;
pub use normalizer::RecordNormalizer;
pub use producer::ReportProducer;
pub use store::{AlertStore, FeedPersister, JsonFileAlertStore, MemoryAlertStore};
pub use types::{RawRecord, RiskTier, ScoredTransaction};
