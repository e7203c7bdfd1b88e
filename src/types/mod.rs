//! Type definitions for the analytics layer

pub mod alert;
pub mod transaction;

pub use alert::{AlertRules, FeedAlert, RiskTier, TierScheme};
pub use transaction::{RawRecord, ScoredTransaction};
