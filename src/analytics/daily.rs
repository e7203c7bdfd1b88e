//! Date-keyed daily aggregates (the fraud calendar).
//!
//! Records without a parseable timestamp are skipped; they never abort the
//! aggregation. Days between the first and last observed date are
//! zero-filled so the calendar has no holes.

use crate::types::transaction::ScoredTransaction;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Totals for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub count: usize,
    pub fraud_count: usize,
    pub total_amount: f64,
    /// Sum of fraud probabilities; absent from upstream rows that predate it
    #[serde(default)]
    pub probability_sum: f64,
}

impl DailyAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            fraud_count: 0,
            total_amount: 0.0,
            probability_sum: 0.0,
        }
    }

    /// Mean fraud probability of the day, zero for an empty day
    pub fn avg_probability(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.probability_sum / self.count as f64
        }
    }
}

/// Summary over the whole calendar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarStats {
    /// Day with the most fraud, if any day had fraud
    pub peak: Option<DailyAggregate>,
    pub total_frauds: usize,
    pub avg_per_day: f64,
    pub total_transactions: usize,
}

/// Gap-free sequence of daily aggregates, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCalendar {
    pub days: Vec<DailyAggregate>,
    pub stats: CalendarStats,
}

impl DailyCalendar {
    /// Aggregate transactions by the UTC date of their timestamp.
    pub fn from_records(records: &[ScoredTransaction]) -> Self {
        let mut by_date: BTreeMap<NaiveDate, DailyAggregate> = BTreeMap::new();

        for tx in records {
            let Some(timestamp) = tx.timestamp else {
                continue;
            };
            let date = timestamp.date_naive();
            let day = by_date
                .entry(date)
                .or_insert_with(|| DailyAggregate::empty(date));
            day.count += 1;
            day.total_amount += tx.amount;
            day.probability_sum += tx.probability;
            if tx.is_fraud() {
                day.fraud_count += 1;
            }
        }

        Self::fill(by_date)
    }

    /// Build from rows that were already aggregated upstream.
    ///
    /// Duplicate dates are merged.
    pub fn from_rows(rows: impl IntoIterator<Item = DailyAggregate>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, DailyAggregate> = BTreeMap::new();
        for row in rows {
            let day = by_date
                .entry(row.date)
                .or_insert_with(|| DailyAggregate::empty(row.date));
            day.count += row.count;
            day.fraud_count += row.fraud_count;
            day.total_amount += row.total_amount;
            day.probability_sum += row.probability_sum;
        }
        Self::fill(by_date)
    }

    fn fill(mut by_date: BTreeMap<NaiveDate, DailyAggregate>) -> Self {
        let bounds = by_date
            .keys()
            .next()
            .copied()
            .zip(by_date.keys().next_back().copied());

        if let Some((first, last)) = bounds {
            for date in first.iter_days().take_while(|d| *d <= last) {
                by_date
                    .entry(date)
                    .or_insert_with(|| DailyAggregate::empty(date));
            }
        }

        let days: Vec<DailyAggregate> = by_date.into_values().collect();
        let stats = Self::stats(&days);
        Self { days, stats }
    }

    fn stats(days: &[DailyAggregate]) -> CalendarStats {
        let total_frauds = days.iter().map(|d| d.fraud_count).sum();
        let total_transactions = days.iter().map(|d| d.count).sum();

        // first day wins ties
        let peak = days
            .iter()
            .fold(None::<&DailyAggregate>, |best, d| match best {
                Some(b) if b.fraud_count >= d.fraud_count => Some(b),
                _ if d.fraud_count > 0 => Some(d),
                _ => best,
            })
            .cloned();

        let avg_per_day = if days.is_empty() {
            0.0
        } else {
            total_frauds as f64 / days.len() as f64
        };

        CalendarStats {
            peak,
            total_frauds,
            avg_per_day,
            total_transactions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Aggregate for `date`, if inside the calendar
    pub fn get(&self, date: NaiveDate) -> Option<&DailyAggregate> {
        self.days
            .binary_search_by_key(&date, |d| d.date)
            .ok()
            .map(|i| &self.days[i])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.first().map(|d| d.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.last().map(|d| d.date)
    }
}
