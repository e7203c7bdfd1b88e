//! Historical series and trend forecast with widening confidence bands.
//!
//! The historical part comes from true per-day aggregates when the snapshot
//! has them. Otherwise it is synthesized from snapshot-wide totals with a
//! weekly shape, a mild upward drift and bounded noise. The noise generator
//! is seeded from the snapshot, so the same input always yields the same
//! series.

use super::daily::DailyCalendar;
use crate::types::transaction::ScoredTransaction;
use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weekend values are dampened by this factor
pub const WEEKEND_FACTOR: f64 = 0.7;

/// Per-day drift of synthesized history
const DRIFT_PER_DAY: f64 = 0.002;

/// Window, in days, of the recent and older averages
const TREND_WINDOW: usize = 7;

/// Slopes beyond ±this are a trend
const TREND_THRESHOLD: f64 = 0.5;

/// Quantity being forecast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMetric {
    /// Transactions flagged as fraud (`probability > 0.5`) per day
    #[default]
    FraudCases,
    /// Transaction volume per day
    Amount,
    /// Mean fraud probability per day, in percent
    RiskScore,
}

/// Where the historical series comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// Observed when any observed day falls in the window, else synthesized
    #[default]
    Auto,
    Synthesized,
    Observed,
}

/// Historical or projected point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Historical,
    Forecast,
}

/// Direction of the recent trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn from_slope(slope: f64) -> Self {
        if slope > TREND_THRESHOLD {
            Trend::Up
        } else if slope < -TREND_THRESHOLD {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

/// One point of the series; bounds are set on forecast points only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: PointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

/// Headline numbers over a forecast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSummary {
    /// Mean of the last seven historical values
    pub avg_value: f64,
    pub max_value: f64,
    pub min_value: f64,
    pub forecast_avg: f64,
    pub change_percent: f64,
}

/// Output of [`TrendForecaster::forecast`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendForecast {
    pub metric: ForecastMetric,
    /// Whether history came from observed daily aggregates
    pub observed: bool,
    pub historical: Vec<ForecastPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub combined: Vec<ForecastPoint>,
    pub trend: Trend,
    /// Slope per day
    pub trend_value: f64,
    pub summary: ForecastSummary,
}

/// Forecast settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOptions {
    #[serde(default = "default_range_days")]
    pub range_days: usize,
    #[serde(default)]
    pub metric: ForecastMetric,
    #[serde(default)]
    pub history: HistorySource,
    /// Last historical day; defaults to the latest timestamp in the
    /// snapshot, then to today
    #[serde(default)]
    pub anchor: Option<NaiveDate>,
}

fn default_range_days() -> usize {
    30
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            range_days: default_range_days(),
            metric: ForecastMetric::default(),
            history: HistorySource::default(),
            anchor: None,
        }
    }
}

impl ForecastOptions {
    pub fn new(range_days: usize, metric: ForecastMetric) -> Self {
        Self {
            range_days,
            metric,
            ..Self::default()
        }
    }

    pub fn with_anchor(mut self, anchor: NaiveDate) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_history(mut self, history: HistorySource) -> Self {
        self.history = history;
        self
    }
}

/// Number of forecast days for a historical range: 30% of it, rounded up.
pub fn forecast_horizon(range_days: usize) -> usize {
    (range_days * 3).div_ceil(10)
}

/// Relative half-width of the confidence band `i` days ahead.
pub fn uncertainty(i: usize, forecast_days: usize) -> f64 {
    if forecast_days == 0 {
        return 0.1;
    }
    0.1 + (i as f64 / forecast_days as f64) * 0.2
}

fn weekend_factor(date: NaiveDate) -> f64 {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => WEEKEND_FACTOR,
        _ => 1.0,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Produces a historical series plus an extrapolated forecast.
#[derive(Debug, Clone, Default)]
pub struct TrendForecaster {
    options: ForecastOptions,
}

impl TrendForecaster {
    pub fn new(options: ForecastOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ForecastOptions {
        &self.options
    }

    /// Forecast over a snapshot, aggregating its timestamps for history.
    ///
    /// `seed` should identify the snapshot; see [`super::fingerprint`].
    pub fn forecast(&self, records: &[ScoredTransaction], seed: u64) -> TrendForecast {
        let calendar = DailyCalendar::from_records(records);
        self.forecast_with_calendar(records, &calendar, seed)
    }

    /// Forecast with per-day aggregates supplied by the caller.
    pub fn forecast_with_calendar(
        &self,
        records: &[ScoredTransaction],
        calendar: &DailyCalendar,
        seed: u64,
    ) -> TrendForecast {
        let anchor = self.resolve_anchor(calendar.last_date());
        self.forecast_at(records, calendar, seed, anchor)
    }

    /// Last historical day: the configured anchor, else `latest`, else today.
    ///
    /// Only the last fallback depends on the clock. Callers that cache
    /// forecasts should key them by the resolved anchor as well.
    pub fn resolve_anchor(&self, latest: Option<NaiveDate>) -> NaiveDate {
        self.options
            .anchor
            .or(latest)
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Forecast whose history ends at `anchor`.
    pub fn forecast_at(
        &self,
        records: &[ScoredTransaction],
        calendar: &DailyCalendar,
        seed: u64,
        anchor: NaiveDate,
    ) -> TrendForecast {
        let o = &self.options;
        let dates = history_dates(anchor, o.range_days);

        let observed = match o.history {
            HistorySource::Synthesized => false,
            HistorySource::Observed => true,
            HistorySource::Auto => dates.iter().any(|d| calendar.get(*d).is_some()),
        };

        let values = if observed {
            self.observed_values(&dates, calendar)
        } else {
            self.synthesized_values(&dates, records, seed)
        };

        let historical: Vec<ForecastPoint> = dates
            .iter()
            .zip(values)
            .map(|(&date, value)| ForecastPoint {
                date,
                value,
                kind: PointKind::Historical,
                lower: None,
                upper: None,
            })
            .collect();

        let history_values: Vec<f64> = historical.iter().map(|p| p.value).collect();
        let n = history_values.len();
        let recent = &history_values[n.saturating_sub(TREND_WINDOW)..];
        let older = &history_values[n.saturating_sub(2 * TREND_WINDOW)..n.saturating_sub(TREND_WINDOW)];
        let avg_recent = mean(recent);
        let slope = if older.is_empty() {
            0.0
        } else {
            (avg_recent - mean(older)) / TREND_WINDOW as f64
        };

        let has_input = !records.is_empty() || !calendar.is_empty();
        let forecast = if has_input {
            project(anchor, history_values.last().copied().unwrap_or(0.0), slope, forecast_horizon(o.range_days))
        } else {
            Vec::new()
        };

        let forecast_avg = mean(&forecast.iter().map(|p| p.value).collect::<Vec<_>>());
        let summary = ForecastSummary {
            avg_value: avg_recent,
            max_value: history_values.iter().copied().reduce(f64::max).unwrap_or(0.0),
            min_value: history_values.iter().copied().reduce(f64::min).unwrap_or(0.0),
            forecast_avg,
            change_percent: if avg_recent != 0.0 {
                (forecast_avg - avg_recent) / avg_recent * 100.0
            } else {
                0.0
            },
        };

        debug!(
            metric = ?o.metric,
            range_days = o.range_days,
            observed = observed,
            forecast_days = forecast.len(),
            slope = slope,
            "Computed trend forecast"
        );

        let combined = historical.iter().chain(&forecast).cloned().collect();
        TrendForecast {
            metric: o.metric,
            observed,
            historical,
            forecast,
            combined,
            trend: Trend::from_slope(slope),
            trend_value: slope,
            summary,
        }
    }

    /// Per-day values used verbatim; days without data are zero.
    fn observed_values(&self, dates: &[NaiveDate], calendar: &DailyCalendar) -> Vec<f64> {
        dates
            .iter()
            .map(|date| match calendar.get(*date) {
                Some(day) => match self.options.metric {
                    ForecastMetric::FraudCases => day.fraud_count as f64,
                    ForecastMetric::Amount => day.total_amount,
                    ForecastMetric::RiskScore => day.avg_probability() * 100.0,
                },
                None => 0.0,
            })
            .collect()
    }

    fn synthesized_values(&self, dates: &[NaiveDate], records: &[ScoredTransaction], seed: u64) -> Vec<f64> {
        let metric = self.options.metric;
        let days = dates.len();
        if days == 0 || records.is_empty() {
            return vec![0.0; days];
        }

        let base = match metric {
            ForecastMetric::FraudCases => {
                let fraud = records.iter().filter(|tx| tx.is_fraud()).count();
                fraud.div_ceil(days) as f64
            }
            ForecastMetric::Amount => records.iter().map(|tx| tx.amount).sum::<f64>() / days as f64,
            ForecastMetric::RiskScore => {
                records.iter().map(|tx| tx.probability).sum::<f64>() / records.len() as f64 * 100.0
            }
        };

        let mut rng = StdRng::seed_from_u64(seed ^ ((metric as u64) << 32) ^ days as u64);

        dates
            .iter()
            .enumerate()
            .map(|(k, &date)| {
                let drift = 1.0 + (k + 1) as f64 * DRIFT_PER_DAY;
                let noise = 0.8 + rng.gen::<f64>() * 0.4;
                let raw = base * weekend_factor(date) * drift * noise;
                match metric {
                    ForecastMetric::RiskScore => raw.clamp(0.0, 100.0),
                    _ => raw.round(),
                }
            })
            .collect()
    }
}

/// `range_days` dates ending at `anchor`, oldest first
fn history_dates(anchor: NaiveDate, range_days: usize) -> Vec<NaiveDate> {
    (0..range_days)
        .rev()
        .filter_map(|back| anchor.checked_sub_days(Days::new(back as u64)))
        .collect()
}

fn project(anchor: NaiveDate, last: f64, slope: f64, forecast_days: usize) -> Vec<ForecastPoint> {
    (1..=forecast_days)
        .filter_map(|i| {
            let date = anchor.checked_add_days(Days::new(i as u64))?;
            let value = ((last + slope * i as f64) * weekend_factor(date)).max(0.0);
            let u = uncertainty(i, forecast_days);
            Some(ForecastPoint {
                date,
                value,
                kind: PointKind::Forecast,
                lower: Some(value * (1.0 - u)),
                upper: Some(value * (1.0 + u)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn records(n: usize) -> Vec<ScoredTransaction> {
        (0..n)
            .map(|i| {
                ScoredTransaction::new(
                    format!("t{}", i),
                    format!("c{}", i % 5),
                    "m1",
                    100.0 + i as f64,
                    (i % 10) as f64 / 10.0,
                )
                .at(i)
            })
            .collect()
    }

    // Wednesday
    fn anchor() -> NaiveDate {
        day(2024, 5, 15)
    }

    #[test]
    fn test_horizon_and_uncertainty() {
        assert_eq!(forecast_horizon(7), 3);
        assert_eq!(forecast_horizon(30), 9);
        assert_eq!(forecast_horizon(90), 27);
        assert_eq!(forecast_horizon(0), 0);

        let first = uncertainty(1, 9);
        let last = uncertainty(9, 9);
        assert!((first - 0.1222).abs() < 1e-3);
        assert!((last - 0.3).abs() < 1e-12);
        assert!(first < last);
        assert!((1..9).all(|i| uncertainty(i, 9) <= uncertainty(i + 1, 9)));
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(Trend::from_slope(0.6), Trend::Up);
        assert_eq!(Trend::from_slope(0.5), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.5), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.51), Trend::Down);
    }

    #[test]
    fn test_empty_input_is_neutral() {
        let forecaster = TrendForecaster::new(ForecastOptions::new(30, ForecastMetric::Amount).with_anchor(anchor()));
        let result = forecaster.forecast(&[], 0);

        assert_eq!(result.historical.len(), 30);
        assert!(result.historical.iter().all(|p| p.value == 0.0));
        assert!(result.forecast.is_empty());
        assert_eq!(result.combined.len(), 30);
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.trend_value, 0.0);
        assert!(!result.observed);
        assert_eq!(result.summary, ForecastSummary::default());
    }

    #[test]
    fn test_synthesized_series_shape() {
        let forecaster = TrendForecaster::new(
            ForecastOptions::new(30, ForecastMetric::FraudCases).with_anchor(anchor()),
        );
        let result = forecaster.forecast(&records(300), 42);

        assert_eq!(result.historical.len(), 30);
        assert_eq!(result.historical.last().map(|p| p.date), Some(anchor()));
        assert_eq!(result.historical[0].date, day(2024, 4, 16));
        assert_eq!(result.forecast.len(), 9);
        assert_eq!(result.forecast[0].date, day(2024, 5, 16));
        assert_eq!(result.combined.len(), 39);
        assert!(result.historical.iter().all(|p| p.kind == PointKind::Historical && p.lower.is_none()));

        // 120 fraud cases over 30 days: base 4, bounded by drift, weekend and noise
        for p in &result.historical {
            assert_eq!(p.value, p.value.round());
            assert!(p.value >= 0.0 && p.value <= 6.0, "value {} out of range", p.value);
        }
    }

    #[test]
    fn test_forecast_bounds_and_monotonic_uncertainty() {
        for metric in [ForecastMetric::FraudCases, ForecastMetric::Amount, ForecastMetric::RiskScore] {
            let forecaster = TrendForecaster::new(ForecastOptions::new(30, metric).with_anchor(anchor()));
            let result = forecaster.forecast(&records(120), 7);

            let mut last_width = 0.0;
            for p in &result.forecast {
                let (lower, upper) = (p.lower.unwrap(), p.upper.unwrap());
                assert!(lower <= p.value && p.value <= upper);
                assert!(p.value >= 0.0);
                let width = if p.value > 0.0 { (upper - p.value) / p.value } else { last_width };
                assert!(width + 1e-12 >= last_width);
                last_width = width;
            }
        }
    }

    #[test]
    fn test_risk_score_is_bounded() {
        let forecaster = TrendForecaster::new(
            ForecastOptions::new(90, ForecastMetric::RiskScore).with_anchor(anchor()),
        );
        let result = forecaster.forecast(&records(50), 1);
        assert!(result.historical.iter().all(|p| (0.0..=100.0).contains(&p.value)));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let forecaster = TrendForecaster::new(ForecastOptions::new(30, ForecastMetric::Amount).with_anchor(anchor()));
        let input = records(80);
        assert_eq!(forecaster.forecast(&input, 99), forecaster.forecast(&input, 99));
    }

    #[test]
    fn test_weekend_dampening_in_forecast() {
        // flat observed history: slope zero, so only the weekend factor moves values
        let rows: Vec<_> = (1..=14)
            .map(|d| super::super::daily::DailyAggregate {
                date: day(2024, 5, d),
                count: 10,
                fraud_count: 10,
                total_amount: 1000.0,
                probability_sum: 6.0,
            })
            .collect();
        let calendar = DailyCalendar::from_rows(rows);
        let forecaster = TrendForecaster::new(
            ForecastOptions::new(14, ForecastMetric::FraudCases).with_anchor(day(2024, 5, 14)),
        );

        let result = forecaster.forecast_with_calendar(&[], &calendar, 0);

        assert!(result.observed);
        assert!(result.historical.iter().all(|p| p.value == 10.0));
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.forecast.len(), 5);
        // 2024-05-18 is a Saturday
        let saturday = result.forecast.iter().find(|p| p.date == day(2024, 5, 18)).unwrap();
        assert!((saturday.value - 7.0).abs() < 1e-9);
        let friday = result.forecast.iter().find(|p| p.date == day(2024, 5, 17)).unwrap();
        assert_eq!(friday.value, 10.0);
    }

    #[test]
    fn test_observed_history_used_verbatim() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let input: Vec<_> = (0..14u64)
            .flat_map(|d| {
                // day d carries d fraud cases and one clean transaction
                let ts = base + chrono::Duration::days(d as i64);
                let mut day_records: Vec<ScoredTransaction> = (0..d)
                    .map(|k| ScoredTransaction::new(format!("f{}-{}", d, k), "c", "m", 10.0, 0.9).with_timestamp(ts))
                    .collect();
                day_records.push(ScoredTransaction::new(format!("ok{}", d), "c", "m", 10.0, 0.1).with_timestamp(ts));
                day_records
            })
            .collect();

        let forecaster = TrendForecaster::new(ForecastOptions::new(14, ForecastMetric::FraudCases));
        let result = forecaster.forecast(&input, 3);

        assert!(result.observed);
        let values: Vec<f64> = result.historical.iter().map(|p| p.value).collect();
        assert_eq!(values, (0..14).map(|d| d as f64).collect::<Vec<_>>());
        // recent mean 10, older mean 3: slope 1
        assert!((result.trend_value - 1.0).abs() < 1e-9);
        assert_eq!(result.trend, Trend::Up);
        assert_eq!(result.historical.last().map(|p| p.date), Some(day(2024, 5, 14)));
    }

    #[test]
    fn test_short_range_has_no_slope() {
        let forecaster = TrendForecaster::new(ForecastOptions::new(7, ForecastMetric::Amount).with_anchor(anchor()));
        let result = forecaster.forecast(&records(20), 5);
        assert_eq!(result.trend_value, 0.0);
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.forecast.len(), 3);
    }

    #[test]
    fn test_synthesized_history_can_be_forced() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap();
        let input = vec![ScoredTransaction::new("t", "c", "m", 100.0, 0.9).with_timestamp(ts)];

        let forced = TrendForecaster::new(
            ForecastOptions::new(7, ForecastMetric::Amount).with_history(HistorySource::Synthesized),
        );
        assert!(!forced.forecast(&input, 1).observed);

        let auto = TrendForecaster::new(ForecastOptions::new(7, ForecastMetric::Amount));
        assert!(auto.forecast(&input, 1).observed);
    }

    #[test]
    fn test_empty_input_has_no_forecast_under_observed_history() {
        let forecaster = TrendForecaster::new(
            ForecastOptions::new(30, ForecastMetric::Amount)
                .with_anchor(anchor())
                .with_history(HistorySource::Observed),
        );
        let result = forecaster.forecast(&[], 0);

        assert_eq!(result.historical.len(), 30);
        assert!(result.historical.iter().all(|p| p.value == 0.0));
        assert!(result.forecast.is_empty());
        assert_eq!(result.combined.len(), 30);
        assert_eq!(result.summary, ForecastSummary::default());
    }

    #[test]
    fn test_anchor_resolution_order() {
        let configured = TrendForecaster::new(ForecastOptions::new(7, ForecastMetric::Amount).with_anchor(anchor()));
        assert_eq!(configured.resolve_anchor(Some(day(2024, 6, 1))), anchor());

        let open = TrendForecaster::new(ForecastOptions::new(7, ForecastMetric::Amount));
        assert_eq!(open.resolve_anchor(Some(day(2024, 6, 1))), day(2024, 6, 1));
    }

    #[test]
    fn test_undated_snapshot_is_deterministic_for_a_given_anchor() {
        // no timestamps and no configured anchor: the caller pins the day
        let forecaster = TrendForecaster::new(ForecastOptions::new(14, ForecastMetric::Amount));
        let input = records(40);
        let calendar = DailyCalendar::from_records(&input);
        assert!(calendar.is_empty());

        let a = forecaster.forecast_at(&input, &calendar, 5, anchor());
        let b = forecaster.forecast_at(&input, &calendar, 5, anchor());
        assert_eq!(a, b);
        assert_eq!(a.historical.last().map(|p| p.date), Some(anchor()));

        let next_day = forecaster.forecast_at(&input, &calendar, 5, day(2024, 5, 16));
        assert_eq!(next_day.historical.last().map(|p| p.date), Some(day(2024, 5, 16)));
    }
}
