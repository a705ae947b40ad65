//! Core domain types shared across validation, signals, metrics and reporting

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One line of a basket: a ticker with its percentage weight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub weight: f64,
    pub notes: Option<String>,
}

impl Holding {
    pub fn new(ticker: impl Into<String>, weight: f64) -> Self {
        Self {
            ticker: ticker.into(),
            weight,
            notes: None,
        }
    }
}

impl From<&persistence::repository::HoldingRecord> for Holding {
    fn from(r: &persistence::repository::HoldingRecord) -> Self {
        Self {
            ticker: r.ticker.clone(),
            weight: r.weight,
            notes: r.notes.clone(),
        }
    }
}

/// Optional per-ticker weight bounds taken from the universe snapshot.
/// A missing bound means unconstrained on that side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightBound {
    pub ticker: String,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
}

/// A dated close observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Column-per-ticker table of daily closes. Also used for macro series,
/// where the key is the series label rather than a ticker.
///
/// Each series keeps its own calendar; gaps in one ticker never poison
/// another. An empty table is a legitimate value (provider unavailable).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTable {
    series: BTreeMap<String, Vec<PricePoint>>,
}

pub type SeriesTable = PriceTable;

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn ticker_count(&self) -> usize {
        self.series.len()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    /// Insert a series, sorting by date and keeping one point per date.
    /// Providers occasionally return two bars for the same calendar day.
    pub fn insert_series(&mut self, ticker: impl Into<String>, mut points: Vec<PricePoint>) {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        self.series.insert(ticker.into(), points);
    }

    pub fn series(&self, ticker: &str) -> Option<&[PricePoint]> {
        self.series.get(ticker).map(|v| v.as_slice())
    }

    /// Close values of one ticker in date order
    pub fn closes(&self, ticker: &str) -> Option<Vec<f64>> {
        self.series
            .get(ticker)
            .map(|points| points.iter().map(|p| p.close).collect())
    }

    /// Sorted union of all observation dates across series
    pub fn union_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .series
            .values()
            .flat_map(|points| points.iter().map(|p| p.date))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

/// Per-ticker composite score components, advisory only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub ticker: String,
    /// 12-month momentum minus the most recent month
    pub mom_12_1: f64,
    pub mom_6m: f64,
    /// 1 when the 50-period SMA sits above the 200-period SMA
    pub trend: i64,
    pub score: f64,
}

/// One row of a reweight suggestion; never applied automatically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReweightRow {
    pub ticker: String,
    pub weight: f64,
    pub new_weight: f64,
    pub delta: f64,
    pub score: f64,
}

/// One row of a version-to-version weight diff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffRow {
    pub ticker: String,
    pub old_weight: f64,
    pub new_weight: f64,
    pub change: f64,
}

/// Coverage summary for one ticker's price history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataHealthRow {
    pub ticker: String,
    /// Share of the union calendar this ticker has no observation for
    pub missing_pct: f64,
    pub last_date: Option<NaiveDate>,
    pub history_days: usize,
}
