//! Schema and weight-constraint validation.
//!
//! All checks accumulate human-readable messages and return them as values,
//! so a caller can show every problem at once instead of failing one at a
//! time. Nothing here touches storage or the network.

use crate::csv::CsvTable;
use crate::types::{DiffRow, Holding, WeightBound};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columns every universe upload must carry
pub const REQUIRED_UNIVERSE_COLUMNS: [&str; 7] = [
    "instrument_id",
    "ticker",
    "name",
    "asset_class",
    "region",
    "currency",
    "eligible",
];

/// Absolute tolerance on the 100% weight-sum check
pub const WEIGHT_TOLERANCE: f64 = 1e-3;

/// Outcome of a validation pass: ok iff no messages accumulated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Fold another report's messages into this one
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
    }
}

/// Check a raw universe upload: required columns present, unique
/// instrument ids, no blank tickers. Non-short-circuiting.
pub fn validate_universe_schema(table: &CsvTable) -> ValidationReport {
    let mut report = ValidationReport::default();

    let missing: Vec<&str> = REQUIRED_UNIVERSE_COLUMNS
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        report.push(format!("Missing required columns: {missing:?}"));
    }

    if table.has_column("instrument_id") {
        let mut seen = std::collections::HashSet::new();
        let duplicated = (0..table.row_count())
            .filter_map(|i| table.value(i, "instrument_id"))
            .any(|id| !seen.insert(id.to_string()));
        if duplicated {
            report.push("instrument_id must be unique");
        }
    }

    if table.has_column("ticker") {
        let blank = (0..table.row_count())
            .any(|i| table.value(i, "ticker").map_or(true, |t| t.trim().is_empty()));
        if blank {
            report.push("ticker cannot be missing");
        }
    }

    report
}

/// Check a holdings vector against basket rules.
///
/// Empty holdings fail fast with a single message. Otherwise all violations
/// are accumulated: weight-sum tolerance, sign when shorting is off, and
/// per-ticker bounds. A ticker with no bounds row is unconstrained. Bound
/// violations are reported as one aggregate message per direction.
pub fn validate_weights(
    holdings: &[Holding],
    allow_short: bool,
    bounds: Option<&[WeightBound]>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if holdings.is_empty() {
        report.push("Holdings cannot be empty");
        return report;
    }

    let total: f64 = holdings.iter().map(|h| h.weight).sum();
    if (total - 100.0).abs() > WEIGHT_TOLERANCE {
        report.push(format!("Weight sum must be 100, got {total:.4}"));
    }

    if !allow_short && holdings.iter().any(|h| h.weight < 0.0) {
        report.push("Negative weights are not allowed");
    }

    if let Some(bounds) = bounds {
        let by_ticker: BTreeMap<&str, &WeightBound> =
            bounds.iter().map(|b| (b.ticker.as_str(), b)).collect();

        let below_min = holdings.iter().any(|h| {
            by_ticker
                .get(h.ticker.as_str())
                .and_then(|b| b.min_weight)
                .is_some_and(|min| h.weight < min)
        });
        let above_max = holdings.iter().any(|h| {
            by_ticker
                .get(h.ticker.as_str())
                .and_then(|b| b.max_weight)
                .is_some_and(|max| h.weight > max)
        });

        if below_min {
            report.push("Some holdings are below min_weight bounds");
        }
        if above_max {
            report.push("Some holdings are above max_weight bounds");
        }
    }

    report
}

/// Holding-count ceiling, composed with `validate_weights` by callers
pub fn validate_holding_count(count: usize, max_holdings: i64) -> ValidationReport {
    let mut report = ValidationReport::default();
    if count as i64 > max_holdings {
        report.push(format!(
            "Too many holdings: {count} exceeds basket limit {max_holdings}"
        ));
    }
    report
}

/// Weight changes between two versions: full outer join on ticker, a
/// missing side counts as weight 0, sorted by change descending.
pub fn version_diff(old: &[Holding], new: &[Holding]) -> Vec<DiffRow> {
    let mut tickers: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for h in old {
        tickers.entry(h.ticker.as_str()).or_insert((0.0, 0.0)).0 = h.weight;
    }
    for h in new {
        tickers.entry(h.ticker.as_str()).or_insert((0.0, 0.0)).1 = h.weight;
    }

    let mut rows: Vec<DiffRow> = tickers
        .into_iter()
        .map(|(ticker, (old_weight, new_weight))| DiffRow {
            ticker: ticker.to_string(),
            old_weight,
            new_weight,
            change: new_weight - old_weight,
        })
        .collect();
    rows.sort_by(|a, b| b.change.total_cmp(&a.change));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> CsvTable {
        CsvTable::parse(csv).unwrap()
    }

    #[test]
    fn test_universe_schema_ok() {
        let t = table(
            "instrument_id,ticker,name,asset_class,region,currency,eligible\n\
             a,SPY,S&P 500 ETF,Equity,US,USD,true\n",
        );
        let report = validate_universe_schema(&t);
        assert!(report.ok());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_universe_schema_names_missing_column() {
        let t = table(
            "instrument_id,ticker,name,asset_class,currency,eligible\n\
             a,SPY,S&P 500 ETF,Equity,USD,true\n",
        );
        let report = validate_universe_schema(&t);
        assert!(!report.ok());
        assert!(report.errors[0].contains("region"));
    }

    #[test]
    fn test_universe_schema_accumulates_all_failures() {
        let t = table(
            "instrument_id,ticker\n\
             a,SPY\n\
             a,\n",
        );
        let report = validate_universe_schema(&t);
        // Missing columns + duplicate id + blank ticker, reported together
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[1].contains("instrument_id"));
        assert!(report.errors[2].contains("ticker"));
    }

    #[test]
    fn test_weights_ok_at_tolerance() {
        let h = vec![Holding::new("SPY", 60.0), Holding::new("AGG", 40.0005)];
        assert!(validate_weights(&h, false, None).ok());
    }

    #[test]
    fn test_weight_sum_fails() {
        let h = vec![Holding::new("SPY", 50.0), Holding::new("AGG", 40.0)];
        let report = validate_weights(&h, false, None);
        assert!(!report.ok());
        assert!(report.errors[0].contains("100"));
    }

    #[test]
    fn test_empty_holdings_fail_fast() {
        let report = validate_weights(&[], false, None);
        assert_eq!(report.errors, vec!["Holdings cannot be empty".to_string()]);
    }

    #[test]
    fn test_negative_weight_needs_allow_short() {
        let h = vec![Holding::new("SPY", 110.0), Holding::new("AGG", -10.0)];
        let strict = validate_weights(&h, false, None);
        assert!(strict.errors.iter().any(|e| e.contains("Negative")));

        let short_ok = validate_weights(&h, true, None);
        assert!(short_ok.ok());
    }

    #[test]
    fn test_bounds_aggregate_per_direction() {
        let h = vec![
            Holding::new("SPY", 80.0),
            Holding::new("AGG", 15.0),
            Holding::new("GLD", 5.0),
        ];
        let bounds = vec![
            WeightBound {
                ticker: "SPY".into(),
                min_weight: None,
                max_weight: Some(50.0),
            },
            WeightBound {
                ticker: "AGG".into(),
                min_weight: Some(20.0),
                max_weight: None,
            },
            // GLD intentionally unbounded
        ];
        let report = validate_weights(&h, false, Some(&bounds));
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().any(|e| e.contains("below min_weight")));
        assert!(report.errors.iter().any(|e| e.contains("above max_weight")));
    }

    #[test]
    fn test_missing_bounds_are_unconstrained() {
        let h = vec![Holding::new("SPY", 100.0)];
        let bounds: Vec<WeightBound> = vec![];
        assert!(validate_weights(&h, false, Some(&bounds)).ok());
    }

    #[test]
    fn test_holding_count_limit() {
        assert!(validate_holding_count(50, 50).ok());
        let report = validate_holding_count(51, 50);
        assert!(report.errors[0].contains("Too many holdings"));
    }

    #[test]
    fn test_version_diff_sorted_by_change() {
        let old = vec![Holding::new("SPY", 50.0), Holding::new("AGG", 50.0)];
        let new = vec![Holding::new("SPY", 60.0), Holding::new("AGG", 40.0)];
        let diff = version_diff(&old, &new);
        assert_eq!(diff[0].ticker, "SPY");
        assert_eq!(diff[0].change, 10.0);
        assert_eq!(diff[1].ticker, "AGG");
        assert_eq!(diff[1].change, -10.0);
    }

    #[test]
    fn test_version_diff_outer_join_missing_side_is_zero() {
        let old = vec![Holding::new("SPY", 100.0)];
        let new = vec![Holding::new("GLD", 100.0)];
        let diff = version_diff(&old, &new);
        assert_eq!(diff[0].ticker, "GLD");
        assert_eq!(diff[0].old_weight, 0.0);
        assert_eq!(diff[0].change, 100.0);
        assert_eq!(diff[1].ticker, "SPY");
        assert_eq!(diff[1].new_weight, 0.0);
        assert_eq!(diff[1].change, -100.0);
    }
}
