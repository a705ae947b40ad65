//! Momentum/trend signal generation and reweight suggestions.
//!
//! Scores are advisory: `suggest_reweight` produces a candidate holdings
//! vector and never writes to the versioning store. Materializing a
//! suggestion is a separate, explicit call into the basket repository.

use crate::types::{Holding, PriceTable, ReweightRow, SignalScore};
use crate::validation::WEIGHT_TOLERANCE;
use std::collections::BTreeMap;
use ta::indicators::SimpleMovingAverage;
use ta::Next;
use thiserror::Error;

/// ~12 months of daily bars
const MOM_LONG_PERIODS: usize = 252;
/// ~1 month, excluded from the long leg
const MOM_SKIP_PERIODS: usize = 21;
/// ~6 months
const MOM_MID_PERIODS: usize = 126;
const MA_FAST: usize = 50;
const MA_SLOW: usize = 200;
/// Contribution of the trend flag to the composite score
const TREND_WEIGHT: f64 = 0.05;
/// Percentage points of tilt per unit of score
const SCORE_TILT: f64 = 10.0;

#[derive(Error, Debug)]
pub enum SignalError {
    /// Adjusted weights summed to zero or below; renormalizing would divide
    /// by zero or flip signs, so the suggestion is refused outright.
    #[error("adjusted weights sum to {0:.4}; cannot renormalize a suggestion")]
    DegenerateWeights(f64),
}

/// Simple percentage change over `periods` bars, None when history is short
fn pct_change(closes: &[f64], periods: usize) -> Option<f64> {
    let n = closes.len();
    if n <= periods {
        return None;
    }
    let prev = closes[n - 1 - periods];
    if prev == 0.0 {
        return None;
    }
    Some(closes[n - 1] / prev - 1.0)
}

/// 1 when the fast SMA sits above the slow SMA, 0 otherwise (including
/// when history is shorter than the slow window)
fn trend_flag(closes: &[f64]) -> i64 {
    if closes.len() < MA_SLOW {
        return 0;
    }
    let mut fast = SimpleMovingAverage::new(MA_FAST).expect("invalid SMA period");
    let mut slow = SimpleMovingAverage::new(MA_SLOW).expect("invalid SMA period");
    let mut fast_val = 0.0;
    let mut slow_val = 0.0;
    for &close in closes {
        fast_val = fast.next(close);
        slow_val = slow.next(close);
    }
    (fast_val > slow_val) as i64
}

/// Per-ticker composite score over a price table.
///
/// score = mean(mom_12_1, mom_6m) + 0.05 × trend, with any component that
/// lacks sufficient history treated as 0. Output sorted by score descending.
pub fn composite_signal(prices: &PriceTable) -> Vec<SignalScore> {
    let mut scores: Vec<SignalScore> = prices
        .tickers()
        .map(|ticker| {
            let closes = prices.closes(ticker).unwrap_or_default();

            let mom_12_1 = match (
                pct_change(&closes, MOM_LONG_PERIODS),
                pct_change(&closes, MOM_SKIP_PERIODS),
            ) {
                (Some(long), Some(recent)) => long - recent,
                _ => 0.0,
            };
            let mom_6m = pct_change(&closes, MOM_MID_PERIODS).unwrap_or(0.0);
            let trend = trend_flag(&closes);
            let score = (mom_12_1 + mom_6m) / 2.0 + TREND_WEIGHT * trend as f64;

            SignalScore {
                ticker: ticker.to_string(),
                mom_12_1,
                mom_6m,
                trend,
                score,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

/// Propose a renormalized weight vector tilted toward higher scores.
///
/// Left join on ticker (a holding without a score gets 0), tilt each weight
/// by score × 10, renormalize the set back to 100, sort by delta descending.
pub fn suggest_reweight(
    holdings: &[Holding],
    scores: &[SignalScore],
) -> Result<Vec<ReweightRow>, SignalError> {
    let score_by_ticker: BTreeMap<&str, f64> =
        scores.iter().map(|s| (s.ticker.as_str(), s.score)).collect();

    let adjusted: Vec<(f64, f64)> = holdings
        .iter()
        .map(|h| {
            let score = score_by_ticker.get(h.ticker.as_str()).copied().unwrap_or(0.0);
            (score, h.weight + score * SCORE_TILT)
        })
        .collect();

    let adj_sum: f64 = adjusted.iter().map(|(_, adj)| adj).sum();
    if adj_sum <= WEIGHT_TOLERANCE {
        return Err(SignalError::DegenerateWeights(adj_sum));
    }

    let mut rows: Vec<ReweightRow> = holdings
        .iter()
        .zip(adjusted)
        .map(|(h, (score, adj))| {
            let new_weight = adj / adj_sum * 100.0;
            ReweightRow {
                ticker: h.ticker.clone(),
                weight: h.weight,
                new_weight,
                delta: new_weight - h.weight,
                score,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.delta.total_cmp(&a.delta));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricePoint;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + chrono::Days::new(i as u64),
                close,
            })
            .collect()
    }

    fn table(entries: &[(&str, Vec<f64>)]) -> PriceTable {
        let mut t = PriceTable::new();
        for (ticker, closes) in entries {
            t.insert_series(*ticker, series(closes));
        }
        t
    }

    #[test]
    fn test_short_history_momentum_components_are_zero() {
        // Under 252 bars: 12m leg must degrade to 0 instead of failing
        let closes: Vec<f64> = (0..200).map(|i| 100.0 + i as f64).collect();
        let prices = table(&[("SPY", closes)]);
        let scores = composite_signal(&prices);
        assert_eq!(scores[0].mom_12_1, 0.0);
        assert!(scores[0].mom_6m > 0.0);
    }

    #[test]
    fn test_very_short_history_scores_zero() {
        let prices = table(&[("SPY", vec![100.0, 101.0, 102.0])]);
        let scores = composite_signal(&prices);
        assert_eq!(scores[0].mom_12_1, 0.0);
        assert_eq!(scores[0].mom_6m, 0.0);
        assert_eq!(scores[0].trend, 0);
        assert_eq!(scores[0].score, 0.0);
    }

    #[test]
    fn test_uptrend_sets_trend_flag() {
        let closes: Vec<f64> = (0..300).map(|i| 100.0 + i as f64 * 0.5).collect();
        let prices = table(&[("SPY", closes)]);
        let scores = composite_signal(&prices);
        assert_eq!(scores[0].trend, 1);
        assert!(scores[0].score > 0.0);
    }

    #[test]
    fn test_scores_sorted_descending() {
        let up: Vec<f64> = (0..300).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..300).map(|i| 400.0 - i as f64).collect();
        let prices = table(&[("DOWN", down), ("UP", up)]);
        let scores = composite_signal(&prices);
        assert_eq!(scores[0].ticker, "UP");
        assert_eq!(scores[1].ticker, "DOWN");
    }

    #[test]
    fn test_reweight_neutral_score_is_identity() {
        let holdings = vec![Holding::new("SPY", 100.0)];
        let scores = vec![SignalScore {
            ticker: "SPY".into(),
            mom_12_1: 0.0,
            mom_6m: 0.0,
            trend: 0,
            score: 0.0,
        }];
        let rows = suggest_reweight(&holdings, &scores).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].new_weight - 100.0).abs() < 1e-9);
        assert!(rows[0].delta.abs() < 1e-9);
    }

    #[test]
    fn test_reweight_tilts_toward_higher_score_and_renormalizes() {
        let holdings = vec![Holding::new("SPY", 50.0), Holding::new("AGG", 50.0)];
        let scores = vec![SignalScore {
            ticker: "SPY".into(),
            mom_12_1: 0.2,
            mom_6m: 0.2,
            trend: 0,
            score: 0.2,
        }];
        let rows = suggest_reweight(&holdings, &scores).unwrap();
        let total: f64 = rows.iter().map(|r| r.new_weight).sum();
        assert!((total - 100.0).abs() < 1e-9);
        // Sorted by delta descending; SPY gained at AGG's expense
        assert_eq!(rows[0].ticker, "SPY");
        assert!(rows[0].delta > 0.0);
        assert!(rows[1].delta < 0.0);
    }

    #[test]
    fn test_unmatched_holding_gets_zero_score() {
        let holdings = vec![Holding::new("SPY", 60.0), Holding::new("XYZ", 40.0)];
        let scores = composite_signal(&table(&[("SPY", vec![100.0; 10])]));
        let rows = suggest_reweight(&holdings, &scores).unwrap();
        let xyz = rows.iter().find(|r| r.ticker == "XYZ").unwrap();
        assert_eq!(xyz.score, 0.0);
    }

    #[test]
    fn test_degenerate_adjusted_sum_is_refused() {
        let holdings = vec![Holding::new("SPY", 5.0), Holding::new("AGG", 5.0)];
        let scores = vec![
            SignalScore {
                ticker: "SPY".into(),
                mom_12_1: -0.5,
                mom_6m: -0.5,
                trend: 0,
                score: -0.5,
            },
            SignalScore {
                ticker: "AGG".into(),
                mom_12_1: -0.5,
                mom_6m: -0.5,
                trend: 0,
                score: -0.5,
            },
        ];
        let err = suggest_reweight(&holdings, &scores).unwrap_err();
        assert!(matches!(err, SignalError::DegenerateWeights(_)));
    }
}
