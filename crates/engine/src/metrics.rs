//! Analytics and risk metrics over price tables and weight vectors.
//!
//! Everything here is pure arithmetic; an empty table or short series gives
//! an empty result rather than an error, so degraded market data flows
//! through as degraded analytics.

use crate::types::{DataHealthRow, Holding, PriceTable};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Annualization base for daily data
pub const TRADING_DAYS: f64 = 252.0;
/// Default rolling window (~one quarter)
pub const DEFAULT_WINDOW: usize = 63;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1)
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Period-over-period simple returns; one element shorter than the input
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { w[1] / w[0] - 1.0 })
        .collect()
}

/// Compounded growth of 1 unit, minus 1
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0;
    returns
        .iter()
        .map(|r| {
            wealth *= 1.0 + r;
            wealth - 1.0
        })
        .collect()
}

/// Rolling annualized volatility; None until the window fills
pub fn rolling_vol(returns: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(returns, window, |w| std_dev(w) * TRADING_DAYS.sqrt())
}

/// Rolling annualized Sharpe ratio against a flat risk-free rate
pub fn rolling_sharpe(returns: &[f64], window: usize, rf: f64) -> Vec<Option<f64>> {
    let excess: Vec<f64> = returns.iter().map(|r| r - rf / TRADING_DAYS).collect();
    rolling(&excess, window, |w| {
        let sig = std_dev(w) * TRADING_DAYS.sqrt();
        if sig == 0.0 {
            0.0
        } else {
            mean(w) * TRADING_DAYS / sig
        }
    })
}

/// Rolling z-score of a level series against its own trailing window
pub fn zscore(series: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(series, window, |w| {
        let sig = std_dev(w);
        if sig == 0.0 {
            0.0
        } else {
            (w[w.len() - 1] - mean(w)) / sig
        }
    })
}

fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                None
            } else {
                Some(f(&values[i + 1 - window..=i]))
            }
        })
        .collect()
}

/// Deepest peak-to-trough loss of a return series (a non-positive number)
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0f64;
    let mut peak = 1.0f64;
    let mut worst = 0.0f64;
    for r in returns {
        wealth *= 1.0 + r;
        peak = peak.max(wealth);
        worst = worst.min(wealth / peak - 1.0);
    }
    worst
}

/// Herfindahl-Hirschman Index of percentage weights (sum of squared fractions)
pub fn hhi(weights: &[f64]) -> f64 {
    weights.iter().map(|w| (w / 100.0).powi(2)).sum()
}

/// Combined weight of the five largest positions
pub fn top5_weight(weights: &[f64]) -> f64 {
    let mut sorted = weights.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted.iter().take(5).sum()
}

/// Weighted daily return of a basket over the union calendar.
///
/// A ticker missing either endpoint of a day contributes 0 for that day.
pub fn basket_returns(prices: &PriceTable, holdings: &[Holding]) -> Vec<(NaiveDate, f64)> {
    let dates = prices.union_dates();
    if dates.len() < 2 {
        return Vec::new();
    }

    let close_maps: Vec<(f64, BTreeMap<NaiveDate, f64>)> = holdings
        .iter()
        .filter_map(|h| {
            prices.series(&h.ticker).map(|points| {
                let map = points.iter().map(|p| (p.date, p.close)).collect();
                (h.weight / 100.0, map)
            })
        })
        .collect();

    dates
        .windows(2)
        .map(|w| {
            let ret = close_maps
                .iter()
                .map(|(weight, closes)| match (closes.get(&w[0]), closes.get(&w[1])) {
                    (Some(&prev), Some(&curr)) if prev != 0.0 => weight * (curr / prev - 1.0),
                    _ => 0.0,
                })
                .sum();
            (w[1], ret)
        })
        .collect()
}

/// Pairwise correlation of daily returns over each pair's common dates.
/// Returns the ticker ordering and a symmetric matrix; a pair with under
/// two overlapping returns gets 0.
pub fn correlation_matrix(prices: &PriceTable) -> (Vec<String>, Vec<Vec<f64>>) {
    let tickers: Vec<String> = prices.tickers().map(str::to_string).collect();

    let return_maps: Vec<BTreeMap<NaiveDate, f64>> = tickers
        .iter()
        .map(|t| {
            let points = prices.series(t).unwrap_or_default();
            points
                .windows(2)
                .filter(|w| w[0].close != 0.0)
                .map(|w| (w[1].date, w[1].close / w[0].close - 1.0))
                .collect()
        })
        .collect();

    let n = tickers.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let c = correlation(&return_maps[i], &return_maps[j]);
            matrix[i][j] = c;
            matrix[j][i] = c;
        }
    }
    (tickers, matrix)
}

fn correlation(a: &BTreeMap<NaiveDate, f64>, b: &BTreeMap<NaiveDate, f64>) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .filter_map(|(date, &ra)| b.get(date).map(|&rb| (ra, rb)))
        .collect();
    if pairs.len() < 2 {
        return 0.0;
    }
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let (mx, my) = (mean(&xs), mean(&ys));
    let cov = pairs
        .iter()
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>();
    let denom = (xs.iter().map(|x| (x - mx).powi(2)).sum::<f64>()
        * ys.iter().map(|y| (y - my).powi(2)).sum::<f64>())
    .sqrt();
    if denom == 0.0 {
        0.0
    } else {
        cov / denom
    }
}

/// Per-ticker coverage vs the union calendar
pub fn data_health(prices: &PriceTable) -> Vec<DataHealthRow> {
    let union_len = prices.union_dates().len();
    prices
        .tickers()
        .map(|ticker| {
            let points = prices.series(ticker).unwrap_or_default();
            let missing_pct = if union_len == 0 {
                0.0
            } else {
                union_len.saturating_sub(points.len()) as f64 / union_len as f64 * 100.0
            };
            DataHealthRow {
                ticker: ticker.to_string(),
                missing_pct,
                last_date: points.last().map(|p| p.date),
                history_days: points.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricePoint;

    fn day(i: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i)
    }

    fn series(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: day(i as u64),
                close,
            })
            .collect()
    }

    #[test]
    fn test_simple_and_cumulative_returns() {
        let rets = simple_returns(&[100.0, 110.0, 99.0]);
        assert!((rets[0] - 0.10).abs() < 1e-12);
        assert!((rets[1] + 0.10).abs() < 1e-12);

        let cum = cumulative_returns(&rets);
        assert!((cum[1] - (1.1 * 0.9 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_vol_warmup() {
        let rets = vec![0.01, -0.02, 0.015, 0.0, 0.01];
        let vol = rolling_vol(&rets, 3);
        assert_eq!(vol[0], None);
        assert_eq!(vol[1], None);
        assert!(vol[2].unwrap() > 0.0);
        assert_eq!(vol.len(), rets.len());
    }

    #[test]
    fn test_max_drawdown() {
        // 100 -> 120 -> 60: drawdown is -50%
        let dd = max_drawdown(&[0.2, -0.5]);
        assert!((dd + 0.5).abs() < 1e-12);
        assert_eq!(max_drawdown(&[0.1, 0.1]), 0.0);
    }

    #[test]
    fn test_hhi_and_top5() {
        // Equal 4-way split: 4 * 0.25^2 = 0.25
        let w = vec![25.0, 25.0, 25.0, 25.0];
        assert!((hhi(&w) - 0.25).abs() < 1e-12);

        let w6 = vec![30.0, 20.0, 15.0, 15.0, 10.0, 10.0];
        assert!((top5_weight(&w6) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_constant_series_is_zero() {
        let z = zscore(&[5.0; 10], 5);
        assert_eq!(z[9], Some(0.0));
    }

    #[test]
    fn test_basket_returns_weighted_sum() {
        let mut prices = PriceTable::new();
        prices.insert_series("SPY", series(&[100.0, 110.0]));
        prices.insert_series("AGG", series(&[100.0, 100.0]));
        let holdings = vec![Holding::new("SPY", 50.0), Holding::new("AGG", 50.0)];

        let rets = basket_returns(&prices, &holdings);
        assert_eq!(rets.len(), 1);
        // Half of SPY's +10%
        assert!((rets[0].1 - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_basket_returns_empty_table() {
        let prices = PriceTable::new();
        assert!(basket_returns(&prices, &[Holding::new("SPY", 100.0)]).is_empty());
    }

    #[test]
    fn test_correlation_of_identical_series_is_one() {
        let closes = vec![100.0, 102.0, 101.0, 105.0, 103.0];
        let mut prices = PriceTable::new();
        prices.insert_series("A", series(&closes));
        prices.insert_series("B", series(&closes));

        let (tickers, matrix) = correlation_matrix(&prices);
        assert_eq!(tickers, vec!["A".to_string(), "B".to_string()]);
        assert!((matrix[0][1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_data_health_with_duplicate_dates() {
        let mut prices = PriceTable::new();
        let mut points = series(&[100.0, 101.0]);
        // Two bars for the same calendar day must collapse to one
        points[1].date = points[0].date;
        prices.insert_series("DUP", points);

        let health = data_health(&prices);
        assert_eq!(health[0].history_days, 1);
        assert_eq!(health[0].missing_pct, 0.0);
    }

    #[test]
    fn test_data_health_reports_gaps() {
        let mut prices = PriceTable::new();
        prices.insert_series("FULL", series(&[1.0, 2.0, 3.0, 4.0]));
        prices.insert_series("GAPPY", series(&[1.0, 2.0]));

        let health = data_health(&prices);
        let gappy = health.iter().find(|h| h.ticker == "GAPPY").unwrap();
        assert_eq!(gappy.history_days, 2);
        assert!((gappy.missing_pct - 50.0).abs() < 1e-9);
        assert_eq!(gappy.last_date, Some(day(1)));
    }
}
