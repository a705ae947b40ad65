//! Yahoo Finance chart API client for daily adjusted closes (no
//! authentication required)

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{check_range, PriceProvider, ProviderResult};
use crate::cache::{cache_key, TtlCache, DEFAULT_TTL};
use crate::types::{PricePoint, PriceTable};
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance daily price client with a TTL result cache
pub struct YahooClient {
    client: Client,
    base_url: String,
    cache: TtlCache<PriceTable>,
}

/// Chart API response envelope
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    adjclose: Option<Vec<AdjCloseBlock>>,
    quote: Option<Vec<QuoteBlock>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    close: Option<Vec<Option<f64>>>,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    pub fn new() -> Self {
        Self::with_cache_ttl(DEFAULT_TTL)
    }

    pub fn with_cache_ttl(ttl: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .user_agent("basket-desk/0.1")
                .build()
                .expect("Failed to build HTTP client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache: TtlCache::new(ttl),
        }
    }

    #[cfg(test)]
    fn with_base_url(base_url: &str) -> Self {
        let mut client = Self::with_cache_ttl(Duration::ZERO);
        client.base_url = base_url.to_string();
        client
    }

    /// Fetch one ticker's daily bars for the date range
    async fn fetch_one(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // End of the last requested day
        let period2 = (end + chrono::Days::new(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%2Csplit",
            self.base_url, ticker, period1, period2
        );

        debug!(ticker, "Fetching daily closes from Yahoo");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Yahoo chart API error {}: {}", status, body);
        }

        let parsed: ChartResponse = response.json().await?;
        Ok(chart_to_points(parsed))
    }

    /// Cheap liveness probe: does the ticker have any bars in the last week?
    pub async fn quick_ticker_check(&self, ticker: &str) -> bool {
        let end = chrono::Utc::now().date_naive();
        let start = end - chrono::Days::new(7);
        match self.fetch_one(ticker, start, end).await {
            Ok(points) => !points.is_empty(),
            Err(e) => {
                debug!(ticker, error = %e, "ticker quick-check failed");
                false
            }
        }
    }
}

/// Flatten a chart response into dated close points, preferring adjusted
/// closes and skipping null observations
fn chart_to_points(response: ChartResponse) -> Vec<PricePoint> {
    let Some(result) = response.chart.result.and_then(|mut r| {
        if r.is_empty() {
            None
        } else {
            Some(r.remove(0))
        }
    }) else {
        return Vec::new();
    };

    let Some(timestamps) = result.timestamp else {
        return Vec::new();
    };

    let closes: Vec<Option<f64>> = match result.indicators.adjclose {
        Some(blocks) if !blocks.is_empty() => blocks.into_iter().next().map(|b| b.adjclose),
        _ => result
            .indicators
            .quote
            .and_then(|blocks| blocks.into_iter().next())
            .and_then(|b| b.close),
    }
    .unwrap_or_default();

    timestamps
        .into_iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close?;
            let date = DateTime::from_timestamp(ts, 0)?.date_naive();
            Some(PricePoint { date, close })
        })
        .collect()
}

#[async_trait]
impl PriceProvider for YahooClient {
    /// Fetch each ticker independently; a failed or empty ticker is logged
    /// and omitted. Empty input or total failure yields an empty table.
    async fn fetch_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<PriceTable> {
        check_range(start, end)?;
        if tickers.is_empty() {
            return Ok(PriceTable::new());
        }

        let mut key_parts: Vec<&str> = tickers.iter().map(String::as_str).collect();
        let (s, e) = (start.to_string(), end.to_string());
        key_parts.push(&s);
        key_parts.push(&e);
        let key = cache_key("yahoo_prices", &key_parts);
        if let Some(cached) = self.cache.get(&key) {
            debug!(count = cached.ticker_count(), "price cache hit");
            return Ok(cached);
        }

        let mut table = PriceTable::new();
        for ticker in tickers {
            match self.fetch_one(ticker, start, end).await {
                Ok(points) if !points.is_empty() => table.insert_series(ticker.clone(), points),
                Ok(_) => debug!(ticker, "no data in range, ticker omitted"),
                Err(e) => warn!(ticker, error = %e, "price fetch failed, ticker omitted"),
            }
        }

        self.cache.put(key, table.clone());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_json(body: &str) -> ChartResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_chart_parsing_prefers_adjclose_and_skips_nulls() {
        let resp = chart_json(
            r#"{"chart":{"result":[{
                "timestamp":[1704153600,1704240000,1704326400],
                "indicators":{
                    "adjclose":[{"adjclose":[470.1,null,472.3]}],
                    "quote":[{"close":[471.0,471.5,473.0]}]
                }
            }],"error":null}}"#,
        );
        let points = chart_to_points(resp);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 470.1);
        assert_eq!(points[1].close, 472.3);
    }

    #[test]
    fn test_chart_parsing_falls_back_to_quote_close() {
        let resp = chart_json(
            r#"{"chart":{"result":[{
                "timestamp":[1704153600],
                "indicators":{"quote":[{"close":[471.0]}]}
            }],"error":null}}"#,
        );
        let points = chart_to_points(resp);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].close, 471.0);
    }

    #[test]
    fn test_chart_parsing_handles_missing_result() {
        let resp = chart_json(r#"{"chart":{"result":null}}"#);
        assert!(chart_to_points(resp).is_empty());
    }

    #[tokio::test]
    async fn test_quick_ticker_check_false_when_unreachable() {
        let client = YahooClient::with_base_url("http://127.0.0.1:1");
        assert!(!client.quick_ticker_check("SPY").await);
    }

    #[tokio::test]
    async fn test_empty_ticker_list_yields_empty_table() {
        let client = YahooClient::with_cache_ttl(Duration::ZERO);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let table = client.fetch_prices(&[], start, end).await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_inverted_range_is_invalid_request() {
        let client = YahooClient::with_cache_ttl(Duration::ZERO);
        let start = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = client
            .fetch_prices(&["SPY".to_string()], start, end)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid request"));
    }
}
