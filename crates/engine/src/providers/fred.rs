//! FRED macro series client.
//!
//! Degrades rather than fails: no API key or total fetch failure returns an
//! empty table, and individual series that error out are skipped.

use anyhow::Result;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{check_range, MacroProvider, ProviderResult};
use crate::cache::{cache_key, TtlCache, DEFAULT_TTL};
use crate::types::{PricePoint, SeriesTable};
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org";

/// FRED observations client with a TTL result cache
pub struct FredClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    cache: TtlCache<SeriesTable>,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

impl FredClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_cache_ttl(api_key, DEFAULT_TTL)
    }

    pub fn with_cache_ttl(api_key: Option<String>, ttl: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            cache: TtlCache::new(ttl),
        }
    }

    /// Read `FRED_API_KEY` from the environment (absent is fine)
    pub fn from_env() -> Self {
        Self::new(std::env::var("FRED_API_KEY").ok())
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_one(
        &self,
        series_id: &str,
        api_key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        let url = format!(
            "{}/fred/series/observations?series_id={}&api_key={}&file_type=json&observation_start={}&observation_end={}",
            self.base_url, series_id, api_key, start, end
        );

        debug!(series_id, "Fetching observations from FRED");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("FRED API error {}", status);
        }

        let parsed: ObservationsResponse = response.json().await?;
        Ok(observations_to_points(parsed.observations))
    }
}

/// Drop the "." placeholders FRED uses for missing values
fn observations_to_points(observations: Vec<Observation>) -> Vec<PricePoint> {
    observations
        .into_iter()
        .filter_map(|obs| {
            let value = obs.value.trim();
            if value == "." {
                return None;
            }
            let close = value.parse::<f64>().ok()?;
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").ok()?;
            Some(PricePoint { date, close })
        })
        .collect()
}

#[async_trait]
impl MacroProvider for FredClient {
    /// Fetch each series under its display label; unauthenticated clients
    /// and fully failed fetches return an empty table.
    async fn fetch_series(
        &self,
        series: &[(String, String)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<SeriesTable> {
        check_range(start, end)?;

        let Some(api_key) = self.api_key.as_deref() else {
            debug!("no FRED API key configured, returning empty series table");
            return Ok(SeriesTable::new());
        };
        if series.is_empty() {
            return Ok(SeriesTable::new());
        }

        let mut key_parts: Vec<&str> = series
            .iter()
            .flat_map(|(label, id)| [label.as_str(), id.as_str()])
            .collect();
        let (s, e) = (start.to_string(), end.to_string());
        key_parts.push(&s);
        key_parts.push(&e);
        let key = cache_key("fred_series", &key_parts);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let mut table = SeriesTable::new();
        for (label, series_id) in series {
            match self.fetch_one(series_id, api_key, start, end).await {
                Ok(points) if !points.is_empty() => table.insert_series(label.clone(), points),
                Ok(_) => debug!(series_id, "no observations in range, series omitted"),
                Err(e) => warn!(series_id, error = %e, "series fetch failed, series omitted"),
            }
        }

        self.cache.put(key, table.clone());
        Ok(table)
    }
}

/// Default macro dashboard series (label, FRED series id)
pub fn default_series() -> Vec<(String, String)> {
    [
        ("US 10Y", "DGS10"),
        ("US CPI", "CPIAUCSL"),
        ("Unemployment", "UNRATE"),
        ("Fed Funds", "FEDFUNDS"),
        ("Recession", "USREC"),
    ]
    .into_iter()
    .map(|(label, id)| (label.to_string(), id.to_string()))
    .collect()
}
