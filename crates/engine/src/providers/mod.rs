//! Market-data provider clients.
//!
//! The failure contract separates two cases the memoized originals blurred:
//! a provider that is unreachable, unauthenticated or returns nothing yields
//! an empty table `Ok` (downstream analytics degrade, nothing propagates);
//! malformed input from the caller is `ProviderError::InvalidRequest`.

pub mod fred;
pub mod yahoo;

pub use fred::FredClient;
pub use yahoo::YahooClient;

use crate::types::{PriceTable, SeriesTable};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Daily adjusted-close source. A ticker that fails to fetch is omitted
/// from the result rather than failing the whole call.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<PriceTable>;
}

/// Macro series source keyed by (label, series id) pairs
#[async_trait]
pub trait MacroProvider: Send + Sync {
    async fn fetch_series(
        &self,
        series: &[(String, String)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<SeriesTable>;
}

pub(crate) fn check_range(start: NaiveDate, end: NaiveDate) -> ProviderResult<()> {
    if start > end {
        return Err(ProviderError::InvalidRequest(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok(())
}
