//! Basket Desk engine — validation, signals, analytics and reporting
//!
//! Domain logic for the basket construction and monitoring tool:
//! - universe schema and weight-constraint validation
//! - momentum/trend composite signal and reweight suggestions
//! - return/risk/concentration metrics
//! - HTML report assembly and CSV import/export
//! - Yahoo/FRED provider clients behind a TTL result cache

pub mod cache;
pub mod csv;
pub mod metrics;
pub mod providers;
pub mod report;
pub mod signals;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use cache::{cache_key, TtlCache, DEFAULT_TTL};
pub use csv::CsvTable;
pub use providers::{FredClient, MacroProvider, PriceProvider, ProviderError, YahooClient};
pub use report::{build_report_html, holdings_table_html, table_to_html};
pub use signals::{composite_signal, suggest_reweight, SignalError};
pub use types::{
    DataHealthRow, DiffRow, Holding, PricePoint, PriceTable, ReweightRow, SeriesTable, SignalScore,
    WeightBound,
};
pub use validation::{
    validate_holding_count, validate_universe_schema, validate_weights, version_diff,
    ValidationReport, REQUIRED_UNIVERSE_COLUMNS, WEIGHT_TOLERANCE,
};
