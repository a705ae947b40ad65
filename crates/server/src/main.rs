//! Basket Desk — basket construction and monitoring over free market data
//!
//! Usage:
//!   basket-desk serve --port 3001             — Launch the JSON API server
//!   basket-desk import-universe --file u.csv  — Import a universe snapshot
//!   basket-desk report --basket-id 1          — Export an HTML report

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use engine::{
    composite_signal, csv, metrics, suggest_reweight, validate_holding_count,
    validate_universe_schema, validate_weights, version_diff, CsvTable, FredClient, Holding,
    MacroProvider, PriceProvider, ValidationReport, WeightBound, YahooClient,
};
use persistence::repository::{BasketRepository, NewHolding, UniverseRepository};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOOKBACK_DAYS: u64 = 365 * 3;

#[derive(Parser)]
#[command(name = "basket-desk")]
#[command(about = "Desk-style basket construction and monitoring", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the JSON API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Import a universe CSV as a new snapshot
    ImportUniverse {
        /// Path to the universe CSV
        #[arg(long)]
        file: String,
        /// Optional snapshot note
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Export a version's holdings as CSV
    ExportVersion {
        #[arg(long)]
        version_id: i64,
        /// Output path (stdout when omitted)
        #[arg(long)]
        out: Option<String>,
    },
    /// Export an HTML report for a basket's latest version
    Report {
        #[arg(long)]
        basket_id: i64,
        /// Summary narrative for the report
        #[arg(long, default_value = "Market regime appears mixed with selective risk-on signals.")]
        summary: String,
        /// Output path
        #[arg(long, default_value = "basket_report.html")]
        out: String,
    },
}

#[derive(Clone)]
struct AppState {
    db: Arc<persistence::Database>,
    prices: Arc<YahooClient>,
    fred: Arc<FredClient>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,basket_desk=debug")
    } else {
        EnvFilter::new("info,engine=info,basket_desk=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

async fn open_db() -> anyhow::Result<persistence::Database> {
    let db_path =
        std::env::var("BASKET_DESK_DB_PATH").unwrap_or_else(|_| "data/basket_desk.db".to_string());
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database initialized: {}", db_path);
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(&host, port).await?,
        Commands::ImportUniverse { file, note } => cmd_import_universe(&file, &note).await?,
        Commands::ExportVersion { version_id, out } => cmd_export_version(version_id, out).await?,
        Commands::Report {
            basket_id,
            summary,
            out,
        } => cmd_report(basket_id, &summary, &out).await?,
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum JSON API
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Basket Desk v{} starting...", APP_VERSION);

    let db = open_db().await?;
    let state = AppState {
        db: Arc::new(db),
        prices: Arc::new(YahooClient::new()),
        fred: Arc::new(FredClient::from_env()),
    };

    if !state.fred.is_authenticated() {
        info!("FRED_API_KEY not set; macro endpoints will return empty tables");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/universe", post(api_import_universe).get(api_list_snapshots))
        .route("/universe/:id/instruments", get(api_get_instruments))
        .route("/universe/:id/export", get(api_export_universe))
        .route("/baskets", post(api_create_basket).get(api_list_baskets))
        .route(
            "/baskets/:id/versions",
            post(api_create_version).get(api_list_versions),
        )
        .route("/baskets/:id/diff", get(api_version_diff))
        .route(
            "/baskets/:id/constraints",
            put(api_save_constraints).get(api_get_constraints),
        )
        .route("/baskets/:id/signals", get(api_signals))
        .route("/baskets/:id/suggest", get(api_suggest))
        .route("/baskets/:id/apply-suggestion", post(api_apply_suggestion))
        .route("/baskets/:id/health", get(api_basket_health))
        .route("/baskets/:id/report", get(api_report))
        .route("/versions/:id/holdings", get(api_get_holdings))
        .route("/versions/:id/export", get(api_export_version))
        .route("/macro", get(api_macro_series))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

type ApiError = (StatusCode, Json<Value>);

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
}

fn unprocessable(report: ValidationReport) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": report.errors })),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

#[derive(Deserialize)]
struct DateRangeQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRangeQuery {
    /// Explicit per-request range, defaulting to the trailing three years
    fn resolve(&self) -> (NaiveDate, NaiveDate) {
        let end = self.end.unwrap_or_else(|| chrono::Utc::now().date_naive());
        let start = self
            .start
            .unwrap_or_else(|| end - chrono::Days::new(DEFAULT_LOOKBACK_DAYS));
        (start, end)
    }
}

async fn api_health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": APP_VERSION }))
}

// ---- Universe ----

#[derive(Deserialize)]
struct ImportUniverseRequest {
    csv: String,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    note: String,
}

fn default_source() -> String {
    "upload".to_string()
}

async fn api_import_universe(
    State(state): State<AppState>,
    Json(req): Json<ImportUniverseRequest>,
) -> Result<Json<Value>, ApiError> {
    let table = CsvTable::parse(&req.csv).map_err(bad_request)?;
    let report = validate_universe_schema(&table);
    if !report.ok() {
        return Err(unprocessable(report));
    }
    let instruments = csv::parse_universe(&table).map_err(bad_request)?;

    // Sampled liveness check against the price source, advisory only
    let sample_ticker_ok = match instruments.first() {
        Some(inst) => {
            let ok = state.prices.quick_ticker_check(&inst.ticker).await;
            if !ok {
                warn!(ticker = %inst.ticker, "sample ticker has no recent price data");
            }
            Some(ok)
        }
        None => None,
    };

    let snapshot_id = UniverseRepository::new(state.db.pool())
        .create_snapshot(&instruments, &req.source, &req.note)
        .await
        .map_err(internal)?;
    Ok(Json(json!({
        "snapshot_id": snapshot_id,
        "sample_ticker_ok": sample_ticker_ok,
    })))
}

async fn api_list_snapshots(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshots = UniverseRepository::new(state.db.pool())
        .list_snapshots()
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "snapshots": snapshots })))
}

async fn api_get_instruments(
    State(state): State<AppState>,
    Path(snapshot_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let instruments = UniverseRepository::new(state.db.pool())
        .get_instruments(snapshot_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "instruments": instruments })))
}

async fn api_export_universe(
    State(state): State<AppState>,
    Path(snapshot_id): Path<i64>,
) -> Result<String, ApiError> {
    let instruments = UniverseRepository::new(state.db.pool())
        .get_instruments(snapshot_id)
        .await
        .map_err(internal)?;
    Ok(csv::universe_to_csv(&instruments))
}

// ---- Baskets and versions ----

#[derive(Deserialize)]
struct CreateBasketRequest {
    name: String,
    #[serde(default)]
    description: String,
    universe_snapshot_id: i64,
    #[serde(default)]
    allow_short: bool,
    #[serde(default = "default_max_holdings")]
    max_holdings: i64,
}

fn default_max_holdings() -> i64 {
    50
}

async fn api_create_basket(
    State(state): State<AppState>,
    Json(req): Json<CreateBasketRequest>,
) -> Result<Json<Value>, ApiError> {
    let basket_id = BasketRepository::new(state.db.pool())
        .create_basket(
            &req.name,
            &req.description,
            req.universe_snapshot_id,
            req.allow_short,
            req.max_holdings,
        )
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "basket_id": basket_id })))
}

async fn api_list_baskets(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let baskets = BasketRepository::new(state.db.pool())
        .list_baskets()
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "baskets": baskets })))
}

#[derive(Deserialize)]
struct CreateVersionRequest {
    holdings: Vec<Holding>,
    #[serde(default)]
    comment: String,
    /// Imports may bypass the weight-sum tolerance check
    #[serde(default)]
    skip_validation: bool,
}

/// Bounds for the basket's universe, for per-ticker min/max validation
async fn load_bounds(state: &AppState, snapshot_id: i64) -> Result<Vec<WeightBound>, ApiError> {
    let instruments = UniverseRepository::new(state.db.pool())
        .get_instruments(snapshot_id)
        .await
        .map_err(internal)?;
    Ok(instruments
        .iter()
        .map(|i| WeightBound {
            ticker: i.ticker.clone(),
            min_weight: i.min_weight,
            max_weight: i.max_weight,
        })
        .collect())
}

async fn api_create_version(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Json(req): Json<CreateVersionRequest>,
) -> Result<Json<Value>, ApiError> {
    let baskets = BasketRepository::new(state.db.pool());
    let basket = baskets
        .get_basket(basket_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("basket"))?;

    if !req.skip_validation {
        let bounds = load_bounds(&state, basket.universe_snapshot_id).await?;
        let mut report = validate_weights(&req.holdings, basket.allow_short != 0, Some(&bounds));
        report.merge(validate_holding_count(req.holdings.len(), basket.max_holdings));
        if !report.ok() {
            return Err(unprocessable(report));
        }
    }

    let rows: Vec<NewHolding> = req
        .holdings
        .iter()
        .map(|h| NewHolding {
            ticker: h.ticker.clone(),
            weight: h.weight,
            notes: h.notes.clone(),
        })
        .collect();
    let version_id = baskets
        .create_version(basket_id, &rows, &req.comment)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "version_id": version_id })))
}

async fn api_list_versions(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let versions = BasketRepository::new(state.db.pool())
        .list_versions(basket_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "versions": versions })))
}

async fn api_get_holdings(
    State(state): State<AppState>,
    Path(version_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let holdings = BasketRepository::new(state.db.pool())
        .get_holdings(version_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "holdings": holdings })))
}

async fn api_export_version(
    State(state): State<AppState>,
    Path(version_id): Path<i64>,
) -> Result<String, ApiError> {
    let holdings = BasketRepository::new(state.db.pool())
        .get_holdings(version_id)
        .await
        .map_err(internal)?;
    Ok(csv::holdings_to_csv(&holdings))
}

#[derive(Deserialize)]
struct DiffQuery {
    from: i64,
    to: i64,
}

async fn api_version_diff(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Query(q): Query<DiffQuery>,
) -> Result<Json<Value>, ApiError> {
    let repo = BasketRepository::new(state.db.pool());
    // Both versions must belong to the basket in the URL
    let from = repo
        .get_basket_version(basket_id, q.from)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("basket version"))?;
    let to = repo
        .get_basket_version(basket_id, q.to)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("basket version"))?;

    let old: Vec<Holding> = repo
        .get_holdings(from.version_id)
        .await
        .map_err(internal)?
        .iter()
        .map(Holding::from)
        .collect();
    let new: Vec<Holding> = repo
        .get_holdings(to.version_id)
        .await
        .map_err(internal)?
        .iter()
        .map(Holding::from)
        .collect();
    Ok(Json(json!({ "diff": version_diff(&old, &new) })))
}

// ---- Constraints ----

#[derive(Deserialize)]
struct SaveConstraintsRequest {
    max_single_name: Option<f64>,
    max_asset_class: Option<f64>,
}

async fn api_save_constraints(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Json(req): Json<SaveConstraintsRequest>,
) -> Result<Json<Value>, ApiError> {
    BasketRepository::new(state.db.pool())
        .save_constraints(basket_id, req.max_single_name, req.max_asset_class)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "saved": true })))
}

async fn api_get_constraints(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let constraints = BasketRepository::new(state.db.pool())
        .get_constraints(basket_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "constraints": constraints })))
}

// ---- Signals, suggestions, analytics ----

/// Latest-version holdings of a basket, as engine types
async fn latest_holdings(state: &AppState, basket_id: i64) -> Result<Vec<Holding>, ApiError> {
    let repo = BasketRepository::new(state.db.pool());
    let version = repo
        .latest_version(basket_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("basket version"))?;
    let holdings = repo
        .get_holdings(version.version_id)
        .await
        .map_err(internal)?;
    Ok(holdings.iter().map(Holding::from).collect())
}

async fn fetch_holding_prices(
    state: &AppState,
    holdings: &[Holding],
    range: &DateRangeQuery,
) -> Result<engine::PriceTable, ApiError> {
    let tickers: Vec<String> = holdings.iter().map(|h| h.ticker.clone()).collect();
    let (start, end) = range.resolve();
    state
        .prices
        .fetch_prices(&tickers, start, end)
        .await
        .map_err(|e| bad_request(e.to_string()))
}

async fn api_signals(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let holdings = latest_holdings(&state, basket_id).await?;
    let prices = fetch_holding_prices(&state, &holdings, &range).await?;
    Ok(Json(json!({ "scores": composite_signal(&prices) })))
}

async fn api_suggest(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let holdings = latest_holdings(&state, basket_id).await?;
    let prices = fetch_holding_prices(&state, &holdings, &range).await?;
    let scores = composite_signal(&prices);
    let suggestion = suggest_reweight(&holdings, &scores).map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(json!({ "suggestion": suggestion })))
}

async fn api_apply_suggestion(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let holdings = latest_holdings(&state, basket_id).await?;
    let prices = fetch_holding_prices(&state, &holdings, &range).await?;
    let scores = composite_signal(&prices);
    let suggestion = suggest_reweight(&holdings, &scores).map_err(|e| bad_request(e.to_string()))?;

    let rows: Vec<NewHolding> = suggestion
        .iter()
        .map(|r| NewHolding {
            ticker: r.ticker.clone(),
            weight: r.new_weight,
            notes: Some("suggested".to_string()),
        })
        .collect();
    let version_id = BasketRepository::new(state.db.pool())
        .create_version(basket_id, &rows, "signal suggestion")
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "version_id": version_id })))
}

async fn api_basket_health(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let holdings = latest_holdings(&state, basket_id).await?;
    let prices = fetch_holding_prices(&state, &holdings, &range).await?;

    let weights: Vec<f64> = holdings.iter().map(|h| h.weight).collect();
    let basket_rets: Vec<f64> = metrics::basket_returns(&prices, &holdings)
        .into_iter()
        .map(|(_, r)| r)
        .collect();

    Ok(Json(json!({
        "data_health": metrics::data_health(&prices),
        "hhi": metrics::hhi(&weights),
        "top5_weight": metrics::top5_weight(&weights),
        "max_drawdown": metrics::max_drawdown(&basket_rets),
    })))
}

async fn api_macro_series(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let (start, end) = range.resolve();
    let table = state
        .fred
        .fetch_series(&engine::providers::fred::default_series(), start, end)
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(json!({ "series": table })))
}

// ---- Report ----

async fn api_report(
    State(state): State<AppState>,
    Path(basket_id): Path<i64>,
) -> Result<Html<String>, ApiError> {
    let html = render_report(
        &state,
        basket_id,
        "Market regime appears mixed with selective risk-on signals.",
    )
    .await?;
    Ok(Html(html))
}

async fn render_report(
    state: &AppState,
    basket_id: i64,
    summary: &str,
) -> Result<String, ApiError> {
    let repo = BasketRepository::new(state.db.pool());
    let version = repo
        .latest_version(basket_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("basket version"))?;
    let holdings = latest_holdings(state, basket_id).await?;

    let sections = vec![
        ("Summary".to_string(), summary.to_string()),
        (
            "Basket Overview".to_string(),
            format!(
                "Basket ID: {basket_id}<br/>Current Version: {}",
                version.version_number
            ),
        ),
        (
            "Holdings".to_string(),
            engine::holdings_table_html(&holdings),
        ),
    ];
    Ok(engine::build_report_html(&sections))
}

// ============================================================================
// One-shot CLI commands
// ============================================================================

async fn cmd_import_universe(file: &str, note: &str) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let table = CsvTable::parse(&text).map_err(|e| anyhow::anyhow!(e))?;

    let report = validate_universe_schema(&table);
    if !report.ok() {
        for err in &report.errors {
            error!("{err}");
        }
        anyhow::bail!("universe CSV failed validation");
    }

    let instruments = csv::parse_universe(&table).map_err(|e| anyhow::anyhow!(e))?;
    let db = open_db().await?;
    let snapshot_id = UniverseRepository::new(db.pool())
        .create_snapshot(&instruments, "upload", note)
        .await?;
    info!(
        "Created universe snapshot {} with {} instruments",
        snapshot_id,
        instruments.len()
    );
    Ok(())
}

async fn cmd_export_version(version_id: i64, out: Option<String>) -> anyhow::Result<()> {
    let db = open_db().await?;
    let holdings = BasketRepository::new(db.pool()).get_holdings(version_id).await?;
    if holdings.is_empty() {
        anyhow::bail!("version {version_id} has no holdings");
    }
    let csv_text = csv::holdings_to_csv(&holdings);
    match out {
        Some(path) => {
            std::fs::write(&path, csv_text)?;
            info!("Wrote {} holdings to {}", holdings.len(), path);
        }
        None => print!("{csv_text}"),
    }
    Ok(())
}

async fn cmd_report(basket_id: i64, summary: &str, out: &str) -> anyhow::Result<()> {
    let db = open_db().await?;
    let state = AppState {
        db: Arc::new(db),
        prices: Arc::new(YahooClient::new()),
        fred: Arc::new(FredClient::from_env()),
    };
    let html = render_report(&state, basket_id, summary)
        .await
        .map_err(|(status, body)| anyhow::anyhow!("report failed ({status}): {}", body.0))?;
    std::fs::write(out, html)?;
    info!("Wrote report to {}", out);
    Ok(())
}
