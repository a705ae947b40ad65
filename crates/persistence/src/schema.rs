//! Database schema definitions

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Point-in-time universe uploads
CREATE TABLE IF NOT EXISTS universe_snapshots (
    snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    source TEXT NOT NULL,
    note TEXT
);

CREATE TABLE IF NOT EXISTS universe_instruments (
    snapshot_id INTEGER NOT NULL,
    instrument_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    name TEXT NOT NULL,
    asset_class TEXT NOT NULL,
    region TEXT NOT NULL,
    currency TEXT NOT NULL,
    eligible INTEGER NOT NULL,
    isin TEXT,
    min_weight REAL,
    max_weight REAL,
    notes TEXT,
    PRIMARY KEY (snapshot_id, instrument_id)
);

CREATE TABLE IF NOT EXISTS baskets (
    basket_id INTEGER PRIMARY KEY AUTOINCREMENT,
    basket_name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    universe_snapshot_id INTEGER NOT NULL,
    allow_short INTEGER NOT NULL DEFAULT 0,
    max_holdings INTEGER NOT NULL DEFAULT 50
);

-- Append-only basket history. Versions are never updated or deleted;
-- the UNIQUE index backs the per-basket monotonic numbering invariant.
CREATE TABLE IF NOT EXISTS basket_versions (
    version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    basket_id INTEGER NOT NULL,
    version_number INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    comment TEXT,
    UNIQUE (basket_id, version_number)
);

CREATE TABLE IF NOT EXISTS basket_holdings (
    version_id INTEGER NOT NULL,
    ticker TEXT NOT NULL,
    weight REAL NOT NULL,
    notes TEXT,
    PRIMARY KEY (version_id, ticker)
);

-- Upsert semantics, at most one row per basket
CREATE TABLE IF NOT EXISTS basket_constraints (
    basket_id INTEGER PRIMARY KEY,
    max_single_name REAL,
    max_asset_class REAL
);

CREATE TABLE IF NOT EXISTS audit_log (
    event_time TEXT NOT NULL,
    event_type TEXT NOT NULL,
    details TEXT
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_instruments_ticker ON universe_instruments(snapshot_id, ticker);
CREATE INDEX IF NOT EXISTS idx_versions_basket ON basket_versions(basket_id, version_number DESC);
CREATE INDEX IF NOT EXISTS idx_holdings_version ON basket_holdings(version_id)
"#;
