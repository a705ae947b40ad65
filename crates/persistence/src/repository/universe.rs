//! Universe snapshots repository — immutable point-in-time instrument lists

use crate::repository::AuditRepository;
use crate::DbResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::warn;

/// A stored universe snapshot header
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotRecord {
    pub snapshot_id: i64,
    pub created_at: String,
    pub source: String,
    pub note: Option<String>,
}

/// A stored instrument row within a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstrumentRecord {
    pub snapshot_id: i64,
    pub instrument_id: String,
    pub ticker: String,
    pub name: String,
    pub asset_class: String,
    pub region: String,
    pub currency: String,
    pub eligible: i64,
    pub isin: Option<String>,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub notes: Option<String>,
}

/// Instrument row as supplied by an upload, before a snapshot id exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstrument {
    pub instrument_id: String,
    pub ticker: String,
    pub name: String,
    pub asset_class: String,
    pub region: String,
    pub currency: String,
    pub eligible: bool,
    pub isin: Option<String>,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub notes: Option<String>,
}

/// Repository for universe snapshots and their instruments
pub struct UniverseRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UniverseRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a snapshot and its instrument rows in one transaction.
    /// Snapshots are never mutated or deleted afterwards.
    pub async fn create_snapshot(
        &self,
        instruments: &[NewInstrument],
        source: &str,
        note: &str,
    ) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("INSERT INTO universe_snapshots(created_at, source, note) VALUES (?, ?, ?)")
                .bind(Utc::now().to_rfc3339())
                .bind(source)
                .bind(note)
                .execute(&mut *tx)
                .await?;
        let snapshot_id = result.last_insert_rowid();

        for inst in instruments {
            sqlx::query(
                r#"
                INSERT INTO universe_instruments (
                    snapshot_id, instrument_id, ticker, name, asset_class,
                    region, currency, eligible, isin, min_weight, max_weight, notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(snapshot_id)
            .bind(&inst.instrument_id)
            .bind(&inst.ticker)
            .bind(&inst.name)
            .bind(&inst.asset_class)
            .bind(&inst.region)
            .bind(&inst.currency)
            .bind(inst.eligible as i64)
            .bind(&inst.isin)
            .bind(inst.min_weight)
            .bind(inst.max_weight)
            .bind(&inst.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if let Err(e) = AuditRepository::new(self.pool)
            .append("universe_snapshot_created", &format!("snapshot_id={snapshot_id}"))
            .await
        {
            warn!(error = %e, "audit log write failed");
        }

        Ok(snapshot_id)
    }

    /// List snapshots, newest first
    pub async fn list_snapshots(&self) -> DbResult<Vec<SnapshotRecord>> {
        let records = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT snapshot_id, created_at, source, note FROM universe_snapshots ORDER BY snapshot_id DESC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// All instruments of a snapshot, ordered by ticker
    pub async fn get_instruments(&self, snapshot_id: i64) -> DbResult<Vec<InstrumentRecord>> {
        let records = sqlx::query_as::<_, InstrumentRecord>(
            r#"
            SELECT snapshot_id, instrument_id, ticker, name, asset_class,
                   region, currency, eligible, isin, min_weight, max_weight, notes
            FROM universe_instruments
            WHERE snapshot_id = ?
            ORDER BY ticker
            "#,
        )
        .bind(snapshot_id)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn inst(id: &str, ticker: &str) -> NewInstrument {
        NewInstrument {
            instrument_id: id.to_string(),
            ticker: ticker.to_string(),
            name: format!("{ticker} name"),
            asset_class: "Equity".to_string(),
            region: "US".to_string(),
            currency: "USD".to_string(),
            eligible: true,
            isin: None,
            min_weight: None,
            max_weight: Some(30.0),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let repo = UniverseRepository::new(db.pool());

        let sid = repo
            .create_snapshot(&[inst("a", "SPY"), inst("b", "AGG")], "upload", "first load")
            .await
            .unwrap();
        assert_eq!(sid, 1);

        let snaps = repo.list_snapshots().await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].source, "upload");

        let rows = repo.get_instruments(sid).await.unwrap();
        assert_eq!(rows.len(), 2);
        // Ordered by ticker
        assert_eq!(rows[0].ticker, "AGG");
        assert_eq!(rows[1].ticker, "SPY");
        assert_eq!(rows[1].eligible, 1);
        assert_eq!(rows[1].max_weight, Some(30.0));
    }

    #[tokio::test]
    async fn test_snapshot_writes_audit_event() {
        let db = Database::in_memory().await.unwrap();
        let repo = UniverseRepository::new(db.pool());
        repo.create_snapshot(&[inst("a", "SPY")], "demo_csv", "")
            .await
            .unwrap();

        let audit = AuditRepository::new(db.pool());
        assert_eq!(audit.count().await.unwrap(), 1);
    }
}
