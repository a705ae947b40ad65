//! Baskets repository — basket headers, the append-only version ledger,
//! holdings and per-basket concentration constraints.
//!
//! Versions are immutable: correcting a mistake means creating a new version
//! with the next version_number. The "read max, add one" step and the inserts
//! run inside a single write transaction so two concurrent callers can never
//! observe the same number; the UNIQUE(basket_id, version_number) index is the
//! backstop.

use crate::repository::AuditRepository;
use crate::{DbError, DbResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BasketRecord {
    pub basket_id: i64,
    pub basket_name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub universe_snapshot_id: i64,
    pub allow_short: i64,
    pub max_holdings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VersionRecord {
    pub version_id: i64,
    pub basket_id: i64,
    pub version_number: i64,
    pub created_at: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HoldingRecord {
    pub version_id: i64,
    pub ticker: String,
    pub weight: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConstraintRecord {
    pub basket_id: i64,
    pub max_single_name: Option<f64>,
    pub max_asset_class: Option<f64>,
}

/// Holding row as supplied by a caller, before a version id exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHolding {
    pub ticker: String,
    pub weight: f64,
    pub notes: Option<String>,
}

/// Repository for baskets, versions, holdings and constraints
pub struct BasketRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BasketRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_basket(
        &self,
        name: &str,
        description: &str,
        universe_snapshot_id: i64,
        allow_short: bool,
        max_holdings: i64,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO baskets(basket_name, description, created_at,
                                universe_snapshot_id, allow_short, max_holdings)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .bind(universe_snapshot_id)
        .bind(allow_short as i64)
        .bind(max_holdings)
        .execute(self.pool)
        .await?;
        let basket_id = result.last_insert_rowid();

        if let Err(e) = AuditRepository::new(self.pool)
            .append("basket_created", &format!("basket_id={basket_id}"))
            .await
        {
            warn!(error = %e, "audit log write failed");
        }

        Ok(basket_id)
    }

    pub async fn list_baskets(&self) -> DbResult<Vec<BasketRecord>> {
        let records = sqlx::query_as::<_, BasketRecord>(
            r#"
            SELECT basket_id, basket_name, description, created_at,
                   universe_snapshot_id, allow_short, max_holdings
            FROM baskets
            ORDER BY basket_id DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    pub async fn get_basket(&self, basket_id: i64) -> DbResult<Option<BasketRecord>> {
        let record = sqlx::query_as::<_, BasketRecord>(
            r#"
            SELECT basket_id, basket_name, description, created_at,
                   universe_snapshot_id, allow_short, max_holdings
            FROM baskets
            WHERE basket_id = ?
            "#,
        )
        .bind(basket_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    /// Create the next version of a basket together with all its holdings.
    ///
    /// Atomic: either the version row and every holding row persist, or
    /// nothing does. A version without holdings is an integrity violation,
    /// so empty input is rejected before the transaction starts.
    pub async fn create_version(
        &self,
        basket_id: i64,
        holdings: &[NewHolding],
        comment: &str,
    ) -> DbResult<i64> {
        if holdings.is_empty() {
            return Err(DbError::Integrity(format!(
                "refusing to create a version of basket {basket_id} with no holdings"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let (version_number,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM basket_versions WHERE basket_id = ?",
        )
        .bind(basket_id)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            "INSERT INTO basket_versions(basket_id, version_number, created_at, comment) VALUES (?, ?, ?, ?)",
        )
        .bind(basket_id)
        .bind(version_number)
        .bind(Utc::now().to_rfc3339())
        .bind(comment)
        .execute(&mut *tx)
        .await?;
        let version_id = result.last_insert_rowid();

        for h in holdings {
            sqlx::query(
                "INSERT INTO basket_holdings(version_id, ticker, weight, notes) VALUES (?, ?, ?, ?)",
            )
            .bind(version_id)
            .bind(&h.ticker)
            .bind(h.weight)
            .bind(&h.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if let Err(e) = AuditRepository::new(self.pool)
            .append(
                "basket_version_created",
                &format!("basket_id={basket_id},version_id={version_id}"),
            )
            .await
        {
            warn!(error = %e, "audit log write failed");
        }

        Ok(version_id)
    }

    /// List versions of a basket, newest version_number first
    pub async fn list_versions(&self, basket_id: i64) -> DbResult<Vec<VersionRecord>> {
        let records = sqlx::query_as::<_, VersionRecord>(
            r#"
            SELECT version_id, basket_id, version_number, created_at, comment
            FROM basket_versions
            WHERE basket_id = ?
            ORDER BY version_number DESC
            "#,
        )
        .bind(basket_id)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// The most recent version of a basket, if any
    pub async fn latest_version(&self, basket_id: i64) -> DbResult<Option<VersionRecord>> {
        let record = sqlx::query_as::<_, VersionRecord>(
            r#"
            SELECT version_id, basket_id, version_number, created_at, comment
            FROM basket_versions
            WHERE basket_id = ?
            ORDER BY version_number DESC
            LIMIT 1
            "#,
        )
        .bind(basket_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get_version(&self, version_id: i64) -> DbResult<Option<VersionRecord>> {
        let record = sqlx::query_as::<_, VersionRecord>(
            r#"
            SELECT version_id, basket_id, version_number, created_at, comment
            FROM basket_versions
            WHERE version_id = ?
            "#,
        )
        .bind(version_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    /// A version only when it belongs to the given basket; None otherwise
    pub async fn get_basket_version(
        &self,
        basket_id: i64,
        version_id: i64,
    ) -> DbResult<Option<VersionRecord>> {
        let record = sqlx::query_as::<_, VersionRecord>(
            r#"
            SELECT version_id, basket_id, version_number, created_at, comment
            FROM basket_versions
            WHERE version_id = ? AND basket_id = ?
            "#,
        )
        .bind(version_id)
        .bind(basket_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    /// Holdings of a version, largest weight first
    pub async fn get_holdings(&self, version_id: i64) -> DbResult<Vec<HoldingRecord>> {
        let records = sqlx::query_as::<_, HoldingRecord>(
            r#"
            SELECT version_id, ticker, weight, notes
            FROM basket_holdings
            WHERE version_id = ?
            ORDER BY weight DESC
            "#,
        )
        .bind(version_id)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Save concentration limits for a basket (last write wins)
    pub async fn save_constraints(
        &self,
        basket_id: i64,
        max_single_name: Option<f64>,
        max_asset_class: Option<f64>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO basket_constraints(basket_id, max_single_name, max_asset_class)
            VALUES (?, ?, ?)
            ON CONFLICT(basket_id) DO UPDATE SET
                max_single_name = excluded.max_single_name,
                max_asset_class = excluded.max_asset_class
            "#,
        )
        .bind(basket_id)
        .bind(max_single_name)
        .bind(max_asset_class)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_constraints(&self, basket_id: i64) -> DbResult<Option<ConstraintRecord>> {
        let record = sqlx::query_as::<_, ConstraintRecord>(
            "SELECT basket_id, max_single_name, max_asset_class FROM basket_constraints WHERE basket_id = ?",
        )
        .bind(basket_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn holding(ticker: &str, weight: f64) -> NewHolding {
        NewHolding {
            ticker: ticker.to_string(),
            weight,
            notes: None,
        }
    }

    async fn basket_fixture(db: &Database) -> i64 {
        BasketRepository::new(db.pool())
            .create_basket("Core Macro", "cross-asset core", 1, false, 50)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_version_numbers_are_sequential() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let bid = basket_fixture(&db).await;

        repo.create_version(bid, &[holding("SPY", 100.0)], "")
            .await
            .unwrap();
        repo.create_version(bid, &[holding("SPY", 60.0), holding("AGG", 40.0)], "rebalance")
            .await
            .unwrap();

        let versions = repo.list_versions(bid).await.unwrap();
        assert_eq!(versions.len(), 2);
        // Newest first
        assert_eq!(versions[0].version_number, 2);
        assert_eq!(versions[1].version_number, 1);
        assert_eq!(versions[0].comment.as_deref(), Some("rebalance"));
    }

    #[tokio::test]
    async fn test_version_numbering_is_per_basket() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let a = basket_fixture(&db).await;
        let b = basket_fixture(&db).await;

        repo.create_version(a, &[holding("SPY", 100.0)], "").await.unwrap();
        let vid = repo.create_version(b, &[holding("GLD", 100.0)], "").await.unwrap();

        let v = repo.get_version(vid).await.unwrap().unwrap();
        assert_eq!(v.version_number, 1);
    }

    #[tokio::test]
    async fn test_empty_holdings_rejected_without_partial_write() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let bid = basket_fixture(&db).await;

        let err = repo.create_version(bid, &[], "oops").await.unwrap_err();
        assert!(matches!(err, DbError::Integrity(_)));

        // No header row may survive a rejected creation
        assert!(repo.list_versions(bid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_basket_version_lookup_is_scoped_to_the_basket() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let a = basket_fixture(&db).await;
        let b = basket_fixture(&db).await;

        let vid = repo.create_version(b, &[holding("GLD", 100.0)], "").await.unwrap();

        assert!(repo.get_basket_version(b, vid).await.unwrap().is_some());
        // The same version id under another basket must not resolve
        assert!(repo.get_basket_version(a, vid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_holdings_sorted_by_weight_desc() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let bid = basket_fixture(&db).await;

        let vid = repo
            .create_version(
                bid,
                &[holding("AGG", 30.0), holding("SPY", 55.0), holding("GLD", 15.0)],
                "",
            )
            .await
            .unwrap();

        let h = repo.get_holdings(vid).await.unwrap();
        let tickers: Vec<&str> = h.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["SPY", "AGG", "GLD"]);
    }

    #[tokio::test]
    async fn test_constraints_upsert_last_write_wins() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let bid = basket_fixture(&db).await;

        repo.save_constraints(bid, Some(25.0), Some(60.0)).await.unwrap();
        repo.save_constraints(bid, Some(20.0), Some(50.0)).await.unwrap();

        let c = repo.get_constraints(bid).await.unwrap().unwrap();
        assert_eq!(c.max_single_name, Some(20.0));
        assert_eq!(c.max_asset_class, Some(50.0));
    }

    #[tokio::test]
    async fn test_version_creation_writes_audit_event() {
        let db = Database::in_memory().await.unwrap();
        let repo = BasketRepository::new(db.pool());
        let bid = basket_fixture(&db).await;
        repo.create_version(bid, &[holding("SPY", 100.0)], "").await.unwrap();

        // basket_created + basket_version_created
        let audit = AuditRepository::new(db.pool());
        assert_eq!(audit.count().await.unwrap(), 2);
    }
}
