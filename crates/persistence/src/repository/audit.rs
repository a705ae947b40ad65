//! Append-only audit log — records snapshot/basket/version creation events.
//!
//! Write-only from the application's point of view; nothing in the core
//! logic reads it back.

use crate::DbResult;
use chrono::Utc;
use sqlx::SqlitePool;

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event. Failures are reported but never block the operation
    /// that triggered the event.
    pub async fn append(&self, event_type: &str, details: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO audit_log(event_time, event_type, details) VALUES (?, ?, ?)")
            .bind(Utc::now().to_rfc3339())
            .bind(event_type)
            .bind(details)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log")
            .fetch_one(self.pool)
            .await?;
        Ok(row.0)
    }
}
