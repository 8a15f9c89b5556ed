use anyhow::{ensure, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use research_core::QueryRecord;

use crate::db::StoreDb;

#[derive(sqlx::FromRow)]
struct QueryRow {
    id: String,
    symbol: String,
    query: String,
    created_at: String,
}

impl TryFrom<QueryRow> for QueryRecord {
    type Error = anyhow::Error;

    fn try_from(row: QueryRow) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&row.created_at)
            .with_context(|| format!("Bad timestamp on history entry {}", row.id))?
            .with_timezone(&Utc);
        Ok(QueryRecord {
            id: row.id,
            timestamp,
            symbol: row.symbol,
            query: row.query,
        })
    }
}

/// Log of every submitted question.
#[derive(Clone)]
pub struct QueryHistory {
    db: StoreDb,
}

impl QueryHistory {
    pub fn new(db: StoreDb) -> Self {
        Self { db }
    }

    pub async fn record(&self, symbol: &str, query: &str) -> Result<QueryRecord> {
        let symbol = symbol.trim().to_uppercase();
        let query = query.trim();
        ensure!(!symbol.is_empty(), "Symbol must not be empty");
        ensure!(!query.is_empty(), "Query must not be empty");

        let record = QueryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            symbol,
            query: query.to_string(),
        };

        sqlx::query("INSERT INTO query_history (id, symbol, query, created_at) VALUES (?, ?, ?, ?)")
            .bind(&record.id)
            .bind(&record.symbol)
            .bind(&record.query)
            .bind(record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(self.db.pool())
            .await
            .context("Failed to record query")?;

        Ok(record)
    }

    /// Newest first.
    pub async fn list(&self, limit: i64) -> Result<Vec<QueryRecord>> {
        let rows = sqlx::query_as::<_, QueryRow>(
            "SELECT id, symbol, query, created_at FROM query_history
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .context("Failed to list query history")?;

        rows.into_iter().map(QueryRecord::try_from).collect()
    }

    /// Entry at a 1-based position of [`list`](Self::list).
    pub async fn nth(&self, position: usize) -> Result<Option<QueryRecord>> {
        if position == 0 {
            return Ok(None);
        }
        let offset = i64::try_from(position - 1).context("History position out of range")?;
        let row = sqlx::query_as::<_, QueryRow>(
            "SELECT id, symbol, query, created_at FROM query_history
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1 OFFSET ?",
        )
        .bind(offset)
        .fetch_optional(self.db.pool())
        .await
        .context("Failed to read query history")?;

        row.map(QueryRecord::try_from).transpose()
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM query_history")
            .execute(self.db.pool())
            .await
            .context("Failed to clear query history")?;
        Ok(result.rows_affected())
    }
}
