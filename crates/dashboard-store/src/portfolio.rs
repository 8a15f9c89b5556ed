use crate::db::StoreDb;
use crate::models::*;
use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;

/// Persisted list of bookmarked analyses.
#[derive(Clone)]
pub struct PortfolioBook {
    db: StoreDb,
}

const SELECT_ITEMS: &str = "SELECT symbol, name, price, initial_price, day_change, sentiment, recommendation,
            pros, cons, target_price, added_at
     FROM portfolio_items";

impl PortfolioBook {
    pub fn new(db: StoreDb) -> Self {
        Self { db }
    }

    /// Add an item, replacing any existing entry for the same symbol.
    pub async fn add(&self, item: &PortfolioItem) -> Result<()> {
        ensure!(!item.symbol.trim().is_empty(), "Symbol must not be empty");
        ensure!(item.price >= Decimal::ZERO, "Price must not be negative");

        let row = PortfolioItemRow::try_from(item)?;
        sqlx::query(
            r#"
            INSERT INTO portfolio_items
                (symbol, name, price, initial_price, day_change, sentiment, recommendation,
                 pros, cons, target_price, added_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                initial_price = excluded.initial_price,
                day_change = excluded.day_change,
                sentiment = excluded.sentiment,
                recommendation = excluded.recommendation,
                pros = excluded.pros,
                cons = excluded.cons,
                target_price = excluded.target_price,
                added_at = excluded.added_at
            "#,
        )
        .bind(&row.symbol)
        .bind(&row.name)
        .bind(&row.price)
        .bind(&row.initial_price)
        .bind(&row.day_change)
        .bind(row.sentiment)
        .bind(&row.recommendation)
        .bind(&row.pros)
        .bind(&row.cons)
        .bind(&row.target_price)
        .bind(&row.added_at)
        .execute(self.db.pool())
        .await
        .with_context(|| format!("Failed to save portfolio item {}", item.symbol))?;

        tracing::info!(symbol = %item.symbol, "Portfolio item saved");
        Ok(())
    }

    pub async fn get(&self, symbol: &str) -> Result<Option<PortfolioItem>> {
        let row = sqlx::query_as::<_, PortfolioItemRow>(&format!("{} WHERE symbol = ?", SELECT_ITEMS))
            .bind(normalize(symbol))
            .fetch_optional(self.db.pool())
            .await?;

        row.map(PortfolioItem::try_from).transpose()
    }

    /// Items in the order they were added.
    pub async fn list(&self) -> Result<Vec<PortfolioItem>> {
        let rows = sqlx::query_as::<_, PortfolioItemRow>(&format!("{} ORDER BY added_at, symbol", SELECT_ITEMS))
            .fetch_all(self.db.pool())
            .await
            .context("Failed to list portfolio")?;

        rows.into_iter().map(PortfolioItem::try_from).collect()
    }

    /// Returns whether an item was removed.
    pub async fn remove(&self, symbol: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM portfolio_items WHERE symbol = ?")
            .bind(normalize(symbol))
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a new price; the day change becomes the move from the previous one.
    pub async fn update_price(&self, symbol: &str, price: Decimal) -> Result<Option<PortfolioItem>> {
        ensure!(price >= Decimal::ZERO, "Price must not be negative");

        let Some(mut item) = self.get(symbol).await? else {
            return Ok(None);
        };
        item.day_change = price - item.price;
        item.price = price;

        sqlx::query("UPDATE portfolio_items SET price = ?, day_change = ? WHERE symbol = ?")
            .bind(item.price.to_string())
            .bind(item.day_change.to_string())
            .bind(&item.symbol)
            .execute(self.db.pool())
            .await?;

        Ok(Some(item))
    }

    pub async fn summary(&self) -> Result<PortfolioSummary> {
        let items = self.list().await?;
        Ok(PortfolioSummary::from_items(&items))
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
