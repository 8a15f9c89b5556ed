use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use research_core::{AnalysisPayload, Company, Recommendation};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A bookmarked analysis in the portfolio tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub initial_price: Decimal,
    pub day_change: Decimal,
    pub sentiment: Option<f64>,
    pub recommendation: Recommendation,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub target_price: Option<Decimal>,
    pub added_at: DateTime<Utc>,
}

impl PortfolioItem {
    /// Bookmark `company` at `price`, carrying the analysis payload along.
    /// A payload without a recommendation is recorded as `Hold`.
    pub fn from_analysis(company: &Company, price: Decimal, payload: Option<&AnalysisPayload>) -> Self {
        let payload = payload.cloned().unwrap_or_default();
        Self {
            symbol: company.symbol.trim().to_uppercase(),
            name: company.name.clone(),
            price,
            initial_price: price,
            day_change: Decimal::ZERO,
            sentiment: payload.sentiment,
            recommendation: payload.recommendation.unwrap_or(Recommendation::Hold),
            pros: payload.pros,
            cons: payload.cons,
            target_price: payload.target_price.and_then(Decimal::from_f64),
            added_at: Utc::now(),
        }
    }

    /// Gain or loss against the price at bookmark time.
    pub fn gain(&self) -> Decimal {
        self.price - self.initial_price
    }

    pub fn change_percent(&self) -> Decimal {
        if self.initial_price.is_zero() {
            Decimal::ZERO
        } else {
            self.gain() / self.initial_price * Decimal::ONE_HUNDRED
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_items: usize,
    pub total_value: Decimal,
    pub total_gain: Decimal,
    pub gain_percent: Decimal,
}

impl PortfolioSummary {
    pub fn from_items(items: &[PortfolioItem]) -> Self {
        let total_value: Decimal = items.iter().map(|i| i.price).sum();
        let total_gain: Decimal = items.iter().map(PortfolioItem::gain).sum();
        let base = total_value - total_gain;
        let gain_percent = if base.is_zero() {
            Decimal::ZERO
        } else {
            total_gain / base * Decimal::ONE_HUNDRED
        };

        Self {
            total_items: items.len(),
            total_value,
            total_gain,
            gain_percent,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PortfolioItemRow {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub initial_price: String,
    pub day_change: String,
    pub sentiment: Option<f64>,
    pub recommendation: String,
    pub pros: String,
    pub cons: String,
    pub target_price: Option<String>,
    pub added_at: String,
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Bad {} value '{}'", field, value))
}

impl TryFrom<PortfolioItemRow> for PortfolioItem {
    type Error = anyhow::Error;

    fn try_from(row: PortfolioItemRow) -> Result<Self> {
        Ok(Self {
            price: parse_decimal("price", &row.price)?,
            initial_price: parse_decimal("initial_price", &row.initial_price)?,
            day_change: parse_decimal("day_change", &row.day_change)?,
            sentiment: row.sentiment,
            recommendation: Recommendation::parse(&row.recommendation)
                .ok_or_else(|| anyhow!("Unknown recommendation '{}'", row.recommendation))?,
            pros: serde_json::from_str(&row.pros).context("Bad pros list")?,
            cons: serde_json::from_str(&row.cons).context("Bad cons list")?,
            target_price: row
                .target_price
                .as_deref()
                .map(|v| parse_decimal("target_price", v))
                .transpose()?,
            added_at: DateTime::parse_from_rfc3339(&row.added_at)
                .context("Bad added_at timestamp")?
                .with_timezone(&Utc),
            symbol: row.symbol,
            name: row.name,
        })
    }
}

impl TryFrom<&PortfolioItem> for PortfolioItemRow {
    type Error = anyhow::Error;

    fn try_from(item: &PortfolioItem) -> Result<Self> {
        Ok(Self {
            symbol: item.symbol.clone(),
            name: item.name.clone(),
            price: item.price.to_string(),
            initial_price: item.initial_price.to_string(),
            day_change: item.day_change.to_string(),
            sentiment: item.sentiment,
            recommendation: item.recommendation.as_str().to_string(),
            pros: serde_json::to_string(&item.pros)?,
            cons: serde_json::to_string(&item.cons)?,
            target_price: item.target_price.map(|p| p.to_string()),
            added_at: item.added_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }
}
