use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use dashmap::DashMap;
use research_core::Company;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ClientError, ClientResult};
use crate::prediction::check_status;

pub const TRANSACTION_RECORDED: &str = "Transaction recorded successfully";
pub const INSUFFICIENT_SHARES: &str = "Not enough shares to sell";

/// Key under which the single company list is cached
const CATALOG_KEY: &str = "all";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCompany {
    pub ticker_symbol: String,
    pub company_name: String,
    #[serde(default)]
    pub company_description: Option<String>,
}

impl From<RawCompany> for Company {
    fn from(raw: RawCompany) -> Self {
        Company {
            symbol: raw.ticker_symbol,
            name: raw.company_name,
            description: raw.company_description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPrice {
    pub ticker: String,
    #[serde(rename = "currentPrice", with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
}

/// A statistic the market service sends either as a number or preformatted text (`"2.97T"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Figure {
    Number(f64),
    Text(String),
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Figure::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Figure::Number(n) => write!(f, "{:.2}", n),
            Figure::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub ticker: String,
    #[serde(rename = "marketCap", default)]
    pub market_cap: Option<Figure>,
    #[serde(default)]
    pub volume: Option<Figure>,
    #[serde(rename = "avgVolume", default)]
    pub avg_volume: Option<Figure>,
    #[serde(default)]
    pub beta: Option<Figure>,
    #[serde(rename = "dividendYield", default)]
    pub dividend_yield: Option<Figure>,
    #[serde(rename = "peRatio", default)]
    pub pe_ratio: Option<Figure>,
    #[serde(rename = "52wHigh", default)]
    pub high_52w: Option<Figure>,
    #[serde(rename = "52wLow", default)]
    pub low_52w: Option<Figure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRequest {
    pub ticker: String,
    pub trade_qty: u32,
    pub action: TradeAction,
    #[serde(with = "rust_decimal::serde::float")]
    pub action_price: Decimal,
    /// Second precision, no offset: `2024-05-14T20:10:12`
    pub timestamp: String,
}

impl TransactionRequest {
    pub fn new(ticker: &str, trade_qty: u32, action: TradeAction, action_price: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.to_string(),
            trade_qty,
            action,
            action_price,
            timestamp: format_trade_timestamp(at.naive_utc()),
        }
    }
}

fn format_trade_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TransactionResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    Recorded,
    InsufficientShares,
    Rejected(String),
}

/// Internal cache entry with timestamp
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

/// Client for the market-data service: company catalog, quotes, overviews, trades.
#[derive(Clone)]
pub struct MarketClient {
    client: reqwest::Client,
    base_url: String,
    cache_ttl: Duration,
    catalog_cache: std::sync::Arc<DashMap<String, CacheEntry<Vec<Company>>>>,
    overview_cache: std::sync::Arc<DashMap<String, CacheEntry<MarketOverview>>>,
}

impl MarketClient {
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, cache_ttl: std::time::Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            cache_ttl: Duration::from_std(cache_ttl).unwrap_or_else(|_| Duration::seconds(300)),
            catalog_cache: Default::default(),
            overview_cache: Default::default(),
        }
    }

    fn is_fresh(&self, cached_at: DateTime<Utc>) -> bool {
        Utc::now() - cached_at < self.cache_ttl
    }

    /// Companies available for analysis, cached for the configured TTL.
    pub async fn companies(&self) -> ClientResult<Vec<Company>> {
        if let Some(entry) = self.catalog_cache.get(CATALOG_KEY) {
            if self.is_fresh(entry.cached_at) {
                return Ok(entry.data.clone());
            }
        }

        let url = format!("{}/companies", self.base_url);
        let response = check_status(self.client.get(&url).send().await?).await?;
        let raw: Vec<RawCompany> = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("companies: {}", e)))?;

        let companies: Vec<Company> = raw.into_iter().map(Company::from).collect();
        tracing::info!("Loaded {} companies from catalog", companies.len());

        self.catalog_cache.insert(
            CATALOG_KEY.to_string(),
            CacheEntry {
                data: companies.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(companies)
    }

    pub async fn current_price(&self, ticker: &str) -> ClientResult<CurrentPrice> {
        let ticker = normalize_ticker(ticker)?;
        let url = format!("{}/current-price", self.base_url);
        let response = check_status(
            self.client
                .get(&url)
                .query(&[("ticker", ticker.as_str())])
                .send()
                .await?,
        )
        .await?;

        response
            .json::<CurrentPrice>()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("current-price: {}", e)))
    }

    pub async fn market_overview(&self, ticker: &str) -> ClientResult<MarketOverview> {
        let ticker = normalize_ticker(ticker)?;
        if let Some(entry) = self.overview_cache.get(&ticker) {
            if self.is_fresh(entry.cached_at) {
                return Ok(entry.data.clone());
            }
        }

        let url = format!("{}/market-overview", self.base_url);
        let response = check_status(
            self.client
                .get(&url)
                .query(&[("ticker", ticker.as_str())])
                .send()
                .await?,
        )
        .await?;
        let overview = response
            .json::<MarketOverview>()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("market-overview: {}", e)))?;

        self.overview_cache.insert(
            ticker,
            CacheEntry {
                data: overview.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(overview)
    }

    /// Record a buy or sell. Business rejections come back as `Ok`, not `Err`.
    pub async fn execute_transaction(&self, request: &TransactionRequest) -> ClientResult<TransactionOutcome> {
        if request.trade_qty == 0 {
            return Err(ClientError::InvalidArgument("quantity must be at least 1".to_string()));
        }
        normalize_ticker(&request.ticker)?;

        let url = format!("{}/transaction", self.base_url);
        tracing::info!(
            "Submitting {:?} {} x{} @ {}",
            request.action,
            request.ticker,
            request.trade_qty,
            request.action_price
        );

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: TransactionResponse = serde_json::from_str(&body).unwrap_or_default();
        Ok(classify_transaction(parsed, status.is_success(), &body))
    }
}

fn classify_transaction(response: TransactionResponse, success: bool, body: &str) -> TransactionOutcome {
    if response.message.as_deref() == Some(TRANSACTION_RECORDED) {
        return TransactionOutcome::Recorded;
    }
    if response.error.as_deref() == Some(INSUFFICIENT_SHARES) {
        return TransactionOutcome::InsufficientShares;
    }
    let reason = response
        .error
        .or(response.message)
        .unwrap_or_else(|| if success { "unexpected reply".to_string() } else { body.to_string() });
    TransactionOutcome::Rejected(reason)
}

fn normalize_ticker(ticker: &str) -> ClientResult<String> {
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ClientError::InvalidArgument("ticker must not be empty".to_string()));
    }
    Ok(ticker)
}
