pub mod error;
pub mod market;
pub mod prediction;
pub mod provider;
pub mod transform;

pub use error::{ClientError, ClientResult};
pub use market::{CurrentPrice, Figure, MarketClient, MarketOverview, TradeAction, TransactionOutcome, TransactionRequest};
pub use prediction::PredictionClient;
pub use provider::HttpResearchProvider;

use research_core::SessionRecord;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;

/// Endpoints and timeouts for the remote services
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub market_base_url: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            market_base_url: std::env::var("MARKET_API_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5002".to_string()),
            timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            cache_ttl: Duration::from_secs(
                std::env::var("CATALOG_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

impl ClientConfig {
    /// Both services on one host, default timeouts. Handy for tests.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            api_base_url: base_url.clone(),
            market_base_url: base_url,
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Authenticated client for every remote call the dashboard makes.
///
/// The session credential is fixed at construction: building one requires a
/// `SessionRecord`, so there is no request path that can run without a token.
#[derive(Clone)]
pub struct ResearchClient {
    pub prediction: PredictionClient,
    pub market: MarketClient,
    session: SessionRecord,
}

impl ResearchClient {
    pub fn new(config: ClientConfig, session: SessionRecord) -> ClientResult<Self> {
        if session.access_token.trim().is_empty() {
            return Err(ClientError::InvalidCredential("access token is empty".to_string()));
        }

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", session.access_token))
            .map_err(|e| ClientError::InvalidCredential(e.to_string()))?;
        bearer.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::AUTHORIZATION, bearer);
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            prediction: PredictionClient::with_client(client.clone(), config.api_base_url),
            market: MarketClient::with_client(client, config.market_base_url, config.cache_ttl),
            session,
        })
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }
}
