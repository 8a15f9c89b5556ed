use research_core::{AnalysisRequest, NewsItem, Prediction, PricePoint, SocialPost};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::transform::{self, RawArticle, RawPost, RawPrediction, RawPricePoint};

pub const HISTORICAL_PATH: &str = "/api/prediction/multistep/historical";
pub const NEWS_PATH: &str = "/api/prediction/multistep/news";
pub const SOCIAL_PATH: &str = "/api/prediction/multistep/socialmedia";
pub const RESULT_PATH: &str = "/api/prediction/multistep/result";
pub const FOLLOW_UP_PATH: &str = "/api/prediction/followup";
pub const LOGOUT_PATH: &str = "/api/users/logout";

/// Every multistep endpoint nests its payload under `data`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalData {
    pub historical_prices: Vec<RawPricePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsData {
    pub articles: Vec<RawArticle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialData {
    pub posts: Vec<RawPost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpResponse {
    pub response: String,
}

/// Client for the prediction service. The bearer credential is carried by
/// the shared `reqwest::Client`'s default headers.
#[derive(Clone)]
pub struct PredictionClient {
    client: reqwest::Client,
    base_url: String,
}

impl PredictionClient {
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, request: &AnalysisRequest) -> ClientResult<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {} for {}", url, request.symbol);

        let response = self.client.post(&url).json(request).send().await?;
        let response = check_status(response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice::<T>(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Price history, oldest first.
    pub async fn historical(&self, request: &AnalysisRequest) -> ClientResult<Vec<PricePoint>> {
        let envelope: Envelope<HistoricalData> = self.post_json(HISTORICAL_PATH, request).await?;
        transform::historical_series(envelope.data.historical_prices)
    }

    pub async fn news(&self, request: &AnalysisRequest) -> ClientResult<Vec<NewsItem>> {
        let envelope: Envelope<NewsData> = self.post_json(NEWS_PATH, request).await?;
        Ok(transform::news_items(envelope.data.articles))
    }

    pub async fn social(&self, request: &AnalysisRequest) -> ClientResult<Vec<SocialPost>> {
        let envelope: Envelope<SocialData> = self.post_json(SOCIAL_PATH, request).await?;
        Ok(transform::social_posts(envelope.data.posts))
    }

    pub async fn result(&self, request: &AnalysisRequest) -> ClientResult<Prediction> {
        let envelope: Envelope<RawPrediction> = self.post_json(RESULT_PATH, request).await?;
        Ok(transform::prediction(envelope.data))
    }

    pub async fn follow_up(&self, request: &AnalysisRequest) -> ClientResult<String> {
        let reply: FollowUpResponse = self.post_json(FOLLOW_UP_PATH, request).await?;
        Ok(reply.response)
    }

    /// End the server-side session.
    pub async fn logout(&self) -> ClientResult<()> {
        let url = format!("{}{}", self.base_url, LOGOUT_PATH);
        let response = self.client.post(&url).json(&serde_json::json!({})).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turn non-success statuses into typed errors, keeping the body for context.
pub(crate) async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized(status.as_u16()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
