use async_trait::async_trait;
use research_core::{
    AnalysisRequest, NewsItem, Prediction, PricePoint, ResearchBackend, ResearchError, SocialPost,
};

use crate::ResearchClient;

/// HTTP-backed implementation that delegates to the `PredictionClient`.
#[derive(Clone)]
pub struct HttpResearchProvider {
    client: ResearchClient,
}

impl HttpResearchProvider {
    pub fn new(client: ResearchClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResearchClient {
        &self.client
    }
}

impl From<ResearchClient> for HttpResearchProvider {
    fn from(client: ResearchClient) -> Self {
        Self::new(client)
    }
}

#[async_trait]
impl ResearchBackend for HttpResearchProvider {
    async fn historical_prices(&self, request: &AnalysisRequest) -> Result<Vec<PricePoint>, ResearchError> {
        Ok(self.client.prediction.historical(request).await?)
    }

    async fn news(&self, request: &AnalysisRequest) -> Result<Vec<NewsItem>, ResearchError> {
        Ok(self.client.prediction.news(request).await?)
    }

    async fn social_posts(&self, request: &AnalysisRequest) -> Result<Vec<SocialPost>, ResearchError> {
        Ok(self.client.prediction.social(request).await?)
    }

    async fn prediction(&self, request: &AnalysisRequest) -> Result<Prediction, ResearchError> {
        Ok(self.client.prediction.result(request).await?)
    }

    async fn follow_up(&self, request: &AnalysisRequest) -> Result<String, ResearchError> {
        Ok(self.client.prediction.follow_up(request).await?)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
