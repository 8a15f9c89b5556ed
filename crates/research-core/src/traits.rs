use async_trait::async_trait;
use crate::{AnalysisRequest, ChatMessage, NewsItem, Prediction, PricePoint, ResearchError, SocialPost};

/// Backend-agnostic interface to the prediction service.
///
/// Responses are already normalized into domain types when they leave an
/// implementation, so callers never see wire shapes.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Price series ordered oldest first, labelled `Mon D`.
    async fn historical_prices(&self, request: &AnalysisRequest) -> Result<Vec<PricePoint>, ResearchError>;

    async fn news(&self, request: &AnalysisRequest) -> Result<Vec<NewsItem>, ResearchError>;

    async fn social_posts(&self, request: &AnalysisRequest) -> Result<Vec<SocialPost>, ResearchError>;

    async fn prediction(&self, request: &AnalysisRequest) -> Result<Prediction, ResearchError>;

    /// Conversational reply used once a transcript already holds an exchange.
    async fn follow_up(&self, request: &AnalysisRequest) -> Result<String, ResearchError>;

    fn backend_name(&self) -> &'static str;
}

/// Persistence for the chat transcript.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Load the stored transcript, empty when nothing was saved.
    async fn load(&self) -> Result<Vec<ChatMessage>, ResearchError>;

    /// Replace the stored transcript.
    async fn save(&self, messages: &[ChatMessage]) -> Result<(), ResearchError>;

    async fn clear(&self) -> Result<(), ResearchError>;
}
