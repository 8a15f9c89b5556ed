use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A company that can be selected as the subject of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Authenticated user record kept in the session store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub username: String,
    #[serde(alias = "accessToken")]
    pub access_token: String,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// JSON body shared by every prediction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub user_query: String,
}

impl AnalysisRequest {
    pub fn new(symbol: impl Into<String>, user_query: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            user_query: user_query.into(),
        }
    }
}

/// Logical sources fetched for one fan-out submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Historical,
    News,
    Social,
    Result,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Historical, Source::News, Source::Social, Source::Result];

    pub fn name(&self) -> &'static str {
        match self {
            Source::Historical => "historical",
            Source::News => "news",
            Source::Social => "social",
            Source::Result => "result",
        }
    }

    /// Section title shown next to the loading indicator
    pub fn title(&self) -> &'static str {
        match self {
            Source::Historical => "Historical Price Graph",
            Source::News => "News Analysis",
            Source::Social => "Social Media Sentiment",
            Source::Result => "Prediction",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Completion state of one source inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    #[default]
    Idle,
    Pending,
    Done,
    Failed,
    Cancelled,
}

impl SourceState {
    pub fn is_pending(&self) -> bool {
        matches!(self, SourceState::Pending)
    }
}

/// One point of the historical price series, labelled for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub date: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Only the sign of the score matters.
    pub fn from_score(score: f64) -> Self {
        if score > 0.0 {
            SentimentLabel::Positive
        } else if score < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub platform: String,
    pub author: String,
    pub content: String,
    pub sentiment: f64,
    pub date: String,
}

impl SocialPost {
    pub fn sentiment_label(&self) -> SentimentLabel {
        SentimentLabel::from_score(self.sentiment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
}

impl Recommendation {
    /// Map a predicted direction to a recommendation. Only an exact `Up` is a buy.
    pub fn from_direction(direction: &str) -> Self {
        if direction == "Up" {
            Recommendation::Buy
        } else {
            Recommendation::Sell
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Buy => "Buy",
            Recommendation::Sell => "Sell",
            Recommendation::Hold => "Hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Buy" => Some(Recommendation::Buy),
            "Sell" => Some(Recommendation::Sell),
            "Hold" => Some(Recommendation::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured analysis attached to an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    #[serde(default)]
    pub target_price: Option<f64>,
}

/// The `result` source after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub analysis: String,
    pub payload: AnalysisPayload,
}

/// Transformed payload of one settled source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    Historical(Vec<PricePoint>),
    News(Vec<NewsItem>),
    Social(Vec<SocialPost>),
    Result(Prediction),
}

impl SourcePayload {
    pub fn source(&self) -> Source {
        match self {
            SourcePayload::Historical(_) => Source::Historical,
            SourcePayload::News(_) => Source::News,
            SourcePayload::Social(_) => Source::Social,
            SourcePayload::Result(_) => Source::Result,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisPayload>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn assistant(content: impl Into<String>, data: Option<AnalysisPayload>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }
}

/// A past submission, listed in the chat history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub query: String,
}
