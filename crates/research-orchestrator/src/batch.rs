use research_core::{ChatMessage, NewsItem, Prediction, PricePoint, SocialPost, Source, SourceState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic identifier of one fan-out submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-source loading indicators for the current batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    pub historical: SourceState,
    pub news: SourceState,
    pub social: SourceState,
    pub result: SourceState,
}

impl LoadingState {
    pub fn all(state: SourceState) -> Self {
        Self {
            historical: state,
            news: state,
            social: state,
            result: state,
        }
    }

    pub fn get(&self, source: Source) -> SourceState {
        match source {
            Source::Historical => self.historical,
            Source::News => self.news,
            Source::Social => self.social,
            Source::Result => self.result,
        }
    }

    pub fn set(&mut self, source: Source, state: SourceState) {
        let slot = match source {
            Source::Historical => &mut self.historical,
            Source::News => &mut self.news,
            Source::Social => &mut self.social,
            Source::Result => &mut self.result,
        };
        *slot = state;
    }

    pub fn any_pending(&self) -> bool {
        Source::ALL.iter().any(|s| self.get(*s).is_pending())
    }

    /// Move every pending source to `state`, leaving settled ones alone.
    pub fn settle_pending(&mut self, state: SourceState) {
        for source in Source::ALL {
            if self.get(source).is_pending() {
                self.set(source, state);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Source, SourceState)> + '_ {
        Source::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

/// Auxiliary display data filled in as sources arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panels {
    pub historical: Option<Vec<PricePoint>>,
    pub news: Option<Vec<NewsItem>>,
    pub social: Option<Vec<SocialPost>>,
    pub prediction: Option<Prediction>,
}

/// Which request pattern the next submission uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMode {
    FanOut,
    FollowUp,
}

impl ConversationMode {
    /// Follow-up once the transcript holds a finished exchange: at least two
    /// entries, one of them an assistant reply. User entries left behind by
    /// failed batches do not count.
    pub fn for_transcript(transcript: &[ChatMessage]) -> Self {
        if transcript.len() >= 2 && transcript.iter().any(ChatMessage::is_assistant) {
            ConversationMode::FollowUp
        } else {
            ConversationMode::FanOut
        }
    }
}
