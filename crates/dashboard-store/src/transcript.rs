use async_trait::async_trait;
use research_core::{ChatMessage, ResearchError, TranscriptStore};

use crate::kv::KvStore;

pub const TRANSCRIPT_KEY: &str = "chat_messages";

/// Chat transcript persisted as one JSON array under [`TRANSCRIPT_KEY`].
#[derive(Clone)]
pub struct SqliteTranscriptStore {
    kv: KvStore,
}

impl SqliteTranscriptStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }
}

fn storage(e: anyhow::Error) -> ResearchError {
    ResearchError::Storage(format!("{:#}", e))
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    async fn load(&self) -> Result<Vec<ChatMessage>, ResearchError> {
        let messages = self
            .kv
            .load_json::<Vec<ChatMessage>>(TRANSCRIPT_KEY)
            .await
            .map_err(storage)?;
        Ok(messages.unwrap_or_default())
    }

    async fn save(&self, messages: &[ChatMessage]) -> Result<(), ResearchError> {
        self.kv.save_json(TRANSCRIPT_KEY, messages).await.map_err(storage)
    }

    async fn clear(&self) -> Result<(), ResearchError> {
        self.kv.remove(TRANSCRIPT_KEY).await.map_err(storage)?;
        Ok(())
    }
}
