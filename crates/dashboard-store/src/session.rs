use anyhow::{ensure, Result};
use research_core::{ResearchError, SessionRecord};

use crate::kv::KvStore;

pub const SESSION_KEY: &str = "user";

/// Locally stored login; the only place the access token lives.
#[derive(Clone)]
pub struct SessionStore {
    kv: KvStore,
}

impl SessionStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        ensure!(!record.username.trim().is_empty(), "Username must not be empty");
        ensure!(!record.access_token.trim().is_empty(), "Access token must not be empty");
        self.kv.save_json(SESSION_KEY, record).await?;
        tracing::info!(username = %record.username, "Session stored");
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<SessionRecord>> {
        self.kv.load_json(SESSION_KEY).await
    }

    /// The stored session, or `NotAuthenticated` when there is none.
    pub async fn require(&self) -> Result<SessionRecord, ResearchError> {
        match self.load().await {
            Ok(Some(record)) if !record.access_token.trim().is_empty() => Ok(record),
            Ok(_) => Err(ResearchError::NotAuthenticated),
            Err(e) => Err(ResearchError::Storage(format!("{:#}", e))),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.kv.remove(SESSION_KEY).await?;
        Ok(())
    }
}
