use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::StoreDb;

/// String-keyed state table.
#[derive(Clone)]
pub struct KvStore {
    db: StoreDb,
}

impl KvStore {
    pub fn new(db: StoreDb) -> Self {
        Self { db }
    }

    /// Upsert a raw value.
    pub async fn save(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await
        .with_context(|| format!("Failed to save state '{}'", key))?;
        Ok(())
    }

    pub async fn load(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_state WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await
            .with_context(|| format!("Failed to load state '{}'", key))?;
        Ok(row.map(|(v,)| v))
    }

    /// Returns whether a value was present.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_state WHERE key = ?")
            .bind(key)
            .execute(self.db.pool())
            .await
            .with_context(|| format!("Failed to remove state '{}'", key))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).with_context(|| format!("Failed to serialize '{}'", key))?;
        self.save(key, &json).await
    }

    pub async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.load(key).await? {
            Some(json) => {
                let value =
                    serde_json::from_str(&json).with_context(|| format!("Stored state '{}' is not valid", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn kv() -> KvStore {
        KvStore::new(StoreDb::new("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_key() {
        let kv = kv().await;
        kv.save("user", "first").await.unwrap();
        kv.save("user", "second").await.unwrap();

        assert_eq!(kv.load("user").await.unwrap().as_deref(), Some("second"));
        assert_eq!(kv.load("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let kv = kv().await;
        kv.save("chat_messages", "[]").await.unwrap();

        assert!(kv.remove("chat_messages").await.unwrap());
        assert!(!kv.remove("chat_messages").await.unwrap());
        assert_eq!(kv.load("chat_messages").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let kv = kv().await;
        kv.save("user", "{not json").await.unwrap();

        let loaded: Result<Option<Vec<String>>> = kv.load_json("user").await;
        assert!(loaded.is_err());
    }
}
