pub mod db;
pub mod history;
pub mod kv;
pub mod models;
pub mod portfolio;
pub mod session;
pub mod transcript;

pub use db::StoreDb;
pub use history::QueryHistory;
pub use kv::KvStore;
pub use models::*;
pub use portfolio::PortfolioBook;
pub use session::{SessionStore, SESSION_KEY};
pub use transcript::{SqliteTranscriptStore, TRANSCRIPT_KEY};

/// Every persisted piece of dashboard state, sharing one pool.
#[derive(Clone)]
pub struct DashboardStore {
    pub kv: KvStore,
    pub transcript: SqliteTranscriptStore,
    pub sessions: SessionStore,
    pub history: QueryHistory,
    pub portfolio: PortfolioBook,
}

impl DashboardStore {
    pub async fn open(database_url: &str) -> anyhow::Result<Self> {
        let db = StoreDb::new(database_url).await?;
        let kv = KvStore::new(db.clone());
        Ok(Self {
            transcript: SqliteTranscriptStore::new(kv.clone()),
            sessions: SessionStore::new(kv.clone()),
            history: QueryHistory::new(db.clone()),
            portfolio: PortfolioBook::new(db),
            kv,
        })
    }
}
