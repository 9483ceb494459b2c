use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys under which raw user input is logged. Such records stay in storage
/// but are never surfaced by `search`.
pub const LOG_KEY_PREFIX: &str = "user_input_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_log_entry(&self) -> bool {
        self.key.starts_with(LOG_KEY_PREFIX)
    }
}

/// Fresh, unique key for a logged user input.
pub fn log_key() -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}{}_{}",
        LOG_KEY_PREFIX,
        Utc::now().timestamp_millis(),
        &nonce[..8]
    )
}

/// Append-only key/value store.
#[async_trait]
pub trait Memory: Send + Sync {
    fn name(&self) -> &str;

    /// Adds a record; never overwrites an existing key.
    async fn append(&self, key: &str, value: &str) -> Result<MemoryRecord>;

    /// Snapshot of every record in insertion order.
    async fn all(&self) -> Result<Vec<MemoryRecord>>;

    /// Curated records relevant to `query`, in insertion order.
    async fn search(&self, query: &str) -> Result<Vec<MemoryRecord>> {
        let records = self.all().await?;
        Ok(crate::memory::relevance::filter(query, records))
    }
}
