use crate::error::{Error, Result};
use crate::traits::{Memory, MemoryRecord};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct VolatileMemory {
    records: RwLock<Vec<MemoryRecord>>,
}

impl VolatileMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Memory for VolatileMemory {
    fn name(&self) -> &str {
        "volatile"
    }

    async fn append(&self, key: &str, value: &str) -> Result<MemoryRecord> {
        if key.trim().is_empty() {
            return Err(Error::Validation("memory key cannot be empty".to_string()));
        }

        let record = MemoryRecord::new(key, value);
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn all(&self) -> Result<Vec<MemoryRecord>> {
        Ok(self.records.read().await.clone())
    }
}
