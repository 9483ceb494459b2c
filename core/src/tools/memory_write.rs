use crate::traits::{Memory, Tool, ToolArgs};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct MemoryWriteTool {
    memory: Arc<dyn Memory>,
}

impl MemoryWriteTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Store a fact for future reference. Use this for user preferences, decisions, or anything that should persist between conversations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Short identifier for the fact, e.g. favorite_color"
                },
                "value": {
                    "type": "string",
                    "description": "The fact to remember"
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let key = args.require_str("key")?;
        let value = args.require_str("value")?;

        let record = self.memory.append(key, value).await?;
        Ok(json!({ "stored": record.key }))
    }
}
