use crate::traits::{Memory, Tool, ToolArgs};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct MemoryReadTool {
    memory: Arc<dyn Memory>,
}

impl MemoryReadTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Look up remembered facts relevant to a question or keywords"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords or question to search memory for"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let query = args.require_str("query")?;
        let records = self.memory.search(query).await?;
        Ok(json!({ "memories": records }))
    }
}
