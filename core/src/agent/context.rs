use crate::config::DEFAULT_SYSTEM_PROMPT;
use crate::error::Result;
use crate::traits::{ChatMessage, Memory, MemoryRecord};
use std::sync::Arc;

pub const NO_RELEVANT_MEMORIES: &str = "No relevant memories found.";

pub struct ContextBuilder {
    memory: Arc<dyn Memory>,
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self {
            memory,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        &self.memory
    }

    pub async fn get_memory_context(&self, user_message: &str) -> Result<String> {
        let relevant = self.memory.search(user_message).await?;
        tracing::debug!(count = relevant.len(), "Relevant memories");
        Ok(render_memories(&relevant))
    }

    /// Instruction, retrieved memory, then the user's message.
    pub async fn build_messages(&self, user_message: &str) -> Result<Vec<ChatMessage>> {
        let memory_context = self.get_memory_context(user_message).await?;

        Ok(vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::system(format!("Reference memory: {memory_context}")),
            ChatMessage::user(user_message),
        ])
    }
}

pub fn render_memories(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return NO_RELEVANT_MEMORIES.to_string();
    }

    records
        .iter()
        .map(|r| format!("{}: {}", r.key, r.value))
        .collect::<Vec<_>>()
        .join("\n")
}
