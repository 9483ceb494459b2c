pub mod memory;
pub mod provider;
pub mod tool;

pub use memory::{LOG_KEY_PREFIX, Memory, MemoryRecord, log_key};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, Role, ToolCall};
pub use tool::{Tool, ToolArgs, ToolSpec};
