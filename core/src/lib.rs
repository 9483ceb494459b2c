pub mod agent;
pub mod config;
pub mod error;
pub mod memory;
pub mod providers;
pub mod tools;
pub mod traits;

pub use agent::{
    ContextBuilder, ManifestToolSource, Orchestrator, StaticToolSource, ToolRegistry, ToolSource,
    TurnOutcome,
};
pub use config::{
    Config, DEFAULT_SYSTEM_PROMPT, get_config_path, get_toolloop_dir, load_config, save_config,
};
pub use error::{Error, Result};
pub use memory::{FileMemory, VolatileMemory, create_memory};
pub use providers::{OpenAIProvider, create_provider};
pub use tools::{
    FavoriteDessertTool, GreetUserTool, MemoryReadTool, MemoryWriteTool, builtin_tools,
};
pub use traits::{
    ChatMessage, ChatRequest, ChatResponse, LOG_KEY_PREFIX, Memory, MemoryRecord, Provider, Role,
    Tool, ToolArgs, ToolCall, ToolSpec, log_key,
};
