pub mod context;
pub mod orchestrator;
pub mod registry;
pub mod source;

pub use context::ContextBuilder;
pub use orchestrator::{Orchestrator, PromptRecord, ToolInvocation, TurnOutcome, TurnState};
pub use registry::{RefreshReport, ToolRegistry};
pub use source::{ManifestTool, ManifestToolSource, StaticToolSource, ToolSource};
