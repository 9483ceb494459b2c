use crate::traits::{Memory, Tool};
use std::sync::Arc;

pub mod favorite_dessert;
pub mod greet_user;
pub mod memory_read;
pub mod memory_write;

pub use favorite_dessert::FavoriteDessertTool;
pub use greet_user::GreetUserTool;
pub use memory_read::MemoryReadTool;
pub use memory_write::MemoryWriteTool;

/// Tools available in every registry, in advertisement order.
pub fn builtin_tools(memory: Arc<dyn Memory>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GreetUserTool),
        Arc::new(FavoriteDessertTool),
        Arc::new(MemoryWriteTool::new(memory.clone())),
        Arc::new(MemoryReadTool::new(memory)),
    ]
}
