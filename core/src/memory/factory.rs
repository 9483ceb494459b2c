use crate::config::Config;
use crate::memory::{FileMemory, VolatileMemory};
use crate::traits::Memory;
use std::sync::Arc;

pub fn create_memory(config: &Config, ephemeral: bool) -> Arc<dyn Memory> {
    if ephemeral {
        Arc::new(VolatileMemory::new())
    } else {
        Arc::new(FileMemory::new(&config.memory_path))
    }
}
