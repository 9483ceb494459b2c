pub mod factory;
pub mod file;
pub mod relevance;
pub mod volatile;

pub use factory::create_memory;
pub use file::FileMemory;
pub use volatile::VolatileMemory;
