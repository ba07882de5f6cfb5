pub mod app_config;
pub mod events;
pub mod memory;

pub use app_config::{BusinessRules, Config};
pub use events::{ChangeFeed, StoreEvent};
pub use memory::MemoryStore;
