pub mod bus;
pub mod cache;
pub mod indexed_cache;

pub use bus::{BusStats, MessageBus, QueueEntry, RoutingKey};
pub use cache::LRUCache;
pub use indexed_cache::IndexedCache;
