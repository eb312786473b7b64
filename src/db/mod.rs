pub mod context_source;
pub mod postgres;
pub mod redis;

pub use context_source::PersistentContextSource;
pub use postgres::create_pool;
pub use redis::create_redis_client;
pub use redis::SessionStore;
pub use redis::SessionWriterHandle;
