pub mod session;

pub use session::create_redis_client;
pub use session::SessionBackend;
pub use session::SessionData;
pub use session::SessionStore;
pub use session::SessionUpdate;
pub use session::SessionWriterHandle;
