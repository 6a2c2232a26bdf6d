// feedtally-cache - Cache-resident engagement state
//
// Everything the ingest path and the flush coordinator keep in the shared
// key-value cache lives behind the CacheBackend trait:
//
// - StagingStore: per-user, per-day cumulative records (read-merge-CAS)
// - ActivityIndex: per-day sorted set of users with unflushed activity
// - DayLock: create-if-absent key that makes a day's flush single-flight
//
// Backends: Redis (production) and an in-process map (tests, local runs).

pub mod activity;
pub mod backend;
pub mod error;
pub mod keys;
pub mod lock;
pub mod memory;
pub mod redis_backend;
pub mod staging;

pub use activity::ActivityIndex;
pub use backend::CacheBackend;
pub use error::CacheError;
pub use keys::KeySpace;
pub use lock::DayLock;
pub use memory::MemoryCache;
pub use redis_backend::RedisCache;
pub use staging::StagingStore;
