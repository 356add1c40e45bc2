//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_attempt_store;
mod redis_attempt_store;

pub use in_memory_attempt_store::InMemoryAttemptStore;
pub use redis_attempt_store::RedisAttemptStore;
