//! Shared ephemeral store backends (nonces, replay markers, emergency flag).

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::InMemoryEphemeralStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisEphemeralStore;
