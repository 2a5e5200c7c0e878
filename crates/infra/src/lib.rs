//! Infrastructure layer: Redis, Postgres, password hashing, test clocks.
//!
//! Implements the trait seams `fleetgate-auth` consumes. Every store
//! translates its backend errors into `AuthError` at this boundary — raw
//! infrastructure failures never cross into the core, and auth decisions
//! fail closed when a backend is unavailable.

pub mod audit;
pub mod ephemeral;
pub mod identity;
pub mod password;
pub mod refresh_tokens;
pub mod testing;

pub use audit::{PostgresAuditSink, TracingAuditSink};
pub use ephemeral::InMemoryEphemeralStore;
pub use identity::{InMemoryIdentityStore, PostgresIdentityStore};
pub use password::{Argon2PasswordVerifier, hash_password};
pub use refresh_tokens::{InMemoryRefreshTokenStore, PostgresRefreshTokenStore};
pub use testing::ManualClock;

#[cfg(feature = "redis")]
pub use ephemeral::RedisEphemeralStore;
