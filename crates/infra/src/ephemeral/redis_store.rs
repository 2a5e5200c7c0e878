//! Redis-backed ephemeral store.
//!
//! Nonce consumption and replay-marker insertion ride on Redis's atomic
//! primitives: `SET NX EX` for set-if-absent, `DEL` for delete-if-present.
//! Every call carries a short timeout and surfaces as `AuthError::Store`
//! (fail-closed) rather than leaking a Redis error upstream.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::instrument;

use fleetgate_auth::{AuthError, AuthResult, EphemeralStore};

/// Default per-command timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct RedisEphemeralStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisEphemeralStore {
    /// Connect to Redis (e.g. `redis://localhost:6379`).
    pub async fn connect(redis_url: impl AsRef<str>) -> AuthResult<Self> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(AuthError::store)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(AuthError::store)?;
        Ok(Self {
            manager,
            timeout: COMMAND_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> AuthResult<T> {
        let mut conn = self.manager.clone();
        let result = tokio::time::timeout(self.timeout, cmd.query_async::<_, T>(&mut conn))
            .await
            .map_err(|_| AuthError::store("redis command timed out"))?;
        result.map_err(AuthError::store)
    }
}

#[async_trait]
impl EphemeralStore for RedisEphemeralStore {
    #[instrument(skip(self, value), fields(key = %key), err)]
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Option<Duration>) -> AuthResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        self.run::<()>(cmd).await
    }

    #[instrument(skip(self, value), fields(key = %key), err)]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1));
        // NX returns nil when the key already existed.
        let reply: Option<String> = self.run(cmd).await?;
        Ok(reply.is_some())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn exists(&self, key: &str) -> AuthResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.run(cmd).await?;
        Ok(count > 0)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn delete_if_present(&self, key: &str) -> AuthResult<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.run(cmd).await?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(cmd).await
    }
}
