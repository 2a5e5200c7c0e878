//! Trait seams to the core's external collaborators.
//!
//! The core never talks to Redis or Postgres directly; it goes through these
//! traits so the correctness-critical primitives (atomic set-if-absent,
//! atomic delete-if-present, transactional rotation) are named contracts
//! that in-memory fakes can honor deterministically.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fleetgate_core::{RoleId, UserId};

use crate::audit::AuditEvent;
use crate::error::AuthResult;
use crate::roles::{Role, RoleAssignment};

// ─────────────────────────────────────────────────────────────────────────────
// Ephemeral store (nonces, replay markers, emergency flag)
// ─────────────────────────────────────────────────────────────────────────────

/// Shared key-value store with per-key TTL and atomic check-and-mutate
/// primitives.
///
/// Two requests can race on the same nonce or `jti` under concurrent
/// retries; `set_if_absent` and `delete_if_present` are the sole correctness
/// mechanism — callers never read-then-write.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Set a key. `ttl == None` means no expiry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Option<Duration>) -> AuthResult<()>;

    /// Atomic set-if-absent with TTL. Returns `true` when the key was
    /// written, `false` when it already existed.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<bool>;

    async fn exists(&self, key: &str) -> AuthResult<bool>;

    /// Atomic delete-if-present. Returns `true` when the key existed.
    async fn delete_if_present(&self, key: &str) -> AuthResult<bool>;

    async fn get(&self, key: &str) -> AuthResult<Option<String>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity / role store
// ─────────────────────────────────────────────────────────────────────────────

/// A user row as the auth flow sees it. Owned by the identity store;
/// read-only to this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Read side of the identity store, plus the assignment write path the
/// governance engine authorizes but does not own.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<AuthUser>>;

    async fn get_user(&self, user_id: UserId) -> AuthResult<Option<AuthUser>>;

    async fn get_role_assignments(&self, user_id: UserId) -> AuthResult<Vec<RoleAssignment>>;

    async fn get_role(&self, role_id: RoleId) -> AuthResult<Option<Role>>;

    async fn list_roles(&self) -> AuthResult<Vec<Role>>;

    /// The SYSTEM role at the given tier, if configured.
    async fn find_system_role_by_tier(&self, tier: i16) -> AuthResult<Option<Role>>;

    async fn get_role_permissions(&self, role_id: RoleId) -> AuthResult<Vec<String>>;

    async fn count_users_with_role(&self, role_id: RoleId) -> AuthResult<u64>;

    async fn create_assignment(&self, assignment: RoleAssignment) -> AuthResult<()>;

    /// Returns `true` when the assignment existed.
    async fn delete_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh-token store
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted refresh token. One row per issuance; rows are never deleted,
/// only flipped to revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

/// A refresh token about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshToken {
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, record: NewRefreshToken) -> AuthResult<RefreshTokenRecord>;

    async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Revoke `old_id` and persist `replacement` in one atomic unit, with
    /// the audit record in the same transaction where the backend supports
    /// it. A failure after the revoke must roll the revoke back.
    ///
    /// Fails with `Authentication` when `old_id` is no longer an active row
    /// (a concurrent rotation won).
    async fn rotate(
        &self,
        old_id: i64,
        replacement: NewRefreshToken,
        audit: AuditEvent,
    ) -> AuthResult<RefreshTokenRecord>;

    /// Flip every active row for the user to revoked. Returns the number of
    /// rows affected.
    async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Password verification
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque credential check. Hashing scheme and parameters live entirely
/// behind this seam.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}
