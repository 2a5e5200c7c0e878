//! Access/refresh token lifecycle.
//!
//! Access tokens are short-lived signed JWTs carrying `sub`, `exp` and —
//! when the session is DPoP-bound — the proof key thumbprint under
//! `cnf.jkt`, so a stolen access token cannot be replayed past
//! DPoP-enforcing endpoints without the private key. Refresh tokens are
//! long-lived opaque random strings persisted one row per issuance; a row
//! only ever moves `ACTIVE → REVOKED`, never back and never deleted.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;

use fleetgate_core::{Clock, OrganizationId, UserId};

use crate::audit::{AuditEvent, event};
use crate::error::{AuthError, AuthResult};
use crate::jwk::KeyThumbprint;
use crate::store::{NewRefreshToken, RefreshTokenStore};

/// Signing configuration and lifetimes.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Proof-of-possession confirmation claim (RFC 7800 shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cnf {
    pub jkt: String,
}

/// Claims carried by an access token. Immutable once signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
    /// Present when the token is bound to a proof key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnf: Option<Cnf>,
    /// Narrow, time-boxed context-switch delegation; never a persisted
    /// assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_org_id: Option<OrganizationId>,
}

impl AccessTokenClaims {
    pub fn bound_thumbprint(&self) -> Option<&str> {
        self.cnf.as_ref().map(|cnf| cnf.jkt.as_str())
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Issues, rotates and revokes token pairs.
pub struct TokenLifecycle {
    store: Arc<dyn RefreshTokenStore>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
}

impl TokenLifecycle {
    pub fn new(store: Arc<dyn RefreshTokenStore>, clock: Arc<dyn Clock>, config: TokenConfig) -> Self {
        Self { store, clock, config }
    }

    /// Issue a new pair for the principal, binding the access token to the
    /// proof key when a thumbprint is supplied.
    pub async fn issue_pair(
        &self,
        user_id: UserId,
        thumbprint: Option<&KeyThumbprint>,
    ) -> AuthResult<TokenPair> {
        let access_token = self.sign_access(user_id, thumbprint, None)?;
        let refresh_token = opaque_token();

        let now = self.clock.now();
        self.store
            .create(NewRefreshToken {
                user_id,
                token: refresh_token.clone(),
                expires_at: now + chrono::Duration::seconds(self.config.refresh_ttl.as_secs() as i64),
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl.as_secs(),
        })
    }

    /// Rotate a presented refresh token: revoke the old row and persist the
    /// replacement in one atomic unit, then hand back a fresh pair.
    ///
    /// Any validation failure — unknown, revoked, expired — is a uniform
    /// `Authentication` error.
    pub async fn rotate(
        &self,
        presented: &str,
        thumbprint: Option<&KeyThumbprint>,
    ) -> AuthResult<(UserId, TokenPair)> {
        let now = self.clock.now();
        let record = self
            .store
            .get_by_token(presented)
            .await?
            .ok_or(AuthError::Authentication)?;
        if record.is_revoked || record.expires_at <= now {
            return Err(AuthError::Authentication);
        }

        let access_token = self.sign_access(record.user_id, thumbprint, None)?;
        let refresh_token = opaque_token();
        let replacement = NewRefreshToken {
            user_id: record.user_id,
            token: refresh_token.clone(),
            expires_at: now + chrono::Duration::seconds(self.config.refresh_ttl.as_secs() as i64),
        };
        let audit = AuditEvent::new(
            event::TOKEN_ROTATED,
            Some(record.user_id),
            "refresh token rotated",
            json!({ "revoked_token_id": record.id }),
        );

        self.store.rotate(record.id, replacement, audit).await?;

        Ok((
            record.user_id,
            TokenPair {
                access_token,
                refresh_token,
                expires_in: self.config.access_ttl.as_secs(),
            },
        ))
    }

    /// Revoke every active refresh token of a user (account-compromise
    /// response). Returns the number of rows affected.
    pub async fn revoke_all(&self, user_id: UserId) -> AuthResult<u64> {
        self.store.revoke_all_for_user(user_id).await
    }

    /// Decode and validate a presented access token. `exp` is checked
    /// against the injected clock, not the library's system time.
    pub fn decode_access(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = Default::default();
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::Authentication)?;

        if data.claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::Authentication);
        }
        Ok(data.claims)
    }

    /// Re-sign the presented claims with a temporary organization context.
    /// The original `exp` is kept: the delegation is time-boxed by the token
    /// it rides on.
    pub fn reissue_with_temp_org(
        &self,
        claims: &AccessTokenClaims,
        organization_id: OrganizationId,
    ) -> AuthResult<String> {
        self.encode(&AccessTokenClaims {
            temp_org_id: Some(organization_id),
            ..claims.clone()
        })
    }

    fn sign_access(
        &self,
        user_id: UserId,
        thumbprint: Option<&KeyThumbprint>,
        temp_org_id: Option<OrganizationId>,
    ) -> AuthResult<String> {
        let now = self.clock.now().timestamp();
        self.encode(&AccessTokenClaims {
            sub: user_id,
            iat: now,
            exp: now + self.config.access_ttl.as_secs() as i64,
            cnf: thumbprint.map(|jkt| Cnf {
                jkt: jkt.as_str().to_string(),
            }),
            temp_org_id,
        })
    }

    fn encode(&self, claims: &AccessTokenClaims) -> AuthResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(AuthError::store)
    }
}

/// 256 bits of randomness, base64url without padding. Opaque: never a
/// signed structure.
fn opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
