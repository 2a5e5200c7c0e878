//! Credential login flow.
//!
//! The only call sites of the password collaborator live here. Every failure
//! mode — unknown email, suspended account, wrong password — collapses into
//! the same `Authentication` error so callers cannot enumerate accounts.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditSink, event};
use crate::error::{AuthError, AuthResult};
use crate::jwk::KeyThumbprint;
use crate::store::{IdentityStore, PasswordVerifier};
use crate::token::{TokenLifecycle, TokenPair};

use fleetgate_core::UserId;

pub struct LoginService {
    identity: Arc<dyn IdentityStore>,
    password: Arc<dyn PasswordVerifier>,
    tokens: Arc<TokenLifecycle>,
    audit: Arc<dyn AuditSink>,
}

impl LoginService {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        password: Arc<dyn PasswordVerifier>,
        tokens: Arc<TokenLifecycle>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            identity,
            password,
            tokens,
            audit,
        }
    }

    /// Verify credentials and issue a token pair, DPoP-bound when the caller
    /// presented a valid proof.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        thumbprint: Option<&KeyThumbprint>,
    ) -> AuthResult<(UserId, TokenPair)> {
        let user = self.identity.get_user_by_email(email).await?;

        let verified = match &user {
            Some(user) => user.is_active && self.password.verify(password, &user.password_hash),
            None => false,
        };
        let Some(user) = user.filter(|_| verified) else {
            self.audit
                .record(AuditEvent::new(
                    event::LOGIN_FAILED,
                    None,
                    "login failed",
                    json!({ "email": email }),
                ))
                .await;
            return Err(AuthError::Authentication);
        };

        let pair = self.tokens.issue_pair(user.id, thumbprint).await?;
        self.audit
            .record(AuditEvent::new(
                event::LOGIN_SUCCEEDED,
                Some(user.id),
                "login succeeded",
                json!({ "bound": thumbprint.is_some() }),
            ))
            .await;
        Ok((user.id, pair))
    }
}
