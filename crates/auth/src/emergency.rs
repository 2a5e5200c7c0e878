//! Emergency-mode monitor.
//!
//! A derived, process-external flag: set while the most privileged SYSTEM
//! role has zero holders, cleared otherwise. The flag lives in the shared
//! ephemeral store (never a language-level singleton) so every instance
//! converges and readers see the same level state. Consumers read it through
//! on each decision and never cache it beyond a single request.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditSink, event};
use crate::error::AuthResult;
use crate::roles::PRIME_TIER;
use crate::store::{EphemeralStore, IdentityStore};

/// Key of the flag in the shared ephemeral store.
pub const EMERGENCY_FLAG_KEY: &str = "auth:emergency_mode";

pub struct EmergencyMonitor {
    identity: Arc<dyn IdentityStore>,
    store: Arc<dyn EphemeralStore>,
    audit: Arc<dyn AuditSink>,
}

impl EmergencyMonitor {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        store: Arc<dyn EphemeralStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            identity,
            store,
            audit,
        }
    }

    /// Level-state read.
    pub async fn is_active(&self) -> AuthResult<bool> {
        self.store.exists(EMERGENCY_FLAG_KEY).await
    }

    /// Recompute the flag from the top tier's current headcount.
    ///
    /// Idempotent: only the set→clear / clear→set transitions are logged and
    /// audited; recomputing while the state is unchanged is a no-op. Called
    /// synchronously after any role change that can affect the top tier, and
    /// by the periodic background sweep.
    pub async fn recompute(&self) -> AuthResult<bool> {
        let Some(prime) = self.identity.find_system_role_by_tier(PRIME_TIER).await? else {
            return Ok(false);
        };
        let holders = self.identity.count_users_with_role(prime.id).await?;
        let was_active = self.store.exists(EMERGENCY_FLAG_KEY).await?;

        if holders == 0 && !was_active {
            self.store.set_with_ttl(EMERGENCY_FLAG_KEY, "1", None).await?;
            tracing::warn!(role = %prime.name, "emergency mode activated: top-tier role has zero holders");
            self.audit
                .record(AuditEvent::new(
                    event::EMERGENCY_ACTIVATED,
                    None,
                    "emergency mode activated",
                    json!({ "role_id": prime.id, "role_name": prime.name }),
                ))
                .await;
        } else if holders > 0 && was_active {
            self.store.delete_if_present(EMERGENCY_FLAG_KEY).await?;
            tracing::info!(role = %prime.name, holders, "emergency mode cleared");
            self.audit
                .record(AuditEvent::new(
                    event::EMERGENCY_CLEARED,
                    None,
                    "emergency mode cleared",
                    json!({ "role_id": prime.id, "role_name": prime.name, "holders": holders }),
                ))
                .await;
        }

        Ok(holders == 0)
    }
}
