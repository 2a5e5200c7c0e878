//! Structured audit events emitted by the trust boundary.
//!
//! The sink is fire-and-continue: implementations must never surface a
//! recording failure to the caller (they log and move on), and a failed
//! audit write must never silently authorize an action — where the backing
//! store supports it, the write shares the transaction of the state change
//! it describes (see the refresh-token rotation path).

use async_trait::async_trait;
use serde::Serialize;

use fleetgate_core::UserId;

/// Event type names, namespaced the way the rest of the platform names its
/// domain events.
pub mod event {
    pub const LOGIN_SUCCEEDED: &str = "auth.login.succeeded";
    pub const LOGIN_FAILED: &str = "auth.login.failed";
    pub const TOKEN_ROTATED: &str = "auth.token.rotated";
    pub const TOKENS_REVOKED: &str = "auth.token.revoked_all";
    pub const CONTEXT_SWITCHED: &str = "auth.context.switched";
    pub const GOVERNANCE_ALLOWED: &str = "auth.governance.allowed";
    pub const GOVERNANCE_DENIED: &str = "auth.governance.denied";
    pub const ROLE_ASSIGNED: &str = "auth.role.assigned";
    pub const ROLE_REVOKED: &str = "auth.role.revoked";
    pub const EMERGENCY_ACTIVATED: &str = "auth.emergency.activated";
    pub const EMERGENCY_CLEARED: &str = "auth.emergency.cleared";
}

/// One audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event_type: &'static str,
    pub actor: Option<UserId>,
    pub description: String,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: &'static str,
        actor: Option<UserId>,
        description: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            actor,
            description: description.into(),
            details,
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Sink that drops everything. For wiring paths that have their own audit
/// transport (and for tests that don't assert on audit output).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: AuditEvent) {}
}
