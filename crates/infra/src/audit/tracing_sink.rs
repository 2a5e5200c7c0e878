//! Audit sink that emits structured log records (dev profile).

use fleetgate_auth::{AuditEvent, AuditSink};

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            event_type = event.event_type,
            actor = ?event.actor,
            details = %event.details,
            "{}",
            event.description
        );
    }
}
