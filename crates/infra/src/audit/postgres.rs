//! Postgres-backed audit sink.

use sqlx::PgPool;

use fleetgate_auth::{AuditEvent, AuditSink};

use async_trait::async_trait;

pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, event: AuditEvent) {
        let result = sqlx::query(
            "INSERT INTO audit_log (event_type, actor_id, description, details) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event.event_type)
        .bind(event.actor.map(i64::from))
        .bind(&event.description)
        .bind(&event.details)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            tracing::warn!(
                event_type = event.event_type,
                error = %err,
                "failed to persist audit event"
            );
        }
    }
}
