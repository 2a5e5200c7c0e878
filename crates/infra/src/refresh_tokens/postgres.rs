//! Postgres-backed refresh-token store.
//!
//! Rows are append-then-flip: one row per issuance, mutated only to set
//! `is_revoked`, never deleted. Rotation runs revoke-old + insert-new + the
//! audit record in a single transaction, so a crash mid-rotation rolls the
//! revoke back and the caller keeps a usable token.

use sqlx::{PgPool, Row};
use tracing::instrument;

use fleetgate_auth::{
    AuditEvent, AuthError, AuthResult, NewRefreshToken, RefreshTokenRecord, RefreshTokenStore,
};
use fleetgate_core::UserId;

use async_trait::async_trait;

pub struct PostgresRefreshTokenStore {
    pool: PgPool,
}

impl PostgresRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> AuthResult<RefreshTokenRecord> {
    Ok(RefreshTokenRecord {
        id: row.try_get("id").map_err(AuthError::store)?,
        user_id: UserId::new(row.try_get::<i64, _>("user_id").map_err(AuthError::store)?),
        token: row.try_get("token").map_err(AuthError::store)?,
        expires_at: row.try_get("expires_at").map_err(AuthError::store)?,
        is_revoked: row.try_get("is_revoked").map_err(AuthError::store)?,
    })
}

#[async_trait]
impl RefreshTokenStore for PostgresRefreshTokenStore {
    #[instrument(skip(self, record), err)]
    async fn create(&self, record: NewRefreshToken) -> AuthResult<RefreshTokenRecord> {
        let row = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at) \
             VALUES ($1, $2, $3) \
             RETURNING id, user_id, token, expires_at, is_revoked",
        )
        .bind(i64::from(record.user_id))
        .bind(&record.token)
        .bind(record.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AuthError::store)?;
        record_from_row(&row)
    }

    #[instrument(skip_all, err)]
    async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, token, expires_at, is_revoked \
             FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::store)?;
        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self, replacement, audit), err)]
    async fn rotate(
        &self,
        old_id: i64,
        replacement: NewRefreshToken,
        audit: AuditEvent,
    ) -> AuthResult<RefreshTokenRecord> {
        let mut tx = self.pool.begin().await.map_err(AuthError::store)?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE \
             WHERE id = $1 AND is_revoked = FALSE",
        )
        .bind(old_id)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::store)?;
        if revoked.rows_affected() != 1 {
            // A concurrent rotation won; the transaction drop rolls back.
            return Err(AuthError::Authentication);
        }

        let row = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at) \
             VALUES ($1, $2, $3) \
             RETURNING id, user_id, token, expires_at, is_revoked",
        )
        .bind(i64::from(replacement.user_id))
        .bind(&replacement.token)
        .bind(replacement.expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AuthError::store)?;
        let record = record_from_row(&row)?;

        // Audit row shares the transaction: the rotation is never committed
        // without its record.
        sqlx::query(
            "INSERT INTO audit_log (event_type, actor_id, description, details) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(audit.event_type)
        .bind(audit.actor.map(i64::from))
        .bind(&audit.description)
        .bind(&audit.details)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::store)?;

        tx.commit().await.map_err(AuthError::store)?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE \
             WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(i64::from(user_id))
        .execute(&self.pool)
        .await
        .map_err(AuthError::store)?;
        Ok(result.rows_affected())
    }
}
