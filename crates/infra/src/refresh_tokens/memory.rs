//! In-memory refresh-token store (dev profile and tests).
//!
//! Mirrors the transactional contract of the Postgres implementation:
//! `rotate` either revokes the old row *and* inserts the replacement, or
//! does neither.

use std::sync::Mutex;

use async_trait::async_trait;

use fleetgate_auth::{
    AuditEvent, AuthError, AuthResult, NewRefreshToken, RefreshTokenRecord, RefreshTokenStore,
};
use fleetgate_core::UserId;

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    rows: Mutex<Vec<RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, for assertions on rotation atomicity.
    pub fn rows(&self) -> Vec<RefreshTokenRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(&self, record: NewRefreshToken) -> AuthResult<RefreshTokenRecord> {
        let mut rows = self.rows.lock().unwrap();
        let row = RefreshTokenRecord {
            id: rows.len() as i64 + 1,
            user_id: record.user_id,
            token: record.token,
            expires_at: record.expires_at,
            is_revoked: false,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.token == token)
            .cloned())
    }

    async fn rotate(
        &self,
        old_id: i64,
        replacement: NewRefreshToken,
        _audit: AuditEvent,
    ) -> AuthResult<RefreshTokenRecord> {
        let mut rows = self.rows.lock().unwrap();
        // Revoke-old and insert-new under one lock: the whole unit happens
        // or none of it does, like the SQL transaction it stands in for.
        let old = rows
            .iter_mut()
            .find(|row| row.id == old_id && !row.is_revoked)
            .ok_or(AuthError::Authentication)?;
        old.is_revoked = true;

        let row = RefreshTokenRecord {
            id: rows.len() as i64 + 1,
            user_id: replacement.user_id,
            token: replacement.token,
            expires_at: replacement.expires_at,
            is_revoked: false,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut affected = 0;
        for row in rows.iter_mut() {
            if row.user_id == user_id && !row.is_revoked {
                row.is_revoked = true;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn new_token(user: i64, token: &str) -> NewRefreshToken {
        NewRefreshToken {
            user_id: UserId::new(user),
            token: token.to_string(),
            expires_at: Utc::now() + Duration::days(30),
        }
    }

    fn audit() -> AuditEvent {
        AuditEvent::new("auth.token.rotated", None, "test", serde_json::json!({}))
    }

    #[tokio::test]
    async fn rotate_is_all_or_nothing() {
        let store = InMemoryRefreshTokenStore::new();
        let first = store.create(new_token(1, "t1")).await.unwrap();

        store.rotate(first.id, new_token(1, "t2"), audit()).await.unwrap();
        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_revoked);
        assert!(!rows[1].is_revoked);

        // Rotating the same lineage again: the revoke lost the race, so the
        // insert must not happen either.
        let err = store
            .rotate(first.id, new_token(1, "t3"), audit())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Authentication);
        assert_eq!(store.rows().len(), 2);
    }
}
