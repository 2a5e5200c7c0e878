//! Postgres-backed identity/role store.
//!
//! Read-mostly: the auth path resolves users, roles, assignments and
//! headcounts here. The assignment write path is used by role-administration
//! routes after the governance engine authorizes the action.

use sqlx::{PgPool, Row};
use tracing::instrument;

use fleetgate_auth::{
    AuthError, AuthResult, AuthUser, IdentityStore, Role, RoleAssignment, RoleScope,
};
use fleetgate_core::{OrganizationId, RoleId, UserId};

use async_trait::async_trait;

pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn role_from_row(row: &sqlx::postgres::PgRow) -> AuthResult<Role> {
    let scope: String = row.try_get("scope").map_err(AuthError::store)?;
    let scope = match scope.as_str() {
        "SYSTEM" => RoleScope::System,
        "ORGANIZATION" => RoleScope::Organization,
        other => return Err(AuthError::store(format!("unknown role scope '{other}'"))),
    };
    Ok(Role {
        id: RoleId::new(row.try_get::<i32, _>("id").map_err(AuthError::store)?),
        name: row.try_get("name").map_err(AuthError::store)?,
        scope,
        tier: row.try_get("tier").map_err(AuthError::store)?,
        max_headcount: row.try_get("max_headcount").map_err(AuthError::store)?,
    })
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> AuthResult<AuthUser> {
    Ok(AuthUser {
        id: UserId::new(row.try_get::<i64, _>("id").map_err(AuthError::store)?),
        email: row.try_get("email").map_err(AuthError::store)?,
        password_hash: row.try_get("password_hash").map_err(AuthError::store)?,
        is_active: row.try_get("is_active").map_err(AuthError::store)?,
    })
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self, email), err)]
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<AuthUser>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, is_active FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::store)?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_user(&self, user_id: UserId) -> AuthResult<Option<AuthUser>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, is_active FROM users WHERE id = $1",
        )
        .bind(i64::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::store)?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_role_assignments(&self, user_id: UserId) -> AuthResult<Vec<RoleAssignment>> {
        let rows = sqlx::query(
            "SELECT user_id, role_id, organization_id FROM role_assignments WHERE user_id = $1",
        )
        .bind(i64::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(AuthError::store)?;

        rows.iter()
            .map(|row| {
                Ok(RoleAssignment {
                    user_id: UserId::new(row.try_get::<i64, _>("user_id").map_err(AuthError::store)?),
                    role_id: RoleId::new(row.try_get::<i32, _>("role_id").map_err(AuthError::store)?),
                    organization_id: row
                        .try_get::<Option<i64>, _>("organization_id")
                        .map_err(AuthError::store)?
                        .map(OrganizationId::new),
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, role_id: RoleId) -> AuthResult<Option<Role>> {
        let row = sqlx::query(
            "SELECT id, name, scope, tier, max_headcount FROM roles WHERE id = $1",
        )
        .bind(i32::from(role_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::store)?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        let rows = sqlx::query(
            "SELECT id, name, scope, tier, max_headcount FROM roles ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AuthError::store)?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn find_system_role_by_tier(&self, tier: i16) -> AuthResult<Option<Role>> {
        let row = sqlx::query(
            "SELECT id, name, scope, tier, max_headcount FROM roles \
             WHERE scope = 'SYSTEM' AND tier = $1 ORDER BY id LIMIT 1",
        )
        .bind(tier)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::store)?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_role_permissions(&self, role_id: RoleId) -> AuthResult<Vec<String>> {
        let rows = sqlx::query("SELECT permission FROM role_permissions WHERE role_id = $1")
            .bind(i32::from(role_id))
            .fetch_all(&self.pool)
            .await
            .map_err(AuthError::store)?;
        rows.iter()
            .map(|row| row.try_get("permission").map_err(AuthError::store))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn count_users_with_role(&self, role_id: RoleId) -> AuthResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT user_id) AS holders FROM role_assignments WHERE role_id = $1",
        )
        .bind(i32::from(role_id))
        .fetch_one(&self.pool)
        .await
        .map_err(AuthError::store)?;
        let holders: i64 = row.try_get("holders").map_err(AuthError::store)?;
        Ok(holders.max(0) as u64)
    }

    #[instrument(skip(self), err)]
    async fn create_assignment(&self, assignment: RoleAssignment) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO role_assignments (user_id, role_id, organization_id) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(i64::from(assignment.user_id))
        .bind(i32::from(assignment.role_id))
        .bind(assignment.organization_id.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(AuthError::store)?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool> {
        let result = sqlx::query(
            "DELETE FROM role_assignments \
             WHERE user_id = $1 AND role_id = $2 AND organization_id IS NOT DISTINCT FROM $3",
        )
        .bind(i64::from(assignment.user_id))
        .bind(i32::from(assignment.role_id))
        .bind(assignment.organization_id.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(AuthError::store)?;
        Ok(result.rows_affected() > 0)
    }
}
