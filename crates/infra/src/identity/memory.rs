//! In-memory identity store (dev profile and tests).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use fleetgate_auth::{AuthResult, AuthUser, IdentityStore, Role, RoleAssignment, RoleScope};
use fleetgate_core::{OrganizationId, RoleId, UserId};

#[derive(Default)]
pub struct InMemoryIdentityStore {
    users: Mutex<HashMap<UserId, AuthUser>>,
    roles: Mutex<HashMap<RoleId, Role>>,
    permissions: Mutex<HashMap<RoleId, Vec<String>>>,
    assignments: Mutex<Vec<RoleAssignment>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: AuthUser) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn insert_role(&self, role: Role, permissions: impl IntoIterator<Item = String>) {
        self.permissions
            .lock()
            .unwrap()
            .insert(role.id, permissions.into_iter().collect());
        self.roles.lock().unwrap().insert(role.id, role);
    }

    pub fn insert_assignment(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: Option<OrganizationId>,
    ) {
        self.assignments.lock().unwrap().push(RoleAssignment {
            user_id,
            role_id,
            organization_id,
        });
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<AuthUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn get_user(&self, user_id: UserId) -> AuthResult<Option<AuthUser>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn get_role_assignments(&self, user_id: UserId) -> AuthResult<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
            .copied()
            .collect())
    }

    async fn get_role(&self, role_id: RoleId) -> AuthResult<Option<Role>> {
        Ok(self.roles.lock().unwrap().get(&role_id).cloned())
    }

    async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.lock().unwrap().values().cloned().collect();
        roles.sort_by_key(|role| role.id);
        Ok(roles)
    }

    async fn find_system_role_by_tier(&self, tier: i16) -> AuthResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .values()
            .find(|role| role.scope == RoleScope::System && role.tier == tier)
            .cloned())
    }

    async fn get_role_permissions(&self, role_id: RoleId) -> AuthResult<Vec<String>> {
        Ok(self
            .permissions
            .lock()
            .unwrap()
            .get(&role_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_users_with_role(&self, role_id: RoleId) -> AuthResult<u64> {
        let assignments = self.assignments.lock().unwrap();
        let mut holders: Vec<UserId> = assignments
            .iter()
            .filter(|assignment| assignment.role_id == role_id)
            .map(|assignment| assignment.user_id)
            .collect();
        holders.sort();
        holders.dedup();
        Ok(holders.len() as u64)
    }

    async fn create_assignment(&self, assignment: RoleAssignment) -> AuthResult<()> {
        let mut assignments = self.assignments.lock().unwrap();
        if !assignments.contains(&assignment) {
            assignments.push(assignment);
        }
        Ok(())
    }

    async fn delete_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool> {
        let mut assignments = self.assignments.lock().unwrap();
        let before = assignments.len();
        assignments.retain(|existing| existing != assignment);
        Ok(assignments.len() < before)
    }
}
