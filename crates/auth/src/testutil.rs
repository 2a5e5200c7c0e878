//! Shared in-memory fixtures for this crate's tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use fleetgate_core::{Clock, OrganizationId, RoleId, UserId};

use crate::audit::{AuditEvent, AuditSink};
use crate::error::AuthResult;
use crate::roles::{Role, RoleAssignment, RoleScope};
use crate::store::{AuthUser, EphemeralStore, IdentityStore};

pub(crate) const NOW: i64 = 1_700_000_000;

pub(crate) struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(crate) fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.timestamp_opt(NOW, 0).unwrap()))
}

/// TTL-blind map store; atomicity is trivially satisfied under the lock.
#[derive(Default)]
pub(crate) struct MemStore {
    map: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl EphemeralStore for MemStore {
    async fn set_with_ttl(&self, key: &str, value: &str, _ttl: Option<Duration>) -> AuthResult<()> {
        self.map.lock().unwrap().insert(key.into(), value.into());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> AuthResult<bool> {
        let mut map = self.map.lock().unwrap();
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.into(), value.into());
        Ok(true)
    }

    async fn exists(&self, key: &str) -> AuthResult<bool> {
        Ok(self.map.lock().unwrap().contains_key(key))
    }

    async fn delete_if_present(&self, key: &str) -> AuthResult<bool> {
        Ok(self.map.lock().unwrap().remove(key).is_some())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }
}

/// Seedable identity store.
#[derive(Default)]
pub(crate) struct FakeIdentity {
    users: Mutex<HashMap<UserId, AuthUser>>,
    roles: Mutex<HashMap<RoleId, Role>>,
    permissions: Mutex<HashMap<RoleId, Vec<String>>>,
    assignments: Mutex<Vec<RoleAssignment>>,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, id: i64, email: &str, password_hash: &str) {
        self.users.lock().unwrap().insert(
            UserId::new(id),
            AuthUser {
                id: UserId::new(id),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                is_active: true,
            },
        );
    }

    pub fn add_role(&self, role: Role, permissions: &[&str]) {
        self.permissions.lock().unwrap().insert(
            role.id,
            permissions.iter().map(|p| p.to_string()).collect(),
        );
        self.roles.lock().unwrap().insert(role.id, role);
    }

    pub fn assign(&self, user_id: i64, role_id: i32, organization_id: Option<i64>) {
        self.assignments.lock().unwrap().push(RoleAssignment {
            user_id: UserId::new(user_id),
            role_id: RoleId::new(role_id),
            organization_id: organization_id.map(OrganizationId::new),
        });
    }

    pub fn unassign(&self, user_id: i64, role_id: i32) {
        self.assignments.lock().unwrap().retain(|a| {
            !(a.user_id == UserId::new(user_id) && a.role_id == RoleId::new(role_id))
        });
    }
}

#[async_trait]
impl IdentityStore for FakeIdentity {
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<AuthUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
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
            .filter(|a| a.user_id == user_id)
            .copied()
            .collect())
    }

    async fn get_role(&self, role_id: RoleId) -> AuthResult<Option<Role>> {
        Ok(self.roles.lock().unwrap().get(&role_id).cloned())
    }

    async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.lock().unwrap().values().cloned().collect();
        roles.sort_by_key(|r| r.id);
        Ok(roles)
    }

    async fn find_system_role_by_tier(&self, tier: i16) -> AuthResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .values()
            .find(|r| r.scope == RoleScope::System && r.tier == tier)
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
            .filter(|a| a.role_id == role_id)
            .map(|a| a.user_id)
            .collect();
        holders.sort();
        holders.dedup();
        Ok(holders.len() as u64)
    }

    async fn create_assignment(&self, assignment: RoleAssignment) -> AuthResult<()> {
        self.assignments.lock().unwrap().push(assignment);
        Ok(())
    }

    async fn delete_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool> {
        let mut assignments = self.assignments.lock().unwrap();
        let before = assignments.len();
        assignments.retain(|a| a != assignment);
        Ok(assignments.len() < before)
    }
}

/// Audit sink that remembers every event type it saw.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// The default role catalogue used across tests: prime (tier 0, cap 3),
/// steward (tier 1), org admin and org member.
pub(crate) fn seed_tiered_roles(identity: &FakeIdentity) {
    identity.add_role(
        Role {
            id: RoleId::new(1),
            name: "prime_admin".into(),
            scope: RoleScope::System,
            tier: 0,
            max_headcount: 3,
        },
        &["system:all", "system:context_switch", "roles:manage"],
    );
    identity.add_role(
        Role {
            id: RoleId::new(2),
            name: "system_admin".into(),
            scope: RoleScope::System,
            tier: 1,
            max_headcount: -1,
        },
        &["system:operate", "roles:manage"],
    );
    identity.add_role(
        Role {
            id: RoleId::new(3),
            name: "org_admin".into(),
            scope: RoleScope::Organization,
            tier: 2,
            max_headcount: -1,
        },
        &["org:manage", "org:read"],
    );
    identity.add_role(
        Role {
            id: RoleId::new(4),
            name: "org_member".into(),
            scope: RoleScope::Organization,
            tier: 3,
            max_headcount: -1,
        },
        &["org:read"],
    );
}
