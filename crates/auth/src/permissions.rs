//! Effective-permission resolution across SYSTEM/ORGANIZATION contexts.
//!
//! SYSTEM-scope assignments grant their permissions in every context; an
//! ORGANIZATION-scope assignment grants only in its own organization's
//! context. Two narrow widenings sit on top, both request-scoped and never
//! persisted: the `temp_org_id` context-switch claim, and the emergency
//! read-through that lets the second tier act as the first while the
//! top-tier role has zero holders.

use std::collections::HashSet;
use std::sync::Arc;

use fleetgate_core::{OrganizationId, UserId};

use crate::emergency::EmergencyMonitor;
use crate::error::{AuthError, AuthResult};
use crate::roles::{PRIME_TIER, RoleScope, STEWARD_TIER};
use crate::store::IdentityStore;
use crate::token::AccessTokenClaims;

/// Permission required to carry a `temp_org_id` claim.
pub const CONTEXT_SWITCH: &str = "system:context_switch";

/// The context a request is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessContext {
    System,
    Organization(OrganizationId),
}

/// Resolution result for one principal in one context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Effective {
    pub permissions: HashSet<String>,
    /// Whether the principal counts as a member of the requested
    /// organization (by assignment or by a valid temp-context claim).
    pub org_member: bool,
    /// Set when the emergency read-through widened the set this request.
    pub emergency_overlay: bool,
}

impl Effective {
    pub fn has(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn require(&self, permission: &str) -> AuthResult<()> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(permission.to_string()))
        }
    }
}

/// Computes the permission set a principal effectively holds.
pub struct PermissionResolver {
    identity: Arc<dyn IdentityStore>,
    emergency: Arc<EmergencyMonitor>,
}

impl PermissionResolver {
    pub fn new(identity: Arc<dyn IdentityStore>, emergency: Arc<EmergencyMonitor>) -> Self {
        Self { identity, emergency }
    }

    /// Resolve the effective permission set.
    ///
    /// `claims` is the decoded access token of the request, consulted for
    /// the `temp_org_id` delegation — which is re-validated here on every
    /// request and grants nothing beyond what the SYSTEM roles already
    /// carry, re-interpreted against the target organization.
    pub async fn resolve(
        &self,
        user_id: UserId,
        context: AccessContext,
        claims: Option<&AccessTokenClaims>,
    ) -> AuthResult<Effective> {
        let assignments = self.identity.get_role_assignments(user_id).await?;

        let mut effective = Effective::default();
        let mut holds_steward = false;

        for assignment in &assignments {
            let Some(role) = self.identity.get_role(assignment.role_id).await? else {
                continue;
            };

            if role.scope == RoleScope::System && role.tier == STEWARD_TIER {
                holds_steward = true;
            }

            let applies = match (role.scope, context) {
                (RoleScope::System, _) => true,
                (RoleScope::Organization, AccessContext::Organization(org)) => {
                    assignment.organization_id == Some(org)
                }
                (RoleScope::Organization, AccessContext::System) => false,
            };
            if !applies {
                continue;
            }

            if role.scope == RoleScope::Organization {
                effective.org_member = true;
            }
            for permission in self.identity.get_role_permissions(role.id).await? {
                effective.permissions.insert(permission);
            }
        }

        // Temporary context delegation: claim-scoped, never a persisted
        // assignment.
        if let (AccessContext::Organization(org), Some(claims)) = (context, claims) {
            if claims.temp_org_id == Some(org) && effective.has(CONTEXT_SWITCH) {
                effective.org_member = true;
            }
        }

        // Emergency read-through: the overlay disappears the instant the
        // flag clears, because the flag is consulted per request.
        if holds_steward && self.emergency.is_active().await? {
            if let Some(prime) = self.identity.find_system_role_by_tier(PRIME_TIER).await? {
                for permission in self.identity.get_role_permissions(prime.id).await? {
                    effective.permissions.insert(permission);
                }
                effective.emergency_overlay = true;
            }
        }

        Ok(effective)
    }
}
