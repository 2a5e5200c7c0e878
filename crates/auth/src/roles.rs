//! Role and assignment model for the tiered RBAC scheme.

use serde::{Deserialize, Serialize};

use fleetgate_core::{OrganizationId, RoleId, UserId};

/// Tier of the most privileged SYSTEM role ("prime admin").
pub const PRIME_TIER: i16 = 0;

/// Tier emergency mode delegates to ("steward") when the prime tier is empty.
pub const STEWARD_TIER: i16 = 1;

/// Scope a role grants permissions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleScope {
    /// Granted in every context.
    System,
    /// Granted only in the owning organization's context.
    Organization,
}

impl RoleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleScope::System => "SYSTEM",
            RoleScope::Organization => "ORGANIZATION",
        }
    }
}

impl core::fmt::Display for RoleScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role definition.
///
/// Lower `tier` is more privileged. `max_headcount == -1` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub scope: RoleScope,
    pub tier: i16,
    pub max_headcount: i32,
}

impl Role {
    pub fn is_unlimited(&self) -> bool {
        self.max_headcount < 0
    }

    /// Whether `current` holders leave room for one more.
    pub fn has_capacity(&self, current: u64) -> bool {
        self.is_unlimited() || current < self.max_headcount as u64
    }
}

/// A (user, role, organization) grant.
///
/// `organization_id == None` denotes a SYSTEM-scope assignment. Assignments
/// are immutable once created; role-management actions create and destroy
/// them, authorized by the governance engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub organization_id: Option<OrganizationId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(max_headcount: i32) -> Role {
        Role {
            id: RoleId::new(1),
            name: "prime_admin".to_string(),
            scope: RoleScope::System,
            tier: PRIME_TIER,
            max_headcount,
        }
    }

    #[test]
    fn capacity_boundary() {
        let capped = role(3);
        assert!(capped.has_capacity(0));
        assert!(capped.has_capacity(2));
        assert!(!capped.has_capacity(3));
        assert!(!capped.has_capacity(4));
    }

    #[test]
    fn negative_headcount_means_unlimited() {
        let unlimited = role(-1);
        assert!(unlimited.is_unlimited());
        assert!(unlimited.has_capacity(0));
        assert!(unlimited.has_capacity(u64::MAX));
    }
}
