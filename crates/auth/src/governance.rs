//! Governance engine.
//!
//! Decides whether an actor may assign or revoke a role among the
//! privileged tiers, beyond plain permission-string checks. Policy is data:
//! ordered, conditional allow/deny rules over (actor role, action, target
//! role, context). Conditions are a closed enum of typed predicates — no
//! stringly-typed dispatch — each a pure function over a situational-facts
//! struct, so a decision is a pure function of its inputs.
//!
//! Deny-by-default is an invariant: the absence of an explicit allow is
//! equivalent to an explicit deny.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use fleetgate_core::{RoleId, UserId};

use crate::audit::{AuditEvent, AuditSink, event};
use crate::emergency::EmergencyMonitor;
use crate::error::{AuthError, AuthResult};
use crate::roles::{PRIME_TIER, Role, RoleScope, STEWARD_TIER};
use crate::store::IdentityStore;

// ─────────────────────────────────────────────────────────────────────────────
// Rule model
// ─────────────────────────────────────────────────────────────────────────────

/// Role-management action governed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceAction {
    AssignRole,
    RevokeRole,
}

impl GovernanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GovernanceAction::AssignRole => "assign_role",
            GovernanceAction::RevokeRole => "revoke_role",
        }
    }
}

impl core::fmt::Display for GovernanceAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator used by numeric conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "$gt")]
    Gt,
    #[serde(rename = "$lt")]
    Lt,
    #[serde(rename = "$eq")]
    Eq,
}

impl CmpOp {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Gt => lhs > rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Eq => lhs == rhs,
        }
    }
}

/// One named predicate on a rule. All conditions on a rule must hold for
/// the rule to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// The target role's headcount is below its cap. Unlimited caps always
    /// hold.
    MaxHeadcountNotReached,
    /// Compare the current number of top-tier holders.
    PrimeAdminCount { op: CmpOp, value: i64 },
    /// Compare the target role's tier.
    TargetRoleTier { op: CmpOp, value: i64 },
    /// The target role's scope equals the given scope.
    TargetRoleScope { scope: RoleScope },
    /// Emergency mode is in the given state.
    EmergencyModeIs { value: bool },
}

impl RuleCondition {
    pub fn holds(&self, facts: &SituationalFacts) -> bool {
        match self {
            RuleCondition::MaxHeadcountNotReached => {
                facts.target_role_max_headcount < 0
                    || facts.target_role_headcount < facts.target_role_max_headcount as u64
            }
            RuleCondition::PrimeAdminCount { op, value } => {
                op.holds(facts.prime_admin_count as i64, *value)
            }
            RuleCondition::TargetRoleTier { op, value } => {
                op.holds(facts.target_role_tier as i64, *value)
            }
            RuleCondition::TargetRoleScope { scope } => facts.target_role_scope == *scope,
            RuleCondition::EmergencyModeIs { value } => facts.emergency_mode == *value,
        }
    }
}

/// Facts gathered by the caller before evaluation. Everything a condition
/// may consult, captured once so the decision is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SituationalFacts {
    pub target_role_headcount: u64,
    pub target_role_max_headcount: i32,
    pub target_role_tier: i16,
    pub target_role_scope: RoleScope,
    pub prime_admin_count: u64,
    pub emergency_mode: bool,
}

/// A prioritized, conditional allow/deny statement. Read-only configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceRule {
    pub id: i32,
    pub rule_name: String,
    pub actor_role_id: RoleId,
    /// `None` is a wildcard: the rule applies to any target role.
    pub target_role_id: Option<RoleId>,
    pub action: GovernanceAction,
    pub context: RoleScope,
    pub allow: bool,
    /// Ascending priority: lower values take precedence.
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
}

/// The decisive rule behind a permitted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub rule_id: i32,
    pub rule_name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluation
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluate pre-selected, priority-ordered rules against the facts.
///
/// The first rule whose conditions all hold is decisive: allow succeeds,
/// deny fails naming the rule. No decisive rule fails closed, naming none —
/// denials never reveal other, non-matching rules.
pub fn evaluate(rules: &[&GovernanceRule], facts: &SituationalFacts) -> Result<Decision, AuthError> {
    for rule in rules {
        if rule.conditions.iter().all(|condition| condition.holds(facts)) {
            if rule.allow {
                return Ok(Decision {
                    rule_id: rule.id,
                    rule_name: rule.rule_name.clone(),
                });
            }
            return Err(AuthError::denied_rule(rule.rule_name.clone()));
        }
    }
    Err(AuthError::no_matching_rule())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule set
// ─────────────────────────────────────────────────────────────────────────────

/// Priority-ordered rule configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<GovernanceRule>,
}

impl RuleSet {
    /// Order is normalized at construction: ascending priority, rule id as
    /// the tie-breaker, so selection is deterministic regardless of the
    /// order rules were authored in.
    pub fn new(mut rules: Vec<GovernanceRule>) -> Self {
        rules.sort_by_key(|rule| (rule.priority, rule.id));
        Self { rules }
    }

    pub fn rules(&self) -> &[GovernanceRule] {
        &self.rules
    }

    /// Rules applicable to one concrete decision, in evaluation order.
    pub fn select(
        &self,
        actor_role_ids: &[RoleId],
        action: GovernanceAction,
        context: RoleScope,
        target_role_id: RoleId,
    ) -> Vec<&GovernanceRule> {
        self.rules
            .iter()
            .filter(|rule| {
                rule.action == action
                    && rule.context == context
                    && actor_role_ids.contains(&rule.actor_role_id)
                    && rule.target_role_id.is_none_or(|target| target == target_role_id)
            })
            .collect()
    }

    /// The default policy shipped with the platform.
    ///
    /// - The prime tier manages every role.
    /// - The steward tier may grant the prime role only below its cap, may
    ///   revoke it only while more than one holder remains (an explicit deny
    ///   backstops the orphaning case), and manages every lower tier.
    /// - While emergency mode is set, the steward tier may restore the prime
    ///   role even though rule selection would otherwise favor nothing.
    /// - Organization admins manage organization-scoped roles in their own
    ///   context.
    pub fn builtin(prime: RoleId, steward: RoleId, org_admin: RoleId) -> Self {
        use GovernanceAction::{AssignRole, RevokeRole};

        Self::new(vec![
            GovernanceRule {
                id: 1,
                rule_name: "emergency_steward_restores_prime".into(),
                actor_role_id: steward,
                target_role_id: Some(prime),
                action: AssignRole,
                context: RoleScope::System,
                allow: true,
                priority: 1,
                conditions: vec![
                    RuleCondition::EmergencyModeIs { value: true },
                    RuleCondition::MaxHeadcountNotReached,
                ],
            },
            GovernanceRule {
                id: 2,
                rule_name: "prime_admin_assigns_any_role".into(),
                actor_role_id: prime,
                target_role_id: None,
                action: AssignRole,
                context: RoleScope::System,
                allow: true,
                priority: 5,
                conditions: vec![RuleCondition::MaxHeadcountNotReached],
            },
            GovernanceRule {
                id: 3,
                rule_name: "prime_admin_revokes_any_role".into(),
                actor_role_id: prime,
                target_role_id: None,
                action: RevokeRole,
                context: RoleScope::System,
                allow: true,
                priority: 5,
                conditions: vec![],
            },
            GovernanceRule {
                id: 4,
                rule_name: "steward_grants_prime_below_cap".into(),
                actor_role_id: steward,
                target_role_id: Some(prime),
                action: AssignRole,
                context: RoleScope::System,
                allow: true,
                priority: 10,
                conditions: vec![RuleCondition::MaxHeadcountNotReached],
            },
            GovernanceRule {
                id: 5,
                rule_name: "steward_revokes_redundant_prime".into(),
                actor_role_id: steward,
                target_role_id: Some(prime),
                action: RevokeRole,
                context: RoleScope::System,
                allow: true,
                priority: 10,
                conditions: vec![RuleCondition::PrimeAdminCount {
                    op: CmpOp::Gt,
                    value: 1,
                }],
            },
            GovernanceRule {
                id: 6,
                rule_name: "steward_cannot_orphan_prime".into(),
                actor_role_id: steward,
                target_role_id: Some(prime),
                action: RevokeRole,
                context: RoleScope::System,
                allow: false,
                priority: 20,
                conditions: vec![],
            },
            GovernanceRule {
                id: 7,
                rule_name: "steward_assigns_lower_tiers".into(),
                actor_role_id: steward,
                target_role_id: None,
                action: AssignRole,
                context: RoleScope::System,
                allow: true,
                priority: 30,
                conditions: vec![RuleCondition::TargetRoleTier {
                    op: CmpOp::Gt,
                    value: STEWARD_TIER as i64,
                }],
            },
            GovernanceRule {
                id: 8,
                rule_name: "steward_revokes_lower_tiers".into(),
                actor_role_id: steward,
                target_role_id: None,
                action: RevokeRole,
                context: RoleScope::System,
                allow: true,
                priority: 30,
                conditions: vec![RuleCondition::TargetRoleTier {
                    op: CmpOp::Gt,
                    value: STEWARD_TIER as i64,
                }],
            },
            GovernanceRule {
                id: 9,
                rule_name: "org_admin_assigns_org_roles".into(),
                actor_role_id: org_admin,
                target_role_id: None,
                action: AssignRole,
                context: RoleScope::Organization,
                allow: true,
                priority: 40,
                conditions: vec![RuleCondition::TargetRoleScope {
                    scope: RoleScope::Organization,
                }],
            },
            GovernanceRule {
                id: 10,
                rule_name: "org_admin_revokes_org_roles".into(),
                actor_role_id: org_admin,
                target_role_id: None,
                action: RevokeRole,
                context: RoleScope::Organization,
                allow: true,
                priority: 40,
                conditions: vec![RuleCondition::TargetRoleScope {
                    scope: RoleScope::Organization,
                }],
            },
        ])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Gathers situational facts, applies the headcount quota and the emergency
/// actor overlay, evaluates the rule set, and audit-records the outcome.
pub struct GovernanceService {
    identity: Arc<dyn IdentityStore>,
    rules: RuleSet,
    emergency: Arc<EmergencyMonitor>,
    audit: Arc<dyn AuditSink>,
}

impl GovernanceService {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        rules: RuleSet,
        emergency: Arc<EmergencyMonitor>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            identity,
            rules,
            emergency,
            audit,
        }
    }

    /// Authorize `actor` to perform `action` against `target_role_id` within
    /// `context`.
    pub async fn authorize(
        &self,
        actor: UserId,
        action: GovernanceAction,
        target_role_id: RoleId,
        context: RoleScope,
    ) -> AuthResult<Decision> {
        let Some(target_role) = self.identity.get_role(target_role_id).await? else {
            return Err(AuthError::no_matching_rule());
        };

        let emergency_mode = self.emergency.is_active().await?;
        let actor_role_ids = self.actor_role_ids(actor, emergency_mode).await?;

        let prime_admin_count = match self.identity.find_system_role_by_tier(PRIME_TIER).await? {
            Some(prime) => self.identity.count_users_with_role(prime.id).await?,
            None => 0,
        };
        let target_role_headcount = self.identity.count_users_with_role(target_role.id).await?;

        // The quota gates assignment before any rule runs: a full role is a
        // capacity conflict, not a policy denial.
        if action == GovernanceAction::AssignRole && !target_role.has_capacity(target_role_headcount)
        {
            let err = AuthError::conflict(format!(
                "role '{}' has reached its headcount cap of {}",
                target_role.name, target_role.max_headcount
            ));
            self.record(actor, action, &target_role, Err(&err)).await;
            return Err(err);
        }

        let facts = SituationalFacts {
            target_role_headcount,
            target_role_max_headcount: target_role.max_headcount,
            target_role_tier: target_role.tier,
            target_role_scope: target_role.scope,
            prime_admin_count,
            emergency_mode,
        };

        let matching = self
            .rules
            .select(&actor_role_ids, action, context, target_role.id);
        let outcome = evaluate(&matching, &facts);

        self.record(actor, action, &target_role, outcome.as_ref()).await;
        outcome
    }

    /// The actor's held role ids, widened to include the prime role while
    /// emergency mode delegates it to stewards. The overlay is request-scoped
    /// and never persisted.
    async fn actor_role_ids(&self, actor: UserId, emergency_mode: bool) -> AuthResult<Vec<RoleId>> {
        let assignments = self.identity.get_role_assignments(actor).await?;
        let mut role_ids = Vec::new();
        let mut holds_steward = false;

        for assignment in &assignments {
            if !role_ids.contains(&assignment.role_id) {
                role_ids.push(assignment.role_id);
            }
            if let Some(role) = self.identity.get_role(assignment.role_id).await? {
                if role.scope == RoleScope::System && role.tier == STEWARD_TIER {
                    holds_steward = true;
                }
            }
        }

        if emergency_mode && holds_steward {
            if let Some(prime) = self.identity.find_system_role_by_tier(PRIME_TIER).await? {
                if !role_ids.contains(&prime.id) {
                    role_ids.push(prime.id);
                }
            }
        }

        Ok(role_ids)
    }

    async fn record(
        &self,
        actor: UserId,
        action: GovernanceAction,
        target_role: &Role,
        outcome: Result<&Decision, &AuthError>,
    ) {
        let (event_type, detail) = match outcome {
            Ok(decision) => (
                event::GOVERNANCE_ALLOWED,
                json!({ "rule": decision.rule_name }),
            ),
            Err(err) => (event::GOVERNANCE_DENIED, json!({ "error": err.to_string() })),
        };
        self.audit
            .record(AuditEvent::new(
                event_type,
                Some(actor),
                format!("{} on role '{}'", action.as_str(), target_role.name),
                json!({
                    "action": action.as_str(),
                    "target_role_id": target_role.id,
                    "detail": detail,
                }),
            ))
            .await;
    }
}
