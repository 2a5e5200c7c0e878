//! `fleetgate-auth` — the platform's trust boundary.
//!
//! Decides *who the caller is* (DPoP-bound bearer tokens, replay-protected
//! proofs) and *what they may do* (tiered RBAC governed by dynamic,
//! priority-ordered policy rules with emergency-failover semantics).
//!
//! This crate is intentionally decoupled from HTTP and storage: collaborators
//! come in through the trait seams in [`store`], and every operation returns
//! a typed [`error::AuthError`] — no exceptions-as-control-flow across the
//! boundary.

pub mod audit;
pub mod emergency;
pub mod error;
pub mod governance;
pub mod jwk;
pub mod login;
pub mod permissions;
pub mod proof;
pub mod roles;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod testutil;

pub use audit::{AuditEvent, AuditSink, NullAuditSink};
pub use emergency::{EMERGENCY_FLAG_KEY, EmergencyMonitor};
pub use error::{AuthError, AuthResult, ProofRejection};
pub use governance::{
    CmpOp, Decision, GovernanceAction, GovernanceRule, GovernanceService, RuleCondition, RuleSet,
    SituationalFacts, evaluate,
};
pub use jwk::{KeyThumbprint, thumbprint};
pub use login::LoginService;
pub use permissions::{AccessContext, CONTEXT_SWITCH, Effective, PermissionResolver};
pub use proof::{ProofClaims, ProofVerifier, access_token_hash};
pub use roles::{PRIME_TIER, Role, RoleAssignment, RoleScope, STEWARD_TIER};
pub use store::{
    AuthUser, EphemeralStore, IdentityStore, NewRefreshToken, PasswordVerifier,
    RefreshTokenRecord, RefreshTokenStore,
};
pub use token::{AccessTokenClaims, Cnf, TokenConfig, TokenLifecycle, TokenPair};
