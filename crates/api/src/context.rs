use fleetgate_auth::{AccessContext, AccessTokenClaims, KeyThumbprint};
use fleetgate_core::UserId;

/// Authenticated identity of a request, derived by the auth middleware.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user_id: UserId,
    pub claims: AccessTokenClaims,
    /// Present when the request carried a valid proof.
    pub thumbprint: Option<KeyThumbprint>,
}

/// The organization context the request asked to be resolved against
/// (`X-Organization-Id` header; absent = SYSTEM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedContext(pub AccessContext);
