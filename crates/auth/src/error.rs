//! Error taxonomy of the trust boundary.
//!
//! Every operation exposed by this crate fails with [`AuthError`]. Store I/O
//! failures are translated to [`AuthError::Store`] at the seam and treated as
//! fail-closed: no ambient authorization when a backing store is unavailable.

use thiserror::Error;

/// Result type used across the trust boundary.
pub type AuthResult<T> = Result<T, AuthError>;

/// Why a DPoP proof was rejected.
///
/// The variant is surfaced to the caller (it is safe challenge feedback);
/// anything more specific stays in server logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRejection {
    /// No `DPoP` header on the request.
    MissingHeader,
    /// The header did not decode as a proof JWT carrying an embedded key.
    Malformed,
    /// Embedded key type/curve/algorithm is not accepted.
    UnsupportedKey,
    /// Signature did not verify against the embedded public key.
    BadSignature,
    /// The proof's `jti` was already seen.
    Replayed,
    /// The `nonce` claim is missing, unknown, or already spent.
    InvalidNonce,
    /// `iat` absent or outside the freshness window.
    Stale,
    /// `htm` does not match the actual request method.
    MethodMismatch,
    /// `htu` path does not match the actual request path.
    UriMismatch,
    /// `ath` does not match the bound access token.
    TokenHashMismatch,
}

impl ProofRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofRejection::MissingHeader => "missing proof",
            ProofRejection::Malformed => "malformed proof",
            ProofRejection::UnsupportedKey => "unsupported proof key",
            ProofRejection::BadSignature => "bad proof signature",
            ProofRejection::Replayed => "proof reused",
            ProofRejection::InvalidNonce => "missing/invalid nonce",
            ProofRejection::Stale => "expired proof",
            ProofRejection::MethodMismatch => "method mismatch",
            ProofRejection::UriMismatch => "url mismatch",
            ProofRejection::TokenHashMismatch => "token hash mismatch",
        }
    }
}

impl core::fmt::Display for ProofRejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy of the trust boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// DPoP verification failure. Carries a fresh server-issued nonce
    /// whenever the store could mint one, so the caller's retry is
    /// unblocked without a second round trip.
    #[error("invalid proof: {reason}")]
    InvalidProof {
        reason: ProofRejection,
        new_nonce: Option<String>,
    },

    /// Bad credentials or an invalid/expired/revoked token. Deliberately
    /// carries no detail: callers must not be able to distinguish "user not
    /// found", "wrong password", "token revoked" and "token expired".
    #[error("authentication failed")]
    Authentication,

    /// The caller lacks the named permission string.
    #[error("forbidden: missing permission '{0}'")]
    PermissionDenied(String),

    /// A governance rule explicitly denied the action, or no rule allowed it.
    #[error("forbidden by governance rule: {}", rule.as_deref().unwrap_or("no matching rule"))]
    Forbidden { rule: Option<String> },

    /// A capacity constraint was hit (e.g. role headcount cap).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A backing store failed or timed out. The payload is for logs only;
    /// the Display form never leaks store internals.
    #[error("auth store unavailable")]
    Store(String),
}

impl AuthError {
    pub fn store(err: impl core::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn denied_rule(rule_name: impl Into<String>) -> Self {
        Self::Forbidden {
            rule: Some(rule_name.into()),
        }
    }

    pub fn no_matching_rule() -> Self {
        Self::Forbidden { rule: None }
    }
}
