//! DPoP proof verification.
//!
//! Proves the caller controls the private key matching the public key
//! embedded in each request's proof, and prevents proof replay — independent
//! of whatever bearer token is presented.
//!
//! A proof is a compact JWT of type `dpop+jwt` whose header embeds the
//! public key (`jwk`) and whose payload binds the proof to one request:
//! `jti` (replay id), `nonce` (server-issued, single-use), `iat`, `htm`
//! (method), `htu` (URL, compared by path only), and optionally `ath`
//! (hash of the bound access token).
//!
//! Replay and nonce state live in the shared ephemeral store; the store's
//! atomic set-if-absent / delete-if-present primitives are the sole
//! correctness mechanism under concurrent retries.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use fleetgate_core::Clock;

use crate::error::{AuthError, AuthResult, ProofRejection};
use crate::jwk::{KeyThumbprint, thumbprint};
use crate::store::EphemeralStore;

/// Required JWT `typ` on every proof.
pub const PROOF_TYPE: &str = "dpop+jwt";

/// Acceptable skew on the proof's `iat`, either direction.
pub const PROOF_MAX_AGE_SECS: i64 = 60;

/// Replay markers must outlive the freshness window.
pub const REPLAY_MARKER_TTL: Duration = Duration::from_secs(120);

/// Server-issued nonces are single-use and short-lived.
pub const NONCE_TTL: Duration = Duration::from_secs(300);

const NONCE_KEY_PREFIX: &str = "auth:dpop:nonce:";
const REPLAY_KEY_PREFIX: &str = "auth:dpop:jti:";

/// Claims carried by a proof JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofClaims {
    pub jti: String,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    pub htm: String,
    pub htu: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

/// Verifies proofs and manages the nonce/replay lifecycle.
pub struct ProofVerifier {
    store: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
}

impl ProofVerifier {
    pub fn new(store: Arc<dyn EphemeralStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a fresh single-use nonce, stored with [`NONCE_TTL`].
    pub async fn issue_nonce(&self) -> AuthResult<String> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = URL_SAFE_NO_PAD.encode(bytes);
        self.store
            .set_with_ttl(&format!("{NONCE_KEY_PREFIX}{nonce}"), "1", Some(NONCE_TTL))
            .await?;
        Ok(nonce)
    }

    /// Verify a proof against the actual request, returning the RFC 7638
    /// thumbprint of the embedded key.
    ///
    /// `bound_access_token` must be supplied on DPoP-bound endpoints so the
    /// `ath` claim is enforced.
    ///
    /// Every failure also issues a fresh nonce (carried in the error) so the
    /// caller's retry is unblocked.
    pub async fn verify(
        &self,
        proof: Option<&str>,
        method: &str,
        path: &str,
        bound_access_token: Option<&str>,
    ) -> AuthResult<KeyThumbprint> {
        let Some(proof) = proof else {
            return Err(self.reject(ProofRejection::MissingHeader).await);
        };

        let header = match decode_header(proof) {
            Ok(header) => header,
            Err(_) => return Err(self.reject(ProofRejection::Malformed).await),
        };
        if header.typ.as_deref() != Some(PROOF_TYPE) {
            return Err(self.reject(ProofRejection::Malformed).await);
        }
        // Asymmetric self-signed proofs only; an HMAC "proof" signed with a
        // public value proves nothing.
        if !matches!(header.alg, Algorithm::ES256 | Algorithm::EdDSA) {
            return Err(self.reject(ProofRejection::UnsupportedKey).await);
        }
        let Some(embedded_key) = header.jwk else {
            return Err(self.reject(ProofRejection::Malformed).await);
        };
        let decoding_key = match DecodingKey::from_jwk(&embedded_key) {
            Ok(key) => key,
            Err(_) => return Err(self.reject(ProofRejection::UnsupportedKey).await),
        };

        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims = Default::default();
        validation.validate_exp = false;
        validation.validate_aud = false;
        let claims = match decode::<ProofClaims>(proof, &decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(err) => {
                let reason = match err.kind() {
                    ErrorKind::InvalidSignature => ProofRejection::BadSignature,
                    _ => ProofRejection::Malformed,
                };
                return Err(self.reject(reason).await);
            }
        };

        // The replay marker is recorded before the remaining checks run: a
        // proof burns its jti even when a later check fails, and the atomic
        // set-if-absent closes the race where two concurrent requests both
        // pass the replay check.
        let replay_key = format!("{REPLAY_KEY_PREFIX}{}", claims.jti);
        if !self
            .store
            .set_if_absent(&replay_key, "1", REPLAY_MARKER_TTL)
            .await?
        {
            return Err(self.reject(ProofRejection::Replayed).await);
        }

        // Single-use: the nonce is spent on retrieval, whether or not the
        // rest of verification succeeds.
        let nonce_ok = match &claims.nonce {
            Some(nonce) => {
                self.store
                    .delete_if_present(&format!("{NONCE_KEY_PREFIX}{nonce}"))
                    .await?
            }
            None => false,
        };
        if !nonce_ok {
            return Err(self.reject(ProofRejection::InvalidNonce).await);
        }

        let now = self.clock.now().timestamp();
        match claims.iat {
            Some(iat) if (now - iat).abs() <= PROOF_MAX_AGE_SECS => {}
            _ => return Err(self.reject(ProofRejection::Stale).await),
        }

        if !claims.htm.eq_ignore_ascii_case(method) {
            return Err(self.reject(ProofRejection::MethodMismatch).await);
        }

        // Path component only: scheme/host are ignored so proofs survive
        // reverse proxies and port rewrites.
        if request_path(&claims.htu) != path {
            return Err(self.reject(ProofRejection::UriMismatch).await);
        }

        if let Some(token) = bound_access_token {
            if claims.ath.as_deref() != Some(access_token_hash(token).as_str()) {
                return Err(self.reject(ProofRejection::TokenHashMismatch).await);
            }
        }

        match thumbprint(&embedded_key) {
            Ok(jkt) => Ok(jkt),
            Err(reason) => Err(self.reject(reason).await),
        }
    }

    /// Build the rejection, issuing a fresh nonce best-effort: a store
    /// failure while minting the retry nonce must not mask the original
    /// rejection.
    async fn reject(&self, reason: ProofRejection) -> AuthError {
        let new_nonce = match self.issue_nonce().await {
            Ok(nonce) => Some(nonce),
            Err(err) => {
                tracing::warn!(error = %err, "failed to issue retry nonce");
                None
            }
        };
        AuthError::InvalidProof { reason, new_nonce }
    }
}

/// base64url(SHA-256(token)) with padding stripped — the `ath` binding value.
pub fn access_token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Path component of a declared `htu`.
fn request_path(htu: &str) -> &str {
    let stripped = htu.split(['?', '#']).next().unwrap_or(htu);
    match stripped.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => "/",
        },
        None => stripped,
    }
}
