//! RFC 7638 thumbprints over embedded proof keys.
//!
//! The thumbprint is the stable identifier an access token is bound to
//! (`cnf.jkt`): the required members of the public key, in lexicographic
//! order, JSON-encoded with no whitespace, hashed with SHA-256 and
//! base64url-encoded without padding. Two proofs signed by the same key must
//! always produce the same thumbprint, and keys differing in any member must
//! not collide.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ProofRejection;

/// base64url(SHA-256(canonical JWK members)), no padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyThumbprint(String);

impl KeyThumbprint {
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for KeyThumbprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the RFC 7638 thumbprint of an embedded public key.
///
/// Accepted key types are the ones proofs are verified with: EC P-256
/// (ES256) and OKP Ed25519 (EdDSA). The coordinate strings are already
/// base64url and therefore JSON-safe, so the canonical form can be built
/// directly.
pub fn thumbprint(jwk: &Jwk) -> Result<KeyThumbprint, ProofRejection> {
    let canonical = match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(params) => format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            curve_name(&params.curve)?,
            params.x,
            params.y,
        ),
        AlgorithmParameters::OctetKeyPair(params) => format!(
            r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#,
            curve_name(&params.curve)?,
            params.x,
        ),
        _ => return Err(ProofRejection::UnsupportedKey),
    };

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(KeyThumbprint(URL_SAFE_NO_PAD.encode(digest)))
}

fn curve_name(curve: &EllipticCurve) -> Result<&'static str, ProofRejection> {
    match curve {
        EllipticCurve::P256 => Ok("P-256"),
        EllipticCurve::Ed25519 => Ok("Ed25519"),
        _ => Err(ProofRejection::UnsupportedKey),
    }
}
