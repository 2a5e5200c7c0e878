use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use fleetgate_auth::{AccessContext, AuthError};
use fleetgate_core::OrganizationId;

use crate::app::{errors, services::AuthServices};
use crate::context::{RequestIdentity, RequestedContext};

/// Proof header per RFC 9449.
pub const DPOP_HEADER: &str = "DPoP";

/// Organization context header.
pub const ORG_HEADER: &str = "X-Organization-Id";

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AuthServices>,
}

/// Bearer + DPoP authentication for protected routes.
///
/// The access token is decoded first; when the token is key-bound
/// (`cnf.jkt`) or the caller presented a proof anyway, the proof is verified
/// against this exact request (method, path, token hash) and its thumbprint
/// must match the token's binding. A bound token without a valid matching
/// proof never authenticates.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| errors::auth_error_to_response(AuthError::Authentication))?
        .to_string();
    let proof = proof_header(req.headers());

    let claims = state
        .services
        .tokens
        .decode_access(&token)
        .map_err(errors::auth_error_to_response)?;

    let thumbprint = if claims.cnf.is_some() || proof.is_some() {
        let method = req.method().as_str().to_string();
        let path = req.uri().path().to_string();
        let jkt = state
            .services
            .verifier
            .verify(proof.as_deref(), &method, &path, Some(&token))
            .await
            .map_err(errors::auth_error_to_response)?;

        if claims.bound_thumbprint().is_some_and(|bound| bound != jkt.as_str()) {
            return Err(errors::auth_error_to_response(AuthError::Authentication));
        }
        Some(jkt)
    } else {
        None
    };

    let context = requested_context(req.headers())
        .map_err(|_| errors::json_error(axum::http::StatusCode::BAD_REQUEST, "invalid_header", "X-Organization-Id must be an integer"))?;

    req.extensions_mut().insert(RequestIdentity {
        user_id: claims.sub,
        claims,
        thumbprint,
    });
    req.extensions_mut().insert(RequestedContext(context));

    Ok(next.run(req).await)
}

pub fn proof_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DPOP_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn requested_context(headers: &HeaderMap) -> Result<AccessContext, ()> {
    match headers.get(ORG_HEADER) {
        None => Ok(AccessContext::System),
        Some(value) => {
            let org = value
                .to_str()
                .map_err(|_| ())?
                .trim()
                .parse::<i64>()
                .map_err(|_| ())?;
            Ok(AccessContext::Organization(OrganizationId::new(org)))
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
