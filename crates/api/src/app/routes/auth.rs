//! Login, refresh, revocation and context-switch endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use serde_json::json;

use fleetgate_auth::{
    AccessContext, AuditEvent, CONTEXT_SWITCH, KeyThumbprint, audit::event,
};
use fleetgate_core::OrganizationId;

use crate::app::dto::{
    ContextSwitchRequest, ContextSwitchResponse, LoginRequest, RefreshRequest, TokenResponse,
};
use crate::app::{errors, services::AuthServices};
use crate::context::RequestIdentity;
use crate::middleware;

/// POST /auth/login — credential login, optionally DPoP-bound.
///
/// Binding is opt-in here: a caller that presents a proof gets a bound pair
/// (and any invalid proof is rejected outright); a caller without one gets a
/// plain bearer pair.
pub async fn login(
    Extension(services): Extension<Arc<AuthServices>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    let thumbprint = match verify_optional_proof(&services, &headers, uri.path()).await {
        Ok(thumbprint) => thumbprint,
        Err(response) => return response,
    };

    match services
        .login
        .login(&body.email, &body.password, thumbprint.as_ref())
        .await
    {
        Ok((_user_id, pair)) => (
            StatusCode::OK,
            Json(TokenResponse::from_pair(pair, thumbprint.is_some())),
        )
            .into_response(),
        Err(err) => errors::auth_error_to_response(err),
    }
}

/// POST /auth/refresh — rotate a refresh token.
pub async fn refresh(
    Extension(services): Extension<Arc<AuthServices>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> axum::response::Response {
    let thumbprint = match verify_optional_proof(&services, &headers, uri.path()).await {
        Ok(thumbprint) => thumbprint,
        Err(response) => return response,
    };

    match services
        .tokens
        .rotate(&body.refresh_token, thumbprint.as_ref())
        .await
    {
        Ok((_user_id, pair)) => (
            StatusCode::OK,
            Json(TokenResponse::from_pair(pair, thumbprint.is_some())),
        )
            .into_response(),
        Err(err) => errors::auth_error_to_response(err),
    }
}

/// POST /auth/revoke-all — revoke every refresh token of the caller
/// (account-compromise response).
pub async fn revoke_all(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(identity): Extension<RequestIdentity>,
) -> axum::response::Response {
    match services.tokens.revoke_all(identity.user_id).await {
        Ok(revoked) => {
            services
                .audit
                .record(AuditEvent::new(
                    event::TOKENS_REVOKED,
                    Some(identity.user_id),
                    "all refresh tokens revoked",
                    json!({ "revoked": revoked }),
                ))
                .await;
            (StatusCode::OK, Json(json!({ "revoked": revoked }))).into_response()
        }
        Err(err) => errors::auth_error_to_response(err),
    }
}

/// POST /auth/context-switch — issue an access token carrying a temporary
/// organization context.
pub async fn context_switch(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(identity): Extension<RequestIdentity>,
    Json(body): Json<ContextSwitchRequest>,
) -> axum::response::Response {
    let effective = match services
        .resolver
        .resolve(identity.user_id, AccessContext::System, Some(&identity.claims))
        .await
    {
        Ok(effective) => effective,
        Err(err) => return errors::auth_error_to_response(err),
    };
    if let Err(err) = effective.require(CONTEXT_SWITCH) {
        return errors::auth_error_to_response(err);
    }

    let organization_id = OrganizationId::new(body.organization_id);
    let access_token = match services
        .tokens
        .reissue_with_temp_org(&identity.claims, organization_id)
    {
        Ok(token) => token,
        Err(err) => return errors::auth_error_to_response(err),
    };

    services
        .audit
        .record(AuditEvent::new(
            event::CONTEXT_SWITCHED,
            Some(identity.user_id),
            "temporary organization context issued",
            json!({ "organization_id": organization_id }),
        ))
        .await;

    (
        StatusCode::OK,
        Json(ContextSwitchResponse {
            access_token,
            organization_id: body.organization_id,
        }),
    )
        .into_response()
}

/// Verify the `DPoP` header when present. Absence is fine on these
/// endpoints; an invalid proof never is.
async fn verify_optional_proof(
    services: &AuthServices,
    headers: &HeaderMap,
    path: &str,
) -> Result<Option<KeyThumbprint>, axum::response::Response> {
    match middleware::proof_header(headers) {
        None => Ok(None),
        Some(proof) => services
            .verifier
            .verify(Some(&proof), "POST", path, None)
            .await
            .map(Some)
            .map_err(errors::auth_error_to_response),
    }
}
