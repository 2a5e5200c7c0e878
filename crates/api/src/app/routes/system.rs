use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use fleetgate_auth::AccessContext;

use crate::app::{errors, services::AuthServices};
use crate::context::{RequestIdentity, RequestedContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /system/emergency — current emergency-mode level state.
pub async fn emergency(
    Extension(services): Extension<Arc<AuthServices>>,
) -> axum::response::Response {
    match services.emergency.is_active().await {
        Ok(active) => (StatusCode::OK, Json(json!({ "active": active }))).into_response(),
        Err(_) => errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "emergency state unavailable",
        ),
    }
}

/// GET /whoami — the caller's identity and effective permissions in the
/// requested context.
pub async fn whoami(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(identity): Extension<RequestIdentity>,
    Extension(RequestedContext(context)): Extension<RequestedContext>,
) -> axum::response::Response {
    let effective = match services
        .resolver
        .resolve(identity.user_id, context, Some(&identity.claims))
        .await
    {
        Ok(effective) => effective,
        Err(err) => return errors::auth_error_to_response(err),
    };

    let mut permissions: Vec<String> = effective.permissions.iter().cloned().collect();
    permissions.sort();

    let context_json = match context {
        AccessContext::System => json!("SYSTEM"),
        AccessContext::Organization(org) => json!(org),
    };

    (
        StatusCode::OK,
        Json(json!({
            "user_id": identity.user_id,
            "context": context_json,
            "permissions": permissions,
            "org_member": effective.org_member,
            "emergency_overlay": effective.emergency_overlay,
            "proof_bound": identity.thumbprint.is_some(),
        })),
    )
        .into_response()
}
