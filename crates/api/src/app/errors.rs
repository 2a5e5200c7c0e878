use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;

use fleetgate_auth::AuthError;

/// Challenge header carrying a fresh nonce on proof failures.
pub const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";

/// Map a core auth error onto the HTTP surface.
///
/// - proof failures: 401 with a `DPoP-Nonce` challenge so the retry is
///   unblocked
/// - authentication failures: 401 with a deliberately generic body
/// - permission/governance failures: 403 with the missing permission or the
///   deciding rule
/// - capacity: 409
/// - store failures: fail closed as a generic 401
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidProof { reason, new_nonce } => {
            let mut response = json_error(StatusCode::UNAUTHORIZED, "invalid_proof", reason.to_string());
            if let Some(nonce) = new_nonce {
                if let Ok(value) = HeaderValue::from_str(&nonce) {
                    response.headers_mut().insert(DPOP_NONCE_HEADER, value);
                }
            }
            response
        }
        AuthError::Authentication => {
            json_error(StatusCode::UNAUTHORIZED, "authentication_failed", "authentication failed")
        }
        AuthError::PermissionDenied(permission) => json_error(
            StatusCode::FORBIDDEN,
            "permission_denied",
            format!("missing permission '{permission}'"),
        ),
        AuthError::Forbidden { rule } => json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            match rule {
                Some(rule) => format!("denied by governance rule '{rule}'"),
                None => "no governance rule allows this action".to_string(),
            },
        ),
        AuthError::Conflict(message) => json_error(StatusCode::CONFLICT, "conflict", message),
        AuthError::Store(detail) => {
            tracing::warn!(detail = %detail, "auth store failure; failing closed");
            json_error(StatusCode::UNAUTHORIZED, "authentication_failed", "authentication failed")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
