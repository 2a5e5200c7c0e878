//! Role-administration endpoints.
//!
//! Two gates in order: the plain permission string (`roles:manage`), then
//! the governance engine — the layer that encodes who may promote/demote
//! whom among privileged tiers. The assignment write itself happens only
//! after both pass, and any change that can affect the top tier triggers a
//! synchronous emergency recompute.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use fleetgate_auth::{
    AccessContext, AuditEvent, GovernanceAction, RoleAssignment, RoleScope, audit::event,
};
use fleetgate_core::{OrganizationId, RoleId, UserId};

use crate::app::dto::RoleChangeRequest;
use crate::app::{errors, services::AuthServices};
use crate::context::{RequestIdentity, RequestedContext};

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/roles/assign", post(assign_role))
        .route("/roles/revoke", post(revoke_role))
}

/// GET /admin/roles — the role catalogue with permissions.
pub async fn list_roles(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(identity): Extension<RequestIdentity>,
    Extension(RequestedContext(context)): Extension<RequestedContext>,
) -> axum::response::Response {
    match require_manage(&services, &identity, context).await {
        Ok(()) => {}
        Err(response) => return response,
    }

    let roles = match services.identity.list_roles().await {
        Ok(roles) => roles,
        Err(err) => return errors::auth_error_to_response(err),
    };

    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        let permissions = match services.identity.get_role_permissions(role.id).await {
            Ok(permissions) => permissions,
            Err(err) => return errors::auth_error_to_response(err),
        };
        out.push(json!({
            "id": role.id,
            "name": role.name,
            "scope": role.scope,
            "tier": role.tier,
            "max_headcount": role.max_headcount,
            "permissions": permissions,
        }));
    }

    (StatusCode::OK, Json(json!({ "roles": out }))).into_response()
}

/// POST /admin/roles/assign
pub async fn assign_role(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(identity): Extension<RequestIdentity>,
    Json(body): Json<RoleChangeRequest>,
) -> axum::response::Response {
    match change_role(&services, &identity, &body, GovernanceAction::AssignRole).await {
        Ok(rule_name) => (
            StatusCode::CREATED,
            Json(json!({ "assigned": true, "rule": rule_name })),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// POST /admin/roles/revoke
pub async fn revoke_role(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(identity): Extension<RequestIdentity>,
    Json(body): Json<RoleChangeRequest>,
) -> axum::response::Response {
    match change_role(&services, &identity, &body, GovernanceAction::RevokeRole).await {
        Ok(rule_name) => (
            StatusCode::OK,
            Json(json!({ "revoked": true, "rule": rule_name })),
        )
            .into_response(),
        Err(response) => response,
    }
}

async fn change_role(
    services: &AuthServices,
    identity: &RequestIdentity,
    body: &RoleChangeRequest,
    action: GovernanceAction,
) -> Result<String, axum::response::Response> {
    let access_context = match body.organization_id {
        Some(org) => AccessContext::Organization(OrganizationId::new(org)),
        None => AccessContext::System,
    };
    let governance_context = match body.organization_id {
        Some(_) => RoleScope::Organization,
        None => RoleScope::System,
    };

    require_manage(services, identity, access_context).await?;

    let decision = services
        .governance
        .authorize(
            identity.user_id,
            action,
            RoleId::new(body.role_id),
            governance_context,
        )
        .await
        .map_err(errors::auth_error_to_response)?;

    let assignment = RoleAssignment {
        user_id: UserId::new(body.user_id),
        role_id: RoleId::new(body.role_id),
        organization_id: body.organization_id.map(OrganizationId::new),
    };

    let (event_type, description) = match action {
        GovernanceAction::AssignRole => {
            services
                .identity
                .create_assignment(assignment)
                .await
                .map_err(errors::auth_error_to_response)?;
            (event::ROLE_ASSIGNED, "role assigned")
        }
        GovernanceAction::RevokeRole => {
            let existed = services
                .identity
                .delete_assignment(&assignment)
                .await
                .map_err(errors::auth_error_to_response)?;
            if !existed {
                return Err(errors::json_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "assignment not found",
                ));
            }
            (event::ROLE_REVOKED, "role revoked")
        }
    };

    // The write may have changed the top tier's headcount.
    if let Err(err) = services.emergency.recompute().await {
        tracing::warn!(error = %err, "emergency recompute after role change failed");
    }

    services
        .audit
        .record(AuditEvent::new(
            event_type,
            Some(identity.user_id),
            description,
            json!({
                "target_user_id": body.user_id,
                "role_id": body.role_id,
                "organization_id": body.organization_id,
                "rule": decision.rule_name,
            }),
        ))
        .await;

    Ok(decision.rule_name)
}

async fn require_manage(
    services: &AuthServices,
    identity: &RequestIdentity,
    context: AccessContext,
) -> Result<(), axum::response::Response> {
    let effective = services
        .resolver
        .resolve(identity.user_id, context, Some(&identity.claims))
        .await
        .map_err(errors::auth_error_to_response)?;
    effective
        .require("roles:manage")
        .map_err(errors::auth_error_to_response)
}
