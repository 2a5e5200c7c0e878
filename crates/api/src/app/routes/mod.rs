use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod roles;
pub mod system;

/// Router for all authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/revoke-all", post(auth::revoke_all))
        .route("/auth/context-switch", post(auth::context_switch))
        .nest("/admin", roles::router())
}
