//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store wiring (in-memory for dev/test, Postgres + Redis
//!   behind the `redis` feature)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses (401s carry the `DPoP-Nonce`
//!   challenge)

use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router, routing::get};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// How often the defensive emergency sweep re-derives the flag.
const EMERGENCY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String) -> Router {
    let services = Arc::new(services::build_services(jwt_secret).await);

    // Defensive background sweep: catches top-tier headcount changes that
    // bypassed the synchronous recompute (e.g. a direct data fix).
    {
        let emergency = services.emergency.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EMERGENCY_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(err) = emergency.recompute().await {
                    tracing::warn!(error = %err, "emergency sweep failed");
                }
            }
        });
    }

    let auth_state = middleware::AuthState {
        services: services.clone(),
    };

    let protected = routes::protected_router()
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ))
        .layer(Extension(services.clone()));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/system/emergency", get(routes::system::emergency))
        .route("/auth/login", axum::routing::post(routes::auth::login))
        .route("/auth/refresh", axum::routing::post(routes::auth::refresh))
        .layer(Extension(services))
        .merge(protected)
}
