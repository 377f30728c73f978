//! Route definitions

use axum::{Router, extract::State, routing::get, routing::post};

use crate::{handlers, openapi::create_openapi_routes, state::AppState};

/// Renders the process' Prometheus metrics in text exposition format.
async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus.render()
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and readiness
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(metrics))
        // Detection/ban-list query surface
        .route("/api/stats", get(handlers::api::stats))
        .route("/api/users", get(handlers::api::users))
        .route("/api/violators", get(handlers::api::violators))
        .route("/api/banlist", get(handlers::api::banlist))
        .route("/api/banlist/clear", post(handlers::api::clear_banlist))
        .route("/api/user/{email}", get(handlers::api::user_detail))
        .route("/api/nodes", get(handlers::api::nodes))
        .route("/api/shared_ips", get(handlers::api::shared_ips))
        // OpenAPI documentation
        .merge(create_openapi_routes())
        // Attach state
        .with_state(state)
}
