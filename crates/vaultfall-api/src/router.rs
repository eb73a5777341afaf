//! Axum router construction for the Vault API.
//!
//! Assembles all routes into a single [`Router`] with CORS middleware
//! enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the Vault API server.
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // Vault collection
        .route(
            "/api/vaults",
            get(handlers::list_vaults).post(handlers::create_vault),
        )
        // Single vault
        .route("/api/vaults/{id}", get(handlers::get_vault))
        .route("/api/vaults/{id}/state", get(handlers::get_vault_state))
        .route("/api/vaults/{id}/pause", post(handlers::pause_vault))
        .route("/api/vaults/{id}/resume", post(handlers::resume_vault))
        .route("/api/vaults/{id}/tick", post(handlers::force_tick))
        // Incidents
        .route("/api/vaults/{id}/incidents", get(handlers::list_incidents))
        .route(
            "/api/vaults/{id}/incidents/{incident_id}/resolve",
            post(handlers::resolve_incident),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
