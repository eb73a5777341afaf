//! Integration tests for the Vault API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use vaultfall_api::router::build_router;
use vaultfall_api::state::AppState;
use vaultfall_engine::TickProcessor;
use vaultfall_sim::config::SimulationConfig;
use vaultfall_store::VaultStore;

fn make_router() -> Router {
    let store = Arc::new(VaultStore::memory());
    let processor = Arc::new(TickProcessor::new(
        Arc::clone(&store),
        &SimulationConfig::default(),
    ));
    build_router(Arc::new(AppState::new(store, processor)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_vault(router: &Router, name: &str) -> Value {
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/vaults")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "name": name }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn index_serves_html() {
    let router = make_router();
    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_then_list_vaults() {
    let router = make_router();

    let created = create_vault(&router, "Vault 42").await;
    assert_eq!(created["is_active"], json!(true));
    assert_eq!(created["is_paused"], json!(false));
    assert_eq!(created["total_game_time"], json!(0));

    let response = router
        .oneshot(Request::get("/api/vaults").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn create_vault_rejects_blank_name() {
    let router = make_router();
    let response = router
        .oneshot(
            Request::post("/api/vaults")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "name": "   " }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_vault_view_includes_layout() {
    let router = make_router();
    let created = create_vault(&router, "Vault 9").await;
    let id = created["vault_id"].as_str().unwrap().to_owned();

    let response = router
        .oneshot(
            Request::get(format!("/api/vaults/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = body_json(response).await;
    assert_eq!(view["name"], json!("Vault 9"));
    assert!(view["rooms"].as_array().is_some_and(|r| !r.is_empty()));
    assert!(view["dwellers"].as_array().is_some_and(|d| !d.is_empty()));
    assert_eq!(view["incidents"], json!([]));
    // Display projection floors to integers.
    assert_eq!(view["resources_display"]["power"], json!(500));
}

#[tokio::test]
async fn unknown_vault_is_404_and_bad_uuid_is_400() {
    let router = make_router();

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/vaults/{}/state", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(
            Request::get("/api/vaults/not-a-uuid/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pause_resume_cycle() {
    let router = make_router();
    let created = create_vault(&router, "Vault 13").await;
    let id = created["vault_id"].as_str().unwrap().to_owned();

    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/api/vaults/{id}/pause"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let paused = body_json(response).await;
    assert_eq!(paused["is_paused"], json!(true));

    // Pausing again is a no-op, not an error.
    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/api/vaults/{id}/pause"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::post(format!("/api/vaults/{id}/resume"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let resumed = body_json(response).await;
    assert_eq!(resumed["is_paused"], json!(false));
}

#[tokio::test]
async fn forced_tick_returns_result() {
    let router = make_router();
    let created = create_vault(&router, "Vault 7").await;
    let id = created["vault_id"].as_str().unwrap().to_owned();

    let response = router
        .oneshot(
            Request::post(format!("/api/vaults/{id}/tick"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = body_json(response).await;
    assert_eq!(result["vault_id"].as_str(), Some(id.as_str()));
    assert!(result["elapsed_seconds"].as_u64().is_some());
    assert!(result["total_game_time"].as_u64().is_some());
}

#[tokio::test]
async fn forced_tick_on_paused_vault_is_conflict() {
    let router = make_router();
    let created = create_vault(&router, "Vault 3").await;
    let id = created["vault_id"].as_str().unwrap().to_owned();

    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/api/vaults/{id}/pause"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::post(format!("/api/vaults/{id}/tick"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn incidents_listing_and_filters() {
    let router = make_router();
    let created = create_vault(&router, "Vault 5").await;
    let id = created["vault_id"].as_str().unwrap().to_owned();

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/vaults/{id}/incidents"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/vaults/{id}/incidents?status=unresolved"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get(format!("/api/vaults/{id}/incidents?status=bogus"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resolve_missing_incident_is_404() {
    let router = make_router();
    let created = create_vault(&router, "Vault 2").await;
    let id = created["vault_id"].as_str().unwrap().to_owned();

    let response = router
        .oneshot(
            Request::post(format!(
                "/api/vaults/{id}/incidents/{}/resolve",
                uuid::Uuid::new_v4()
            ))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "enemies_defeated": 3 }).to_string()))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
