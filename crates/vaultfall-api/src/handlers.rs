//! REST API endpoint handlers for the Vault server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/vaults` | List all vault scheduling records |
//! | `POST` | `/api/vaults` | Create a vault with the starter layout |
//! | `GET` | `/api/vaults/:id` | Full vault view |
//! | `GET` | `/api/vaults/:id/state` | Scheduling record only |
//! | `POST` | `/api/vaults/:id/pause` | Suspend scheduled ticks |
//! | `POST` | `/api/vaults/:id/resume` | Resume scheduled ticks |
//! | `POST` | `/api/vaults/:id/tick` | Force an immediate tick |
//! | `GET` | `/api/vaults/:id/incidents` | List incidents (filterable) |
//! | `POST` | `/api/vaults/:id/incidents/:incident_id/resolve` | Resolve an incident |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use uuid::Uuid;
use vaultfall_types::{
    Dweller, GameState, Incident, IncidentStatus, Room, TickResult, VaultId, VaultResources,
};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

/// Body for `POST /api/vaults`.
#[derive(Debug, serde::Deserialize)]
pub struct CreateVaultBody {
    /// Display name for the new vault.
    pub name: String,
}

/// Query parameters for `GET /api/vaults/:id/incidents`.
#[derive(Debug, serde::Deserialize)]
pub struct IncidentsQuery {
    /// Filter by status: `active`, `spreading`, `resolved`, or
    /// `unresolved` (active + spreading).
    pub status: Option<String>,
}

/// Body for the incident resolve endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct ResolveBody {
    /// Whether the resolution fight was won. Loot and penalty effects
    /// belong to the combat collaborator; the incident is terminal
    /// either way.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Enemies defeated in the resolution fight, if any.
    #[serde(default)]
    pub enemies_defeated: u32,
}

impl Default for ResolveBody {
    fn default() -> Self {
        Self {
            success: true,
            enemies_defeated: 0,
        }
    }
}

const fn default_success() -> bool {
    true
}

/// Full vault view for the dashboard.
#[derive(Debug, serde::Serialize)]
pub struct VaultView {
    /// Scheduling record.
    pub state: GameState,
    /// Display name.
    pub name: String,
    /// Resource levels (exact, fractional).
    pub resources: VaultResources,
    /// Floor-rounded resource levels for display.
    pub resources_display: ResourcesDisplay,
    /// Room layout in positional order.
    pub rooms: Vec<Room>,
    /// All dwellers.
    pub dwellers: Vec<Dweller>,
    /// Unresolved incidents only; history is on the incidents endpoint.
    pub incidents: Vec<Incident>,
}

/// Floor-rounded resource projection.
#[derive(Debug, serde::Serialize)]
pub struct ResourcesDisplay {
    /// Power, floored.
    pub power: u64,
    /// Food, floored.
    pub food: u64,
    /// Water, floored.
    pub water: u64,
}

fn parse_vault_id(raw: &str) -> Result<VaultId, ApiError> {
    raw.parse::<Uuid>()
        .map(VaultId::from)
        .map_err(|_| ApiError::InvalidUuid(format!("invalid vault id: {raw}")))
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing server status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let states = state.store.list_states().await;
    let vault_count = states.len();
    let paused_count = states.iter().filter(|s| s.is_paused).count();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Vaultfall</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>Vaultfall</h1>
    <p>Status: <span class="status">RUNNING</span></p>
    <div>
        <div class="metric">
            <div class="label">Vaults</div>
            <div class="value">{vault_count}</div>
        </div>
        <div class="metric">
            <div class="label">Paused</div>
            <div class="value">{paused_count}</div>
        </div>
    </div>
    <ul>
        <li><a href="/api/vaults">/api/vaults</a></li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// Vault collection
// ---------------------------------------------------------------------------

/// `GET /api/vaults` -- scheduling records for all vaults.
pub async fn list_vaults(State(state): State<Arc<AppState>>) -> Json<Vec<GameState>> {
    let mut states = state.store.list_states().await;
    states.sort_by_key(|s| s.vault_id);
    Json(states)
}

/// `POST /api/vaults` -- create a vault with the starter layout.
pub async fn create_vault(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateVaultBody>,
) -> Result<Json<GameState>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::InvalidQuery("vault name must not be empty".into()));
    }
    let new_vault = vaultfall_engine::seed::starter_vault(body.name.trim());
    let created = state.store.create_vault(new_vault).await?;
    Ok(Json(created))
}

// ---------------------------------------------------------------------------
// Single vault
// ---------------------------------------------------------------------------

/// `GET /api/vaults/:id` -- full vault view.
pub async fn get_vault(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VaultView>, ApiError> {
    let vault_id = parse_vault_id(&id)?;
    let snapshot = state.store.snapshot(vault_id).await?;

    let incidents = snapshot
        .incidents
        .iter()
        .filter(|i| i.is_unresolved())
        .cloned()
        .collect();

    Ok(Json(VaultView {
        state: snapshot.state,
        name: snapshot.name,
        resources: snapshot.resources,
        resources_display: ResourcesDisplay {
            power: snapshot.resources.power.display(),
            food: snapshot.resources.food.display(),
            water: snapshot.resources.water.display(),
        },
        rooms: snapshot.rooms,
        dwellers: snapshot.dwellers,
        incidents,
    }))
}

/// `GET /api/vaults/:id/state` -- scheduling record only.
pub async fn get_vault_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GameState>, ApiError> {
    let vault_id = parse_vault_id(&id)?;
    let game_state = state.store.game_state(vault_id).await?;
    Ok(Json(game_state))
}

/// `POST /api/vaults/:id/pause` -- suspend scheduled ticks. Idempotent.
pub async fn pause_vault(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GameState>, ApiError> {
    let vault_id = parse_vault_id(&id)?;
    let game_state = state.store.pause(vault_id).await?;
    Ok(Json(game_state))
}

/// `POST /api/vaults/:id/resume` -- resume scheduled ticks, re-anchoring
/// the tick clock to now. Idempotent.
pub async fn resume_vault(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GameState>, ApiError> {
    let vault_id = parse_vault_id(&id)?;
    let game_state = state.store.resume(vault_id).await?;
    Ok(Json(game_state))
}

/// `POST /api/vaults/:id/tick` -- force an immediate tick. Conflicts
/// (paused vault, tick already in flight) answer 409.
pub async fn force_tick(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TickResult>, ApiError> {
    let vault_id = parse_vault_id(&id)?;
    let result = state.processor.force_tick(vault_id).await?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// `GET /api/vaults/:id/incidents` -- list incidents, optionally
/// filtered by status.
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<IncidentsQuery>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let vault_id = parse_vault_id(&id)?;

    let incidents = match query.status.as_deref() {
        None => state.store.list_incidents(vault_id, None).await?,
        Some("active") => {
            state
                .store
                .list_incidents(vault_id, Some(IncidentStatus::Active))
                .await?
        }
        Some("spreading") => {
            state
                .store
                .list_incidents(vault_id, Some(IncidentStatus::Spreading))
                .await?
        }
        Some("resolved") => {
            state
                .store
                .list_incidents(vault_id, Some(IncidentStatus::Resolved))
                .await?
        }
        Some("unresolved") => {
            let all = state.store.list_incidents(vault_id, None).await?;
            all.into_iter().filter(Incident::is_unresolved).collect()
        }
        Some(other) => {
            return Err(ApiError::InvalidQuery(format!(
                "unknown status filter: {other}"
            )));
        }
    };

    Ok(Json(incidents))
}

/// `POST /api/vaults/:id/incidents/:incident_id/resolve` -- resolve an
/// incident (player action). Idempotent on an already-resolved incident.
pub async fn resolve_incident(
    State(state): State<Arc<AppState>>,
    Path((id, incident_id)): Path<(String, String)>,
    body: Option<Json<ResolveBody>>,
) -> Result<Json<Incident>, ApiError> {
    let vault_id = parse_vault_id(&id)?;
    let incident_id = incident_id
        .parse::<Uuid>()
        .map(vaultfall_types::IncidentId::from)
        .map_err(|_| ApiError::InvalidUuid(format!("invalid incident id: {incident_id}")))?;

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let incident = state
        .store
        .resolve_incident(vault_id, incident_id, body.enemies_defeated)
        .await?;
    tracing::info!(
        vault_id = %vault_id,
        incident_id = %incident_id,
        success = body.success,
        enemies_defeated = body.enemies_defeated,
        "Incident resolved"
    );
    Ok(Json(incident))
}
