//! `PostgreSQL` persistence operations for vault state.
//!
//! A tick commit is one transaction touching the vault row, the dweller
//! rows, and the incident rows; either the whole tick lands durably or
//! none of it does. Batch updates use UNNEST so a vault with many
//! dwellers still costs a single round-trip.
//!
//! Incident upserts from the tick path carry a status guard: a row a
//! player already resolved is never overwritten back to unresolved by a
//! tick that was computed against a stale snapshot.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vaultfall_types::{
    Dweller, GameState, Incident, IncidentKind, IncidentStatus, ResourceKind, ResourcePool, Room,
    VaultId, VaultResources,
};

use crate::error::StoreError;
use crate::store::{TickCommit, VaultSnapshot};

// =========================================================================
// Enum <-> database text conversions
// =========================================================================

const fn resource_kind_to_db(kind: ResourceKind) -> &'static str {
    kind.as_str()
}

fn resource_kind_from_db(value: &str) -> Result<ResourceKind, StoreError> {
    match value {
        "power" => Ok(ResourceKind::Power),
        "food" => Ok(ResourceKind::Food),
        "water" => Ok(ResourceKind::Water),
        other => Err(StoreError::Config(format!(
            "unknown resource kind in database: {other}"
        ))),
    }
}

const fn incident_kind_to_db(kind: IncidentKind) -> &'static str {
    match kind {
        IncidentKind::RaiderAttack => "raider_attack",
        IncidentKind::Infestation => "infestation",
        IncidentKind::Fire => "fire",
        IncidentKind::RadiationLeak => "radiation_leak",
        IncidentKind::ElectricalFailure => "electrical_failure",
        IncidentKind::WaterContamination => "water_contamination",
    }
}

fn incident_kind_from_db(value: &str) -> Result<IncidentKind, StoreError> {
    match value {
        "raider_attack" => Ok(IncidentKind::RaiderAttack),
        "infestation" => Ok(IncidentKind::Infestation),
        "fire" => Ok(IncidentKind::Fire),
        "radiation_leak" => Ok(IncidentKind::RadiationLeak),
        "electrical_failure" => Ok(IncidentKind::ElectricalFailure),
        "water_contamination" => Ok(IncidentKind::WaterContamination),
        other => Err(StoreError::Config(format!(
            "unknown incident kind in database: {other}"
        ))),
    }
}

const fn incident_status_to_db(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Active => "active",
        IncidentStatus::Spreading => "spreading",
        IncidentStatus::Resolved => "resolved",
    }
}

fn incident_status_from_db(value: &str) -> Result<IncidentStatus, StoreError> {
    match value {
        "active" => Ok(IncidentStatus::Active),
        "spreading" => Ok(IncidentStatus::Spreading),
        "resolved" => Ok(IncidentStatus::Resolved),
        other => Err(StoreError::Config(format!(
            "unknown incident status in database: {other}"
        ))),
    }
}

// =========================================================================
// Row types
// =========================================================================

#[derive(Debug, sqlx::FromRow)]
struct VaultRow {
    id: Uuid,
    name: String,
    is_active: bool,
    is_paused: bool,
    last_tick_time: DateTime<Utc>,
    total_game_time: i64,
    power: f64,
    power_max: f64,
    food: f64,
    food_max: f64,
    water: f64,
    water_max: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    vault_id: Uuid,
    name: String,
    produces: Option<String>,
    output: f64,
    size: i32,
    tier: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct DwellerRow {
    id: Uuid,
    vault_id: Uuid,
    name: String,
    room_id: Option<Uuid>,
    health: f64,
    is_alive: bool,
    ability: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct IncidentRow {
    id: Uuid,
    vault_id: Uuid,
    kind: String,
    status: String,
    room_id: Uuid,
    rooms_affected: serde_json::Value,
    difficulty: i16,
    start_time: DateTime<Utc>,
    damage_dealt: f64,
    enemies_defeated: i32,
    spread_count: i32,
}

impl RoomRow {
    fn into_room(self) -> Result<Room, StoreError> {
        Ok(Room {
            id: self.id.into(),
            name: self.name,
            produces: self
                .produces
                .as_deref()
                .map(resource_kind_from_db)
                .transpose()?,
            output: self.output,
            size: u32::try_from(self.size).unwrap_or(0),
            tier: u32::try_from(self.tier).unwrap_or(1),
        })
    }
}

impl DwellerRow {
    fn into_dweller(self) -> Dweller {
        Dweller {
            id: self.id.into(),
            name: self.name,
            room_id: self.room_id.map(Into::into),
            health: self.health,
            is_alive: self.is_alive,
            ability: self.ability,
        }
    }
}

impl IncidentRow {
    fn into_incident(self) -> Result<Incident, StoreError> {
        let rooms_affected: BTreeSet<vaultfall_types::RoomId> =
            serde_json::from_value(self.rooms_affected)?;
        Ok(Incident {
            id: self.id.into(),
            vault_id: self.vault_id.into(),
            kind: incident_kind_from_db(&self.kind)?,
            status: incident_status_from_db(&self.status)?,
            room_id: self.room_id.into(),
            rooms_affected,
            difficulty: u8::try_from(self.difficulty).unwrap_or(1),
            start_time: self.start_time,
            damage_dealt: self.damage_dealt,
            enemies_defeated: u32::try_from(self.enemies_defeated).unwrap_or(0),
            spread_count: u32::try_from(self.spread_count).unwrap_or(0),
        })
    }
}

// =========================================================================
// Writes
// =========================================================================

/// Insert a new vault with its rooms and dwellers in one transaction.
///
/// # Errors
///
/// Returns [`StoreError::Postgres`] if any insert fails; nothing is
/// written in that case.
pub async fn insert_vault(pool: &PgPool, snapshot: &VaultSnapshot) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    let vault_id = snapshot.state.vault_id.into_inner();

    sqlx::query(
        r"INSERT INTO vaults (id, name, is_active, is_paused, last_tick_time, total_game_time,
                              power, power_max, food, food_max, water, water_max)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(vault_id)
    .bind(&snapshot.name)
    .bind(snapshot.state.is_active)
    .bind(snapshot.state.is_paused)
    .bind(snapshot.state.last_tick_time)
    .bind(i64::try_from(snapshot.state.total_game_time).unwrap_or(i64::MAX))
    .bind(snapshot.resources.power.current)
    .bind(snapshot.resources.power.max)
    .bind(snapshot.resources.food.current)
    .bind(snapshot.resources.food.max)
    .bind(snapshot.resources.water.current)
    .bind(snapshot.resources.water.max)
    .execute(&mut *tx)
    .await?;

    if !snapshot.rooms.is_empty() {
        let len = snapshot.rooms.len();
        let mut ids = Vec::with_capacity(len);
        let mut positions = Vec::with_capacity(len);
        let mut names = Vec::with_capacity(len);
        let mut produces: Vec<Option<String>> = Vec::with_capacity(len);
        let mut outputs = Vec::with_capacity(len);
        let mut sizes = Vec::with_capacity(len);
        let mut tiers = Vec::with_capacity(len);

        for (position, room) in snapshot.rooms.iter().enumerate() {
            ids.push(room.id.into_inner());
            positions.push(i32::try_from(position).unwrap_or(i32::MAX));
            names.push(room.name.clone());
            produces.push(room.produces.map(|k| resource_kind_to_db(k).to_owned()));
            outputs.push(room.output);
            sizes.push(i32::try_from(room.size).unwrap_or(i32::MAX));
            tiers.push(i32::try_from(room.tier).unwrap_or(i32::MAX));
        }

        sqlx::query(
            r"INSERT INTO rooms (id, vault_id, position, name, produces, output, size, tier)
              SELECT id, $1, position, name, produces, output, size, tier
              FROM UNNEST($2::UUID[], $3::INT[], $4::TEXT[], $5::TEXT[], $6::DOUBLE PRECISION[], $7::INT[], $8::INT[])
                AS u(id, position, name, produces, output, size, tier)",
        )
        .bind(vault_id)
        .bind(&ids)
        .bind(&positions)
        .bind(&names)
        .bind(&produces)
        .bind(&outputs)
        .bind(&sizes)
        .bind(&tiers)
        .execute(&mut *tx)
        .await?;
    }

    insert_dwellers(&mut tx, vault_id, &snapshot.dwellers).await?;

    tx.commit().await?;
    Ok(())
}

async fn insert_dwellers(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    vault_id: Uuid,
    dwellers: &[Dweller],
) -> Result<(), StoreError> {
    if dwellers.is_empty() {
        return Ok(());
    }

    let len = dwellers.len();
    let mut ids = Vec::with_capacity(len);
    let mut names = Vec::with_capacity(len);
    let mut room_ids: Vec<Option<Uuid>> = Vec::with_capacity(len);
    let mut healths = Vec::with_capacity(len);
    let mut alives = Vec::with_capacity(len);
    let mut abilities = Vec::with_capacity(len);

    for dweller in dwellers {
        ids.push(dweller.id.into_inner());
        names.push(dweller.name.clone());
        room_ids.push(dweller.room_id.map(vaultfall_types::RoomId::into_inner));
        healths.push(dweller.health);
        alives.push(dweller.is_alive);
        abilities.push(dweller.ability);
    }

    sqlx::query(
        r"INSERT INTO dwellers (id, vault_id, name, room_id, health, is_alive, ability)
          SELECT id, $1, name, room_id, health, is_alive, ability
          FROM UNNEST($2::UUID[], $3::TEXT[], $4::UUID[], $5::DOUBLE PRECISION[], $6::BOOLEAN[], $7::DOUBLE PRECISION[])
            AS u(id, name, room_id, health, is_alive, ability)",
    )
    .bind(vault_id)
    .bind(&ids)
    .bind(&names)
    .bind(&room_ids)
    .bind(&healths)
    .bind(&alives)
    .bind(&abilities)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Persist one computed tick in a single transaction: vault scheduling
/// row, dweller health, and incident upserts.
///
/// The vault update carries the commit's scheduling anchor as a guard:
/// if a pause or resume moved `last_tick_time` (or paused the vault)
/// since the tick's snapshot, no row matches and the whole transaction
/// rolls back.
///
/// # Errors
///
/// Returns [`StoreError::StaleCommit`] if the scheduling guard rejects
/// the vault row, or [`StoreError::Postgres`] if any statement fails;
/// the transaction rolls back and nothing is written either way.
pub async fn persist_tick(
    pool: &PgPool,
    vault_id: VaultId,
    commit: &TickCommit,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    let vault_uuid = vault_id.into_inner();

    let updated = sqlx::query(
        r"UPDATE vaults
          SET last_tick_time = $2, total_game_time = $3,
              power = $4, food = $5, water = $6
          WHERE id = $1 AND last_tick_time = $7 AND NOT is_paused",
    )
    .bind(vault_uuid)
    .bind(commit.tick_time)
    .bind(i64::try_from(commit.total_game_time).unwrap_or(i64::MAX))
    .bind(commit.resources.power.current)
    .bind(commit.resources.food.current)
    .bind(commit.resources.water.current)
    .bind(commit.anchor)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(StoreError::StaleCommit(vault_id));
    }

    if !commit.dwellers.is_empty() {
        let len = commit.dwellers.len();
        let mut ids = Vec::with_capacity(len);
        let mut healths = Vec::with_capacity(len);
        let mut alives = Vec::with_capacity(len);
        for dweller in &commit.dwellers {
            ids.push(dweller.id.into_inner());
            healths.push(dweller.health);
            alives.push(dweller.is_alive);
        }

        sqlx::query(
            r"UPDATE dwellers
              SET health = u.health, is_alive = u.is_alive
              FROM UNNEST($1::UUID[], $2::DOUBLE PRECISION[], $3::BOOLEAN[])
                AS u(id, health, is_alive)
              WHERE dwellers.id = u.id",
        )
        .bind(&ids)
        .bind(&healths)
        .bind(&alives)
        .execute(&mut *tx)
        .await?;
    }

    for incident in &commit.incidents {
        upsert_incident(&mut tx, incident, true).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Upsert one incident. With `guard_resolved`, an existing row already
/// marked resolved is left untouched (tick path); without it the write is
/// unconditional (resolve path).
async fn upsert_incident(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    incident: &Incident,
    guard_resolved: bool,
) -> Result<(), StoreError> {
    let rooms_affected = serde_json::to_value(&incident.rooms_affected)?;
    let guard_clause = if guard_resolved {
        "WHERE incidents.status <> 'resolved'"
    } else {
        ""
    };

    let sql = format!(
        r"INSERT INTO incidents (id, vault_id, kind, status, room_id, rooms_affected,
                                 difficulty, start_time, damage_dealt, enemies_defeated, spread_count)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
          ON CONFLICT (id) DO UPDATE
          SET status = EXCLUDED.status,
              rooms_affected = EXCLUDED.rooms_affected,
              damage_dealt = EXCLUDED.damage_dealt,
              enemies_defeated = EXCLUDED.enemies_defeated,
              spread_count = EXCLUDED.spread_count
          {guard_clause}"
    );

    sqlx::query(&sql)
        .bind(incident.id.into_inner())
        .bind(incident.vault_id.into_inner())
        .bind(incident_kind_to_db(incident.kind))
        .bind(incident_status_to_db(incident.status))
        .bind(incident.room_id.into_inner())
        .bind(rooms_affected)
        .bind(i16::from(incident.difficulty))
        .bind(incident.start_time)
        .bind(incident.damage_dealt)
        .bind(i32::try_from(incident.enemies_defeated).unwrap_or(i32::MAX))
        .bind(i32::try_from(incident.spread_count).unwrap_or(i32::MAX))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Persist a pause/resume state change.
///
/// # Errors
///
/// Returns [`StoreError::Postgres`] if the update fails.
pub async fn persist_pause_state(pool: &PgPool, state: &GameState) -> Result<(), StoreError> {
    sqlx::query(
        r"UPDATE vaults SET is_paused = $2, last_tick_time = $3 WHERE id = $1",
    )
    .bind(state.vault_id.into_inner())
    .bind(state.is_paused)
    .bind(state.last_tick_time)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a single incident unconditionally (resolve path).
///
/// # Errors
///
/// Returns [`StoreError::Postgres`] if the write fails.
pub async fn persist_incident(pool: &PgPool, incident: &Incident) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    upsert_incident(&mut tx, incident, false).await?;
    tx.commit().await?;
    Ok(())
}

// =========================================================================
// Reads
// =========================================================================

/// Load every vault with its rooms, dwellers, and incidents. Used to
/// hydrate the in-memory store at startup.
///
/// # Errors
///
/// Returns [`StoreError::Postgres`] if any query fails, or
/// [`StoreError::Config`] for unrecognized enum values in stored rows.
pub async fn load_all(pool: &PgPool) -> Result<Vec<VaultSnapshot>, StoreError> {
    let vault_rows = sqlx::query_as::<_, VaultRow>(
        r"SELECT id, name, is_active, is_paused, last_tick_time, total_game_time,
                 power, power_max, food, food_max, water, water_max
          FROM vaults",
    )
    .fetch_all(pool)
    .await?;

    let room_rows = sqlx::query_as::<_, RoomRow>(
        r"SELECT id, vault_id, name, produces, output, size, tier
          FROM rooms
          ORDER BY vault_id, position",
    )
    .fetch_all(pool)
    .await?;

    let dweller_rows = sqlx::query_as::<_, DwellerRow>(
        r"SELECT id, vault_id, name, room_id, health, is_alive, ability
          FROM dwellers
          ORDER BY vault_id, id",
    )
    .fetch_all(pool)
    .await?;

    let incident_rows = sqlx::query_as::<_, IncidentRow>(
        r"SELECT id, vault_id, kind, status, room_id, rooms_affected,
                 difficulty, start_time, damage_dealt, enemies_defeated, spread_count
          FROM incidents
          ORDER BY vault_id, start_time",
    )
    .fetch_all(pool)
    .await?;

    let mut rooms_by_vault: HashMap<Uuid, Vec<Room>> = HashMap::new();
    for row in room_rows {
        let vault_id = row.vault_id;
        rooms_by_vault
            .entry(vault_id)
            .or_default()
            .push(row.into_room()?);
    }

    let mut dwellers_by_vault: HashMap<Uuid, Vec<Dweller>> = HashMap::new();
    for row in dweller_rows {
        let vault_id = row.vault_id;
        dwellers_by_vault
            .entry(vault_id)
            .or_default()
            .push(row.into_dweller());
    }

    let mut incidents_by_vault: HashMap<Uuid, Vec<Incident>> = HashMap::new();
    for row in incident_rows {
        let vault_id = row.vault_id;
        incidents_by_vault
            .entry(vault_id)
            .or_default()
            .push(row.into_incident()?);
    }

    let mut snapshots = Vec::with_capacity(vault_rows.len());
    for row in vault_rows {
        let state = GameState {
            vault_id: row.id.into(),
            is_active: row.is_active,
            is_paused: row.is_paused,
            last_tick_time: row.last_tick_time,
            total_game_time: u64::try_from(row.total_game_time).unwrap_or(0),
        };
        snapshots.push(VaultSnapshot {
            state,
            name: row.name,
            resources: VaultResources {
                power: ResourcePool::new(row.power, row.power_max),
                food: ResourcePool::new(row.food, row.food_max),
                water: ResourcePool::new(row.water, row.water_max),
            },
            rooms: rooms_by_vault.remove(&row.id).unwrap_or_default(),
            dwellers: dwellers_by_vault.remove(&row.id).unwrap_or_default(),
            incidents: incidents_by_vault.remove(&row.id).unwrap_or_default(),
        });
    }

    Ok(snapshots)
}
