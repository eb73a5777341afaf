//! The authoritative game state store.
//!
//! Hot state lives in memory behind an async `RwLock`; `PostgreSQL`, when
//! configured, is the durable cold store. A tick commits to `PostgreSQL`
//! first (one transaction) and applies to memory only after the
//! transaction succeeds, so a database failure leaves both layers at the
//! pre-tick state and the tick retries next cycle. Without `PostgreSQL`
//! (tests, local development) the in-memory apply is the commit.
//!
//! Mutual exclusion between tick workers is by per-vault lease; see
//! [`crate::lease`]. Player actions (pause, resume, resolve) do not take
//! the lease: they are single-field writes serialized by the store lock,
//! and the commit path is written to tolerate them landing mid-tick. A
//! resolve keeps its resolved status through a stale commit, and a pause
//! or resume that moves the scheduling anchor causes the whole commit to
//! be discarded (see [`VaultStore::commit_tick`]).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;
use vaultfall_types::{
    Dweller, GameState, Incident, IncidentId, IncidentStatus, Room, VaultId, VaultResources,
};

use crate::error::StoreError;
use crate::lease::{LeaseGuard, LeaseTable};
use crate::persist;
use crate::postgres::PostgresPool;

/// Everything the tick processor needs to compute a vault's tick,
/// cloned out of the store so computation runs without holding locks.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultSnapshot {
    /// Scheduling record.
    pub state: GameState,
    /// Vault display name.
    pub name: String,
    /// Current resource levels.
    pub resources: VaultResources,
    /// Room layout, in positional order (adjacency follows this order).
    pub rooms: Vec<Room>,
    /// All dwellers, living and dead.
    pub dwellers: Vec<Dweller>,
    /// All incidents, including resolved history.
    pub incidents: Vec<Incident>,
}

/// Parameters for creating a vault.
#[derive(Debug, Clone)]
pub struct NewVault {
    /// Vault display name.
    pub name: String,
    /// Starting resource levels.
    pub resources: VaultResources,
    /// Initial room layout, in positional order.
    pub rooms: Vec<Room>,
    /// Initial dwellers.
    pub dwellers: Vec<Dweller>,
}

/// The outcome of one computed tick, ready to be committed atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct TickCommit {
    /// The `last_tick_time` the tick was computed from. The commit
    /// applies only while the scheduling record still carries this
    /// anchor; a pause/resume moving it invalidates the commit.
    pub anchor: DateTime<Utc>,
    /// New `last_tick_time` anchor (the tick's `now`).
    pub tick_time: DateTime<Utc>,
    /// New accumulated simulated time.
    pub total_game_time: u64,
    /// Post-tick resource levels.
    pub resources: VaultResources,
    /// Post-tick dweller records (full set).
    pub dwellers: Vec<Dweller>,
    /// Incidents touched this tick: advanced existing ones plus any
    /// spawn. Incidents resolved concurrently by a player keep their
    /// resolved status; the commit never un-resolves.
    pub incidents: Vec<Incident>,
}

/// Authoritative store for all vault game state.
pub struct VaultStore {
    vaults: RwLock<HashMap<VaultId, VaultSnapshot>>,
    postgres: Option<PostgresPool>,
    leases: LeaseTable,
}

impl VaultStore {
    /// Create a memory-only store (no durable layer).
    pub fn memory() -> Self {
        Self {
            vaults: RwLock::new(HashMap::new()),
            postgres: None,
            leases: LeaseTable::new(),
        }
    }

    /// Create a store backed by `PostgreSQL`.
    pub fn with_postgres(pool: PostgresPool) -> Self {
        Self {
            vaults: RwLock::new(HashMap::new()),
            postgres: Some(pool),
            leases: LeaseTable::new(),
        }
    }

    /// Load all vaults from `PostgreSQL` into memory. Call once at
    /// startup, before the dispatcher starts. Returns the vault count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if any load query fails.
    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        let Some(pg) = &self.postgres else {
            return Ok(0);
        };

        let snapshots = persist::load_all(pg.pool()).await?;
        let count = snapshots.len();

        let mut vaults = self.vaults.write().await;
        vaults.clear();
        for snapshot in snapshots {
            vaults.insert(snapshot.state.vault_id, snapshot);
        }
        drop(vaults);

        info!(vaults = count, "Hydrated vault store from PostgreSQL");
        Ok(count)
    }

    /// Create a vault. The new vault is active, unpaused, and anchored at
    /// the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the durable insert fails; the
    /// vault is not created in memory in that case.
    pub async fn create_vault(&self, new: NewVault) -> Result<GameState, StoreError> {
        let state = GameState::new(VaultId::new(), Utc::now());
        let snapshot = VaultSnapshot {
            state,
            name: new.name,
            resources: new.resources,
            rooms: new.rooms,
            dwellers: new.dwellers,
            incidents: Vec::new(),
        };

        if let Some(pg) = &self.postgres {
            persist::insert_vault(pg.pool(), &snapshot).await?;
        }

        info!(vault_id = %state.vault_id, name = %snapshot.name, "Vault created");
        self.vaults
            .write()
            .await
            .insert(state.vault_id, snapshot);
        Ok(state)
    }

    /// The scheduling record for one vault.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] if the vault does not exist.
    pub async fn game_state(&self, vault_id: VaultId) -> Result<GameState, StoreError> {
        let vaults = self.vaults.read().await;
        vaults
            .get(&vault_id)
            .map(|v| v.state)
            .ok_or(StoreError::VaultNotFound(vault_id))
    }

    /// Clone the full snapshot for one vault.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] if the vault does not exist.
    pub async fn snapshot(&self, vault_id: VaultId) -> Result<VaultSnapshot, StoreError> {
        let vaults = self.vaults.read().await;
        vaults
            .get(&vault_id)
            .cloned()
            .ok_or(StoreError::VaultNotFound(vault_id))
    }

    /// Scheduling records for all vaults, unordered.
    pub async fn list_states(&self) -> Vec<GameState> {
        self.vaults.read().await.values().map(|v| v.state).collect()
    }

    /// IDs of vaults eligible for a scheduled tick: active and not
    /// paused. Pause state may still change between this listing and the
    /// tick; the processor re-checks under its lease.
    pub async fn list_schedulable(&self) -> Vec<VaultId> {
        self.vaults
            .read()
            .await
            .values()
            .filter(|v| v.state.is_active && !v.state.is_paused)
            .map(|v| v.state.vault_id)
            .collect()
    }

    /// Pause a vault. Idempotent: pausing a paused vault changes nothing.
    /// `last_tick_time` keeps its value; the reset happens at resume so
    /// no simulated time accrues for the paused span.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] if the vault does not exist,
    /// or [`StoreError::Postgres`] if the durable update fails.
    pub async fn pause(&self, vault_id: VaultId) -> Result<GameState, StoreError> {
        let mut vaults = self.vaults.write().await;
        let vault = vaults
            .get_mut(&vault_id)
            .ok_or(StoreError::VaultNotFound(vault_id))?;

        if !vault.state.is_paused {
            vault.state.is_paused = true;
            if let Some(pg) = &self.postgres {
                persist::persist_pause_state(pg.pool(), &vault.state).await?;
            }
            info!(vault_id = %vault_id, "Vault paused");
        }
        Ok(vault.state)
    }

    /// Resume a vault. Re-anchors `last_tick_time` to now so the paused
    /// wall-clock span is never simulated. Idempotent on a running vault.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] if the vault does not exist,
    /// or [`StoreError::Postgres`] if the durable update fails.
    pub async fn resume(&self, vault_id: VaultId) -> Result<GameState, StoreError> {
        let mut vaults = self.vaults.write().await;
        let vault = vaults
            .get_mut(&vault_id)
            .ok_or(StoreError::VaultNotFound(vault_id))?;

        if vault.state.is_paused {
            vault.state.is_paused = false;
            vault.state.last_tick_time = Utc::now();
            if let Some(pg) = &self.postgres {
                persist::persist_pause_state(pg.pool(), &vault.state).await?;
            }
            info!(vault_id = %vault_id, "Vault resumed");
        }
        Ok(vault.state)
    }

    /// Commit a computed tick. The whole commit runs under the store
    /// write lock: anchor check, durable write, memory apply.
    ///
    /// The commit carries the `last_tick_time` anchor it was computed
    /// from. If the vault is paused at commit time, or a pause/resume
    /// moved the anchor while the tick was computing, the commit is
    /// discarded: a resumed vault must never be retroactively charged
    /// for its paused span.
    ///
    /// Incidents in the commit that a player resolved while the tick was
    /// computing keep their resolved status in both layers. The caller
    /// must hold the vault's tick lease.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] if the vault disappeared,
    /// [`StoreError::StaleCommit`] if the scheduling record changed
    /// mid-tick, or [`StoreError::Postgres`] if the transaction fails.
    /// On every error both layers keep their pre-tick state.
    pub async fn commit_tick(
        &self,
        vault_id: VaultId,
        commit: TickCommit,
    ) -> Result<(), StoreError> {
        let mut vaults = self.vaults.write().await;
        let vault = vaults
            .get_mut(&vault_id)
            .ok_or(StoreError::VaultNotFound(vault_id))?;

        if vault.state.is_paused || vault.state.last_tick_time != commit.anchor {
            return Err(StoreError::StaleCommit(vault_id));
        }

        if let Some(pg) = &self.postgres {
            persist::persist_tick(pg.pool(), vault_id, &commit).await?;
        }

        vault.state.last_tick_time = commit.tick_time;
        vault.state.total_game_time = commit.total_game_time;
        vault.resources = commit.resources;
        vault.dwellers = commit.dwellers;

        for incoming in commit.incidents {
            match vault.incidents.iter_mut().find(|i| i.id == incoming.id) {
                Some(existing) => {
                    // A resolve that landed mid-tick wins over the
                    // computed advancement.
                    if existing.status != IncidentStatus::Resolved {
                        *existing = incoming;
                    }
                }
                None => vault.incidents.push(incoming),
            }
        }

        Ok(())
    }

    /// Resolve an incident (player action). Terminal: the incident stops
    /// advancing and is never reopened by a tick.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] or
    /// [`StoreError::IncidentNotFound`] for missing entities, or
    /// [`StoreError::Postgres`] if the durable update fails.
    pub async fn resolve_incident(
        &self,
        vault_id: VaultId,
        incident_id: IncidentId,
        enemies_defeated: u32,
    ) -> Result<Incident, StoreError> {
        let mut vaults = self.vaults.write().await;
        let vault = vaults
            .get_mut(&vault_id)
            .ok_or(StoreError::VaultNotFound(vault_id))?;

        let incident = vault
            .incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or(StoreError::IncidentNotFound(incident_id))?;

        if incident.status != IncidentStatus::Resolved {
            incident.status = IncidentStatus::Resolved;
            incident.enemies_defeated = incident.enemies_defeated.saturating_add(enemies_defeated);
            if let Some(pg) = &self.postgres {
                persist::persist_incident(pg.pool(), incident).await?;
            }
            info!(
                vault_id = %vault_id,
                incident_id = %incident_id,
                enemies_defeated,
                "Incident resolved"
            );
        }
        Ok(incident.clone())
    }

    /// List a vault's incidents, optionally filtered by status, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VaultNotFound`] if the vault does not exist.
    pub async fn list_incidents(
        &self,
        vault_id: VaultId,
        status: Option<IncidentStatus>,
    ) -> Result<Vec<Incident>, StoreError> {
        let vaults = self.vaults.read().await;
        let vault = vaults
            .get(&vault_id)
            .ok_or(StoreError::VaultNotFound(vault_id))?;

        let mut incidents: Vec<Incident> = vault
            .incidents
            .iter()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(incidents)
    }

    /// Try to take the tick lease for a vault.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseHeld`] if another worker holds a live
    /// lease.
    pub fn try_lease(
        &self,
        vault_id: VaultId,
        ttl_seconds: u64,
    ) -> Result<LeaseGuard, StoreError> {
        self.leases
            .try_acquire(vault_id, ttl_seconds)
            .ok_or(StoreError::LeaseHeld(vault_id))
    }

    /// The lease table (shared across clones of the store handle).
    pub const fn leases(&self) -> &LeaseTable {
        &self.leases
    }
}

#[cfg(test)]
#[allow(clippy::unreachable, clippy::indexing_slicing)]
mod tests {
    use vaultfall_types::{DwellerId, IncidentKind, ResourceKind, ResourcePool, RoomId};

    use super::*;

    fn starter_vault() -> NewVault {
        let power_room = Room {
            id: RoomId::new(),
            name: "Generator".to_owned(),
            produces: Some(ResourceKind::Power),
            output: 0.5,
            size: 1,
            tier: 1,
        };
        let dweller = Dweller {
            id: DwellerId::new(),
            name: "Avery".to_owned(),
            room_id: Some(power_room.id),
            health: 100.0,
            is_alive: true,
            ability: 3.0,
        };
        NewVault {
            name: "Vault 17".to_owned(),
            resources: VaultResources {
                power: ResourcePool::new(500.0, 1000.0),
                food: ResourcePool::new(500.0, 1000.0),
                water: ResourcePool::new(500.0, 1000.0),
            },
            rooms: vec![power_room],
            dwellers: vec![dweller],
        }
    }

    fn incident_in(vault_id: VaultId, room_id: RoomId) -> Incident {
        Incident {
            id: IncidentId::new(),
            vault_id,
            kind: IncidentKind::Fire,
            status: IncidentStatus::Active,
            room_id,
            rooms_affected: std::iter::once(room_id).collect(),
            difficulty: 3,
            start_time: Utc::now(),
            damage_dealt: 0.0,
            enemies_defeated: 0,
            spread_count: 0,
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let store = VaultStore::memory();
        let state = store.create_vault(starter_vault()).await;
        let Ok(state) = state else {
            unreachable!("memory create cannot fail")
        };

        assert!(state.is_active);
        assert!(!state.is_paused);
        assert_eq!(state.total_game_time, 0);

        let fetched = store.game_state(state.vault_id).await;
        assert!(fetched.is_ok());

        let missing = store.game_state(VaultId::new()).await;
        assert!(matches!(missing, Err(StoreError::VaultNotFound(_))));
    }

    #[tokio::test]
    async fn pause_is_idempotent() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let anchor = state.last_tick_time;

        let Ok(first) = store.pause(state.vault_id).await else {
            unreachable!("vault exists")
        };
        let Ok(second) = store.pause(state.vault_id).await else {
            unreachable!("vault exists")
        };

        assert!(first.is_paused);
        assert_eq!(first, second);
        // Pause does not disturb the tick anchor.
        assert_eq!(second.last_tick_time, anchor);
    }

    #[tokio::test]
    async fn resume_reanchors_tick_time() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };

        let _ = store.pause(state.vault_id).await;
        let before_resume = Utc::now();
        let Ok(resumed) = store.resume(state.vault_id).await else {
            unreachable!("vault exists")
        };

        assert!(!resumed.is_paused);
        assert!(resumed.last_tick_time >= before_resume);
        // The paused span contributed no simulated time.
        assert_eq!(resumed.total_game_time, 0);
    }

    #[tokio::test]
    async fn paused_vaults_are_not_schedulable() {
        let store = VaultStore::memory();
        let Ok(a) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let Ok(b) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };

        let _ = store.pause(a.vault_id).await;

        let schedulable = store.list_schedulable().await;
        assert_eq!(schedulable, vec![b.vault_id]);
    }

    #[tokio::test]
    async fn commit_applies_state() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let Ok(snapshot) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };

        let tick_time = Utc::now();
        let mut resources = snapshot.resources;
        resources.power.set(650.0);

        let commit = TickCommit {
            anchor: snapshot.state.last_tick_time,
            tick_time,
            total_game_time: 60,
            resources,
            dwellers: snapshot.dwellers.clone(),
            incidents: Vec::new(),
        };
        let committed = store.commit_tick(state.vault_id, commit).await;
        assert!(committed.is_ok());

        let Ok(after) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };
        assert_eq!(after.state.total_game_time, 60);
        assert_eq!(after.state.last_tick_time, tick_time);
        assert!((after.resources.power.current - 650.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn commit_is_discarded_after_a_mid_tick_pause_resume() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let Ok(snapshot) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };

        // A tick computes against this anchor while a player pauses and
        // resumes, moving the anchor forward.
        let stale_anchor = snapshot.state.last_tick_time;
        let _ = store.pause(state.vault_id).await;
        let Ok(resumed) = store.resume(state.vault_id).await else {
            unreachable!("vault exists")
        };

        let mut resources = snapshot.resources;
        resources.power.set(650.0);
        let commit = TickCommit {
            anchor: stale_anchor,
            tick_time: Utc::now(),
            total_game_time: 60,
            resources,
            dwellers: snapshot.dwellers,
            incidents: Vec::new(),
        };
        let committed = store.commit_tick(state.vault_id, commit).await;
        assert!(matches!(committed, Err(StoreError::StaleCommit(_))));

        // The resume anchor survives, so the next tick's elapsed window
        // starts at resume and the paused span is never charged.
        let Ok(after) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };
        assert!(after.state.last_tick_time >= resumed.last_tick_time);
        assert_eq!(after.state.total_game_time, 0);
        assert!((after.resources.power.current - 500.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn commit_is_discarded_on_a_vault_paused_mid_tick() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let Ok(snapshot) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };

        // The pause lands after the snapshot; it keeps the anchor but
        // flips the flag, which also invalidates the commit.
        let _ = store.pause(state.vault_id).await;

        let commit = TickCommit {
            anchor: snapshot.state.last_tick_time,
            tick_time: Utc::now(),
            total_game_time: 60,
            resources: snapshot.resources,
            dwellers: snapshot.dwellers,
            incidents: Vec::new(),
        };
        let committed = store.commit_tick(state.vault_id, commit).await;
        assert!(matches!(committed, Err(StoreError::StaleCommit(_))));

        let Ok(after) = store.game_state(state.vault_id).await else {
            unreachable!("vault exists")
        };
        assert!(after.is_paused);
        assert_eq!(after.total_game_time, 0);
    }

    #[tokio::test]
    async fn commit_never_unresolves_an_incident() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let Ok(snapshot) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };
        let room_id = snapshot.rooms[0].id;

        // Seed an active incident through the commit path.
        let incident = incident_in(state.vault_id, room_id);
        let incident_id = incident.id;
        let seed_time = Utc::now();
        let seed = TickCommit {
            anchor: snapshot.state.last_tick_time,
            tick_time: seed_time,
            total_game_time: 60,
            resources: snapshot.resources,
            dwellers: snapshot.dwellers.clone(),
            incidents: vec![incident.clone()],
        };
        let _ = store.commit_tick(state.vault_id, seed).await;

        // A player resolves it while the next tick is computing against
        // the stale snapshot. Resolving does not move the anchor, so the
        // late commit itself still applies.
        let resolved = store.resolve_incident(state.vault_id, incident_id, 2).await;
        assert!(resolved.is_ok());

        let mut advanced = incident;
        advanced.damage_dealt = 9.0;
        let late_commit = TickCommit {
            anchor: seed_time,
            tick_time: Utc::now(),
            total_game_time: 120,
            resources: snapshot.resources,
            dwellers: snapshot.dwellers,
            incidents: vec![advanced],
        };
        let _ = store.commit_tick(state.vault_id, late_commit).await;

        let Ok(incidents) = store.list_incidents(state.vault_id, None).await else {
            unreachable!("vault exists")
        };
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::Resolved);
        assert_eq!(incidents[0].enemies_defeated, 2);
    }

    #[tokio::test]
    async fn incident_status_filter() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let Ok(snapshot) = store.snapshot(state.vault_id).await else {
            unreachable!("vault exists")
        };
        let room_id = snapshot.rooms[0].id;

        let active = incident_in(state.vault_id, room_id);
        let to_resolve = incident_in(state.vault_id, room_id);
        let to_resolve_id = to_resolve.id;
        let seed = TickCommit {
            anchor: snapshot.state.last_tick_time,
            tick_time: Utc::now(),
            total_game_time: 60,
            resources: snapshot.resources,
            dwellers: snapshot.dwellers,
            incidents: vec![active, to_resolve],
        };
        let _ = store.commit_tick(state.vault_id, seed).await;
        let _ = store.resolve_incident(state.vault_id, to_resolve_id, 0).await;

        let Ok(unresolved) = store
            .list_incidents(state.vault_id, Some(IncidentStatus::Active))
            .await
        else {
            unreachable!("vault exists")
        };
        assert_eq!(unresolved.len(), 1);

        let Ok(all) = store.list_incidents(state.vault_id, None).await else {
            unreachable!("vault exists")
        };
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn lease_blocks_second_worker() {
        let store = VaultStore::memory();
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };

        let guard = store.try_lease(state.vault_id, 120);
        assert!(guard.is_ok());

        let contended = store.try_lease(state.vault_id, 120);
        assert!(matches!(contended, Err(StoreError::LeaseHeld(_))));

        drop(guard);
        assert!(store.try_lease(state.vault_id, 120).is_ok());
    }
}
