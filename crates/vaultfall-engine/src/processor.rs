//! The per-vault tick processor.
//!
//! One tick runs through a fixed sequence of phases:
//!
//! 1. **Lock** -- take the vault's tick lease (try-once; contention means
//!    the vault is skipped this cycle, never queued).
//! 2. **Snapshot** -- clone the vault state out of the store; the pause
//!    flag is re-checked here, under the lease.
//! 3. **Compute** -- pure simulation: clock catch-up, resource advance,
//!    incident spawn roll, incident advancement, dweller damage. No
//!    locks are held and nothing is written during this phase.
//! 4. **Commit** -- hand the computed [`TickCommit`] to the store, which
//!    persists durably before the in-memory state moves.
//!
//! A forced tick (player pressed the button) runs the same sequence; the
//! only difference is that skips surface as typed errors instead of a
//! quiet [`TickReport::Skipped`]. Cancelling a forced tick (client
//! disconnect drops the future) before the commit await leaves the vault
//! untouched, and the dropped lease guard frees the lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use vaultfall_sim::clock;
use vaultfall_sim::config::SimulationConfig;
use vaultfall_sim::incidents::{IncidentEngine, SpawnContext};
use vaultfall_sim::resources::ResourceEngine;
use vaultfall_store::{StoreError, TickCommit, VaultSnapshot, VaultStore};
use vaultfall_types::{Dweller, Incident, TickResult, VaultId};

use crate::error::TickError;

/// Why a scheduled tick did not run (or did not commit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The vault is paused (or deactivated).
    Paused,
    /// Another worker holds the tick lease.
    LeaseHeld,
    /// A pause or resume moved the vault's scheduling anchor while the
    /// tick was computing; the computed result was discarded.
    Interrupted,
}

/// Outcome of a scheduled tick attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The tick computed and committed.
    Completed(TickResult),
    /// The tick was skipped; the vault retries next cycle.
    Skipped(SkipReason),
}

/// Runs complete vault ticks against a [`VaultStore`].
pub struct TickProcessor {
    store: Arc<VaultStore>,
    resources: ResourceEngine,
    incidents: IncidentEngine,
    max_catchup_seconds: u64,
    lease_ttl_seconds: u64,
    #[cfg(test)]
    stall: Option<(VaultId, std::time::Duration)>,
}

impl TickProcessor {
    /// Build a processor from the simulation configuration.
    pub fn new(store: Arc<VaultStore>, config: &SimulationConfig) -> Self {
        Self {
            store,
            resources: ResourceEngine::new(&config.resources),
            incidents: IncidentEngine::new(&config.incidents),
            max_catchup_seconds: config.clock.max_offline_catchup_seconds,
            lease_ttl_seconds: config.scheduler.lease_ttl_seconds,
            #[cfg(test)]
            stall: None,
        }
    }

    /// Replace the incident engine (custom spawn multiplier, test rates).
    #[must_use]
    pub fn with_incident_engine(mut self, incidents: IncidentEngine) -> Self {
        self.incidents = incidents;
        self
    }

    /// Stall this vault's ticks before the commit phase. Lets scheduler
    /// tests exercise the per-tick timeout without a slow store.
    #[cfg(test)]
    pub(crate) fn with_stalled_vault(
        mut self,
        vault_id: VaultId,
        delay: std::time::Duration,
    ) -> Self {
        self.stall = Some((vault_id, delay));
        self
    }

    /// The store this processor writes to.
    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    /// Run one scheduled tick. Pause and lease contention are quiet
    /// skips, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::VaultNotFound`] for a missing vault or
    /// [`TickError::Store`] if the commit fails.
    pub async fn run_tick(&self, vault_id: VaultId) -> Result<TickReport, TickError> {
        let mut rng = SmallRng::from_os_rng();
        self.run_tick_at(vault_id, Utc::now(), &mut rng).await
    }

    /// Run one forced tick (player action). Skips become typed errors so
    /// the API can answer with a meaningful status.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::VaultPaused`] or [`TickError::Contention`]
    /// where the scheduled path would skip, plus the scheduled path's
    /// errors.
    pub async fn force_tick(&self, vault_id: VaultId) -> Result<TickResult, TickError> {
        let mut rng = SmallRng::from_os_rng();
        match self.run_tick_at(vault_id, Utc::now(), &mut rng).await? {
            TickReport::Completed(result) => Ok(result),
            TickReport::Skipped(SkipReason::Paused) => Err(TickError::VaultPaused(vault_id)),
            TickReport::Skipped(SkipReason::LeaseHeld | SkipReason::Interrupted) => {
                Err(TickError::Contention(vault_id))
            }
        }
    }

    /// Run one tick with an explicit `now` and random source. This is the
    /// full implementation; the public entry points delegate here.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::VaultNotFound`] for a missing vault or
    /// [`TickError::Store`] if the commit fails.
    pub async fn run_tick_at(
        &self,
        vault_id: VaultId,
        now: DateTime<Utc>,
        rng: &mut (impl Rng + Send),
    ) -> Result<TickReport, TickError> {
        // Phase 1: lock.
        let _lease = match self.store.try_lease(vault_id, self.lease_ttl_seconds) {
            Ok(guard) => guard,
            Err(StoreError::LeaseHeld(_)) => {
                debug!(vault_id = %vault_id, "Tick skipped, lease held");
                return Ok(TickReport::Skipped(SkipReason::LeaseHeld));
            }
            Err(e) => return Err(e.into()),
        };

        // Phase 2: snapshot, re-checking pause under the lease.
        let snapshot = match self.store.snapshot(vault_id).await {
            Ok(snapshot) => snapshot,
            Err(StoreError::VaultNotFound(id)) => return Err(TickError::VaultNotFound(id)),
            Err(e) => return Err(e.into()),
        };
        if !snapshot.state.is_active || snapshot.state.is_paused {
            debug!(vault_id = %vault_id, "Tick skipped, vault paused");
            return Ok(TickReport::Skipped(SkipReason::Paused));
        }

        // Phase 3: compute (pure, no locks held).
        let (commit, result) = self.compute(&snapshot, now, rng);

        #[cfg(test)]
        {
            if let Some((stalled, delay)) = self.stall {
                if stalled == vault_id {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Phase 4: commit. Durable write happens inside the store; a
        // failure there leaves everything at the pre-tick state. The
        // store re-checks the scheduling anchor: a pause or resume that
        // landed during compute wins and the computed result is dropped.
        match self.store.commit_tick(vault_id, commit).await {
            Ok(()) => {}
            Err(StoreError::StaleCommit(_)) => {
                debug!(vault_id = %vault_id, "Tick discarded, scheduling record changed mid-tick");
                return Ok(TickReport::Skipped(SkipReason::Interrupted));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            vault_id = %vault_id,
            elapsed_seconds = result.elapsed_seconds,
            total_game_time = result.total_game_time,
            warnings = result.warnings.len(),
            incidents_spawned = result.incidents_spawned.len(),
            incidents_advanced = result.incidents_advanced,
            dwellers_injured = result.dwellers_injured,
            "Tick committed"
        );

        Ok(TickReport::Completed(result))
    }

    fn compute(
        &self,
        snapshot: &VaultSnapshot,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> (TickCommit, TickResult) {
        let vault_id = snapshot.state.vault_id;
        let elapsed = clock::elapsed_seconds(
            snapshot.state.last_tick_time,
            now,
            self.max_catchup_seconds,
        );

        let outcome = self.resources.advance(
            &snapshot.resources,
            &snapshot.rooms,
            &snapshot.dwellers,
            elapsed,
        );

        let mut incidents: Vec<Incident> = snapshot
            .incidents
            .iter()
            .filter(|i| i.is_unresolved())
            .cloned()
            .collect();

        let living = snapshot.dwellers.iter().filter(|d| d.is_alive).count();
        let ctx = SpawnContext {
            population: u32::try_from(living).unwrap_or(u32::MAX),
            unresolved_incidents: u32::try_from(incidents.len()).unwrap_or(u32::MAX),
        };

        // Spawn and advancement are independent rolls; a fresh incident
        // starts advancing on the next tick, not the one that spawned it.
        let advance_summary = self.incidents.advance(&mut incidents, &snapshot.rooms, elapsed, rng);
        let spawned = self
            .incidents
            .try_spawn(vault_id, &snapshot.rooms, &ctx, now, rng);

        let mut dwellers = snapshot.dwellers.clone();
        let dwellers_injured = apply_room_damage(&mut dwellers, &advance_summary.damage_by_room);

        let incidents_spawned: Vec<_> = spawned.iter().map(|i| i.id).collect();
        incidents.extend(spawned);

        let total_game_time = snapshot.state.total_game_time.saturating_add(elapsed);

        let commit = TickCommit {
            anchor: snapshot.state.last_tick_time,
            tick_time: now,
            total_game_time,
            resources: outcome.resources,
            dwellers,
            incidents,
        };
        let result = TickResult {
            vault_id,
            elapsed_seconds: elapsed,
            resources_delta: outcome.delta,
            warnings: outcome.warnings,
            incidents_spawned,
            incidents_advanced: advance_summary.advanced,
            dwellers_injured,
            total_game_time,
        };
        (commit, result)
    }
}

/// Distribute per-room incident damage across the living dwellers working
/// in each room. A dweller whose health reaches zero dies. Returns how
/// many dwellers took damage.
fn apply_room_damage(
    dwellers: &mut [Dweller],
    damage_by_room: &std::collections::BTreeMap<vaultfall_types::RoomId, f64>,
) -> u32 {
    let mut injured = 0_u32;

    for (room_id, damage) in damage_by_room {
        let occupants: Vec<usize> = dwellers
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_alive && d.room_id == Some(*room_id))
            .map(|(idx, _)| idx)
            .collect();
        if occupants.is_empty() || *damage <= 0.0 {
            continue;
        }

        let per_dweller = damage / occupants.len() as f64;
        for idx in occupants {
            if let Some(dweller) = dwellers.get_mut(idx) {
                dweller.health = (dweller.health - per_dweller).max(0.0);
                injured = injured.saturating_add(1);
                if dweller.health <= 0.0 {
                    dweller.is_alive = false;
                    debug!(dweller_id = %dweller.id, "Dweller died to incident damage");
                }
            }
        }
    }

    injured
}

#[cfg(test)]
#[allow(
    clippy::unreachable,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use vaultfall_sim::config::IncidentRatesConfig;
    use vaultfall_store::NewVault;
    use vaultfall_types::{
        DwellerId, IncidentId, IncidentKind, IncidentStatus, ResourceKind, ResourcePool, Room,
        RoomId, VaultResources, WarningLevel,
    };

    use super::*;

    fn test_config() -> SimulationConfig {
        SimulationConfig::default()
    }

    fn starter_vault() -> NewVault {
        let generator = Room {
            id: RoomId::new(),
            name: "Generator".to_owned(),
            produces: Some(ResourceKind::Power),
            output: 0.5,
            size: 1,
            tier: 1,
        };
        let diner = Room {
            id: RoomId::new(),
            name: "Diner".to_owned(),
            produces: Some(ResourceKind::Food),
            output: 0.4,
            size: 1,
            tier: 1,
        };
        let dwellers = vec![
            Dweller {
                id: DwellerId::new(),
                name: "Avery".to_owned(),
                room_id: Some(generator.id),
                health: 100.0,
                is_alive: true,
                ability: 3.0,
            },
            Dweller {
                id: DwellerId::new(),
                name: "Morgan".to_owned(),
                room_id: Some(diner.id),
                health: 100.0,
                is_alive: true,
                ability: 2.0,
            },
        ];
        NewVault {
            name: "Vault 17".to_owned(),
            resources: VaultResources {
                power: ResourcePool::new(500.0, 1000.0),
                food: ResourcePool::new(500.0, 1000.0),
                water: ResourcePool::new(500.0, 1000.0),
            },
            rooms: vec![generator, diner],
            dwellers,
        }
    }

    async fn setup() -> (Arc<VaultStore>, TickProcessor, VaultId) {
        let store = Arc::new(VaultStore::memory());
        let Ok(state) = store.create_vault(starter_vault()).await else {
            unreachable!("memory create cannot fail")
        };
        let processor = TickProcessor::new(Arc::clone(&store), &test_config());
        (store, processor, state.vault_id)
    }

    #[tokio::test]
    async fn tick_advances_game_time_monotonically() {
        let (store, processor, vault_id) = setup().await;
        let Ok(created) = store.game_state(vault_id).await else {
            unreachable!("vault exists")
        };

        let mut rng = SmallRng::seed_from_u64(1);
        let t1 = created.last_tick_time + chrono::Duration::seconds(60);
        let report = processor.run_tick_at(vault_id, t1, &mut rng).await;
        let Ok(TickReport::Completed(first)) = report else {
            unreachable!("tick must complete")
        };
        assert_eq!(first.elapsed_seconds, 60);
        assert_eq!(first.total_game_time, 60);

        let t2 = t1 + chrono::Duration::seconds(45);
        let report = processor.run_tick_at(vault_id, t2, &mut rng).await;
        let Ok(TickReport::Completed(second)) = report else {
            unreachable!("tick must complete")
        };
        assert_eq!(second.elapsed_seconds, 45);
        assert_eq!(second.total_game_time, 105);
    }

    #[tokio::test]
    async fn offline_catchup_is_capped() {
        let (store, processor, vault_id) = setup().await;
        let Ok(created) = store.game_state(vault_id).await else {
            unreachable!("vault exists")
        };

        // Two days offline: the tick credits at most one hour.
        let mut rng = SmallRng::seed_from_u64(2);
        let now = created.last_tick_time + chrono::Duration::days(2);
        let report = processor.run_tick_at(vault_id, now, &mut rng).await;
        let Ok(TickReport::Completed(result)) = report else {
            unreachable!("tick must complete")
        };
        assert_eq!(result.elapsed_seconds, 3600);
        assert_eq!(result.total_game_time, 3600);
    }

    #[tokio::test]
    async fn paused_vault_is_skipped_and_accrues_nothing() {
        let (store, processor, vault_id) = setup().await;
        let _ = store.pause(vault_id).await;

        let mut rng = SmallRng::seed_from_u64(3);
        let report = processor
            .run_tick_at(vault_id, Utc::now() + chrono::Duration::seconds(60), &mut rng)
            .await;
        assert!(matches!(report, Ok(TickReport::Skipped(SkipReason::Paused))));

        let Ok(state) = store.game_state(vault_id).await else {
            unreachable!("vault exists")
        };
        assert_eq!(state.total_game_time, 0);
    }

    #[tokio::test]
    async fn pause_two_hours_then_resume_ticks_sixty_seconds() {
        // Paused wall-clock time never becomes simulated time: a vault
        // paused for two hours and resumed simulates only the minute
        // between resume and the next tick.
        let (store, processor, vault_id) = setup().await;

        let _ = store.pause(vault_id).await;
        // ...two hours pass while paused...
        let Ok(resumed) = store.resume(vault_id).await else {
            unreachable!("vault exists")
        };

        let mut rng = SmallRng::seed_from_u64(4);
        let now = resumed.last_tick_time + chrono::Duration::seconds(60);
        let report = processor.run_tick_at(vault_id, now, &mut rng).await;
        let Ok(TickReport::Completed(result)) = report else {
            unreachable!("tick must complete")
        };
        assert_eq!(result.elapsed_seconds, 60);
        assert_eq!(result.total_game_time, 60);
    }

    #[tokio::test]
    async fn pause_during_compute_discards_the_tick() {
        // A pause that lands while the tick is computing wins: the
        // computed result is dropped and nothing is charged.
        let (store, _, vault_id) = setup().await;
        let processor = Arc::new(
            TickProcessor::new(Arc::clone(&store), &test_config())
                .with_stalled_vault(vault_id, std::time::Duration::from_millis(200)),
        );

        let task = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move { processor.run_tick(vault_id).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let _ = store.pause(vault_id).await;

        let report = task.await;
        assert!(matches!(
            report,
            Ok(Ok(TickReport::Skipped(SkipReason::Interrupted)))
        ));

        let Ok(state) = store.game_state(vault_id).await else {
            unreachable!("vault exists")
        };
        assert!(state.is_paused);
        assert_eq!(state.total_game_time, 0);
    }

    #[tokio::test]
    async fn forced_tick_on_paused_vault_is_an_error() {
        let (store, processor, vault_id) = setup().await;
        let _ = store.pause(vault_id).await;

        let result = processor.force_tick(vault_id).await;
        assert!(matches!(result, Err(TickError::VaultPaused(_))));
    }

    #[tokio::test]
    async fn held_lease_skips_scheduled_and_fails_forced() {
        let (store, processor, vault_id) = setup().await;
        let guard = store.try_lease(vault_id, 120);
        assert!(guard.is_ok());

        let mut rng = SmallRng::seed_from_u64(5);
        let report = processor.run_tick_at(vault_id, Utc::now(), &mut rng).await;
        assert!(matches!(
            report,
            Ok(TickReport::Skipped(SkipReason::LeaseHeld))
        ));

        let forced = processor.force_tick(vault_id).await;
        assert!(matches!(forced, Err(TickError::Contention(_))));
    }

    #[tokio::test]
    async fn missing_vault_is_an_error() {
        let store = Arc::new(VaultStore::memory());
        let processor = TickProcessor::new(Arc::clone(&store), &test_config());

        let mut rng = SmallRng::seed_from_u64(6);
        let report = processor
            .run_tick_at(VaultId::new(), Utc::now(), &mut rng)
            .await;
        assert!(matches!(report, Err(TickError::VaultNotFound(_))));
    }

    #[tokio::test]
    async fn guaranteed_spawn_produces_one_incident() {
        let (store, processor, vault_id) = setup().await;
        let incidents = IncidentEngine::new(&IncidentRatesConfig {
            base_chance: 1.0,
            max_chance: 1.0,
            ..IncidentRatesConfig::default()
        });
        let processor = processor.with_incident_engine(incidents);

        let mut rng = SmallRng::seed_from_u64(7);
        let report = processor
            .run_tick_at(vault_id, Utc::now() + chrono::Duration::seconds(60), &mut rng)
            .await;
        let Ok(TickReport::Completed(result)) = report else {
            unreachable!("tick must complete")
        };
        assert_eq!(result.incidents_spawned.len(), 1);
        // The fresh incident advanced nothing this tick.
        assert_eq!(result.incidents_advanced, 0);

        let Ok(stored) = store.list_incidents(vault_id, None).await else {
            unreachable!("vault exists")
        };
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, IncidentStatus::Active);
    }

    #[tokio::test]
    async fn incident_damage_injures_room_occupants() {
        let (store, processor, vault_id) = setup().await;
        let Ok(snapshot) = store.snapshot(vault_id).await else {
            unreachable!("vault exists")
        };
        let generator_id = snapshot.rooms[0].id;

        // Seed a hot incident in the generator room.
        let incident = Incident {
            id: IncidentId::new(),
            vault_id,
            kind: IncidentKind::Fire,
            status: IncidentStatus::Active,
            room_id: generator_id,
            rooms_affected: std::iter::once(generator_id).collect(),
            difficulty: 10,
            start_time: Utc::now(),
            damage_dealt: 0.0,
            enemies_defeated: 0,
            spread_count: 0,
        };
        let seed = TickCommit {
            anchor: snapshot.state.last_tick_time,
            tick_time: snapshot.state.last_tick_time,
            total_game_time: 0,
            resources: snapshot.resources,
            dwellers: snapshot.dwellers.clone(),
            incidents: vec![incident],
        };
        let _ = store.commit_tick(vault_id, seed).await;

        let mut rng = SmallRng::seed_from_u64(8);
        let now = snapshot.state.last_tick_time + chrono::Duration::seconds(60);
        let report = processor.run_tick_at(vault_id, now, &mut rng).await;
        let Ok(TickReport::Completed(result)) = report else {
            unreachable!("tick must complete")
        };

        assert_eq!(result.incidents_advanced, 1);
        assert_eq!(result.dwellers_injured, 1);

        let Ok(after) = store.snapshot(vault_id).await else {
            unreachable!("vault exists")
        };
        let hurt = after
            .dwellers
            .iter()
            .find(|d| d.room_id == Some(generator_id));
        // 10 difficulty * 0.01 rate * 1.25 fire multiplier * 60s = 7.5.
        assert!(hurt.is_some_and(|d| (d.health - 92.5).abs() < 1e-9));
    }

    #[tokio::test]
    async fn tick_emits_critical_warning_at_zero_floor() {
        // Drain food and water to the floor: the tick reports critical
        // warnings, never low, for an empty pool.
        let store = Arc::new(VaultStore::memory());
        let mut vault = starter_vault();
        vault.resources.food = ResourcePool::new(0.5, 1000.0);
        vault.resources.water = ResourcePool::new(0.5, 1000.0);
        // No production rooms for food/water.
        vault.rooms.retain(|r| r.produces == Some(ResourceKind::Power));
        for dweller in &mut vault.dwellers {
            dweller.room_id = None;
        }
        let Ok(state) = store.create_vault(vault).await else {
            unreachable!("memory create cannot fail")
        };
        let processor = TickProcessor::new(Arc::clone(&store), &test_config());

        let mut rng = SmallRng::seed_from_u64(9);
        let now = state.last_tick_time + chrono::Duration::seconds(3600);
        let report = processor.run_tick_at(state.vault_id, now, &mut rng).await;
        let Ok(TickReport::Completed(result)) = report else {
            unreachable!("tick must complete")
        };

        let food_warning = result
            .warnings
            .iter()
            .find(|w| w.resource == ResourceKind::Food);
        assert!(food_warning.is_some_and(|w| w.level == WarningLevel::Critical));
        assert!(
            !result
                .warnings
                .iter()
                .any(|w| w.resource == ResourceKind::Food && w.level == WarningLevel::Low)
        );
    }
}
