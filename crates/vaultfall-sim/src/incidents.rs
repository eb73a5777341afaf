//! Incident spawn and advancement engine.
//!
//! Incidents are the hostile events that threaten a vault: raider
//! attacks, fires, infestations. Each tick the engine makes at most one
//! spawn attempt per vault and advances every unresolved incident. The
//! engine never resolves incidents; resolution is a player action that
//! arrives through the store.
//!
//! Randomness is injected as `&mut impl Rng` so every probabilistic path
//! is reproducible under a seeded generator in tests. The spawn
//! probability multiplier is a plug point: callers may swap the default
//! population-pressure curve for their own without touching the engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::debug;
use vaultfall_types::{Incident, IncidentId, IncidentKind, IncidentStatus, Room, RoomId, VaultId};

use crate::config::IncidentRatesConfig;

/// Per-kind behavior constants. The kind set is closed, so behavior lives
/// in this lookup rather than in any polymorphic dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncidentParams {
    /// Relative weight when choosing which kind spawns.
    pub spawn_weight: f64,
    /// Multiplier on the base damage rate for this kind.
    pub damage_multiplier: f64,
    /// Whether this kind can spread to adjacent rooms.
    pub can_spread: bool,
}

/// Behavior constants for an incident kind.
pub const fn params(kind: IncidentKind) -> IncidentParams {
    match kind {
        IncidentKind::RaiderAttack => IncidentParams {
            spawn_weight: 2.0,
            damage_multiplier: 1.5,
            can_spread: true,
        },
        IncidentKind::Infestation => IncidentParams {
            spawn_weight: 3.0,
            damage_multiplier: 1.0,
            can_spread: true,
        },
        IncidentKind::Fire => IncidentParams {
            spawn_weight: 3.0,
            damage_multiplier: 1.25,
            can_spread: true,
        },
        IncidentKind::RadiationLeak => IncidentParams {
            spawn_weight: 1.0,
            damage_multiplier: 2.0,
            can_spread: true,
        },
        IncidentKind::ElectricalFailure => IncidentParams {
            spawn_weight: 2.0,
            damage_multiplier: 0.75,
            can_spread: false,
        },
        IncidentKind::WaterContamination => IncidentParams {
            spawn_weight: 1.0,
            damage_multiplier: 0.5,
            can_spread: false,
        },
    }
}

/// Inputs to the spawn probability multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnContext {
    /// Living dwellers in the vault.
    pub population: u32,
    /// Unresolved incidents already threatening the vault.
    pub unresolved_incidents: u32,
}

/// Spawn probability multiplier signature. Receives the vault's spawn
/// context and returns a non-negative factor applied to the base chance.
pub type SpawnMultiplier = fn(&SpawnContext) -> f64;

/// Default spawn multiplier: larger vaults attract more trouble, but a
/// vault already fighting two or more incidents gets a reprieve.
pub fn default_spawn_multiplier(ctx: &SpawnContext) -> f64 {
    let pressure = 1.0 + f64::from(ctx.population) / 50.0;
    if ctx.unresolved_incidents >= 2 {
        pressure / 2.0
    } else {
        pressure
    }
}

/// Summary of one advancement pass over a vault's unresolved incidents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdvanceSummary {
    /// Number of incidents advanced.
    pub advanced: u32,
    /// Number of spread events that occurred.
    pub spread: u32,
    /// Damage dealt this pass, keyed by affected room. Callers distribute
    /// this to the dwellers working in each room.
    pub damage_by_room: BTreeMap<RoomId, f64>,
}

/// Pure incident computation: spawn rolls and advancement.
#[derive(Debug, Clone)]
pub struct IncidentEngine {
    rates: IncidentRatesConfig,
    spawn_multiplier: SpawnMultiplier,
}

impl IncidentEngine {
    /// Create an engine with the given rates and the default spawn
    /// multiplier.
    pub fn new(rates: &IncidentRatesConfig) -> Self {
        Self {
            rates: rates.clone(),
            spawn_multiplier: default_spawn_multiplier,
        }
    }

    /// Replace the spawn probability multiplier.
    #[must_use]
    pub fn with_spawn_multiplier(mut self, spawn_multiplier: SpawnMultiplier) -> Self {
        self.spawn_multiplier = spawn_multiplier;
        self
    }

    /// Effective spawn probability for one tick, before the dice roll:
    /// `min(base_chance * multiplier, max_chance)`, floored at zero.
    pub fn spawn_chance(&self, ctx: &SpawnContext) -> f64 {
        let chance = self.rates.base_chance * (self.spawn_multiplier)(ctx);
        chance.clamp(0.0, self.rates.max_chance)
    }

    /// Make one spawn attempt for a vault. Returns the new incident if
    /// the roll succeeds, `None` otherwise. A vault with no rooms never
    /// spawns incidents.
    pub fn try_spawn(
        &self,
        vault_id: VaultId,
        rooms: &[Room],
        ctx: &SpawnContext,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Option<Incident> {
        if rooms.is_empty() {
            return None;
        }

        let chance = self.spawn_chance(ctx);
        if rng.random::<f64>() >= chance {
            return None;
        }

        let room = rooms.get(rng.random_range(0..rooms.len()))?;
        let kind = roll_kind(rng);
        let difficulty = roll_difficulty(rng);

        debug!(
            vault_id = %vault_id,
            kind = ?kind,
            room = %room.name,
            difficulty,
            "Incident spawned"
        );

        Some(Incident {
            id: IncidentId::new(),
            vault_id,
            kind,
            status: IncidentStatus::Active,
            room_id: room.id,
            rooms_affected: std::iter::once(room.id).collect(),
            difficulty,
            start_time: now,
            damage_dealt: 0.0,
            enemies_defeated: 0,
            spread_count: 0,
        })
    }

    /// Advance every unresolved incident by `elapsed_seconds`: accrue
    /// damage and roll for spread to an adjacent room. Resolved incidents
    /// are untouched.
    ///
    /// Adjacency is positional over `rooms`: a room's neighbors are the
    /// entries immediately before and after it in the vault's room list.
    pub fn advance(
        &self,
        incidents: &mut [Incident],
        rooms: &[Room],
        elapsed_seconds: u64,
        rng: &mut impl Rng,
    ) -> AdvanceSummary {
        let elapsed = elapsed_seconds as f64;
        let mut summary = AdvanceSummary::default();

        for incident in incidents.iter_mut().filter(|i| i.is_unresolved()) {
            summary.advanced += 1;

            let damage = f64::from(incident.difficulty)
                * self.rates.damage_rate
                * params(incident.kind).damage_multiplier
                * elapsed;
            incident.damage_dealt += damage;

            if damage > 0.0 && !incident.rooms_affected.is_empty() {
                let per_room = damage / incident.rooms_affected.len() as f64;
                for room_id in &incident.rooms_affected {
                    *summary.damage_by_room.entry(*room_id).or_insert(0.0) += per_room;
                }
            }

            if params(incident.kind).can_spread && rng.random::<f64>() < self.rates.spread_chance {
                if let Some(target) = spread_target(incident, rooms) {
                    incident.rooms_affected.insert(target);
                    incident.spread_count += 1;
                    incident.status = IncidentStatus::Spreading;
                    summary.spread += 1;
                    debug!(
                        incident_id = %incident.id,
                        kind = ?incident.kind,
                        spread_count = incident.spread_count,
                        "Incident spread to adjacent room"
                    );
                }
            }
        }

        summary
    }
}

/// Pick the first positional neighbor of any affected room that is not
/// already affected, scanning the room list in order.
fn spread_target(incident: &Incident, rooms: &[Room]) -> Option<RoomId> {
    for (idx, room) in rooms.iter().enumerate() {
        if !incident.rooms_affected.contains(&room.id) {
            continue;
        }
        let neighbors = [idx.checked_sub(1), Some(idx + 1)];
        for neighbor in neighbors.into_iter().flatten() {
            if let Some(candidate) = rooms.get(neighbor) {
                if !incident.rooms_affected.contains(&candidate.id) {
                    return Some(candidate.id);
                }
            }
        }
    }
    None
}

/// Weighted kind selection over the closed kind set.
fn roll_kind(rng: &mut impl Rng) -> IncidentKind {
    let total: f64 = IncidentKind::ALL
        .iter()
        .map(|k| params(*k).spawn_weight)
        .sum();
    let mut roll = rng.random::<f64>() * total;
    for kind in IncidentKind::ALL {
        roll -= params(kind).spawn_weight;
        if roll < 0.0 {
            return kind;
        }
    }
    IncidentKind::Fire
}

/// Difficulty 1..=10, weighted toward the low end: difficulty `d` has
/// weight `11 - d`, so a 1 is ten times as likely as a 10.
fn roll_difficulty(rng: &mut impl Rng) -> u8 {
    // Sum of weights 10 + 9 + ... + 1.
    let mut roll = rng.random_range(0_u32..55);
    for difficulty in 1_u8..=10 {
        let weight = u32::from(11 - difficulty);
        if roll < weight {
            return difficulty;
        }
        roll -= weight;
    }
    1
}
