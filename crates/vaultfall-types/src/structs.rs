//! Core entity structs for the Vaultfall simulation.
//!
//! `GameState` and `VaultResources` are 1:1 with a vault; `Incident`,
//! `Room`, and `Dweller` are N:1. Resource quantities use `f64` end to
//! end: the engines compute in uniform floating precision and clamp on
//! every write, and floor rounding happens only at display projection.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{IncidentKind, IncidentStatus, ResourceKind, WarningLevel};
use crate::ids::{DwellerId, IncidentId, RoomId, VaultId};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A single resource reservoir with a current level and a capacity.
///
/// Invariant: `0 <= current <= max` after every engine call. The
/// constructor and [`set`](Self::set) clamp, so the invariant cannot be
/// broken through this type's API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourcePool {
    /// Current stored amount, always within `[0, max]`.
    pub current: f64,
    /// Storage capacity. Never negative.
    pub max: f64,
}

impl ResourcePool {
    /// Create a pool, clamping `current` into `[0, max]`.
    pub fn new(current: f64, max: f64) -> Self {
        let max = max.max(0.0);
        Self {
            current: current.clamp(0.0, max),
            max,
        }
    }

    /// Overwrite the current level, clamping into `[0, max]`.
    pub fn set(&mut self, value: f64) {
        self.current = value.clamp(0.0, self.max);
    }

    /// Fill ratio in `[0, 1]`. A zero-capacity pool reads as empty.
    pub fn ratio(&self) -> f64 {
        if self.max > 0.0 {
            self.current / self.max
        } else {
            0.0
        }
    }

    /// Floor-rounded current level for display and UI projections.
    pub fn display(&self) -> u64 {
        let floored = self.current.floor().max(0.0);
        if floored >= u64::MAX as f64 {
            u64::MAX
        } else {
            floored as u64
        }
    }
}

/// The three resource reservoirs embedded in a vault.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VaultResources {
    /// Electricity reservoir.
    pub power: ResourcePool,
    /// Food reservoir.
    pub food: ResourcePool,
    /// Water reservoir.
    pub water: ResourcePool,
}

impl VaultResources {
    /// Borrow the pool for a resource kind.
    pub const fn pool(&self, kind: ResourceKind) -> &ResourcePool {
        match kind {
            ResourceKind::Power => &self.power,
            ResourceKind::Food => &self.food,
            ResourceKind::Water => &self.water,
        }
    }

    /// Mutably borrow the pool for a resource kind.
    pub const fn pool_mut(&mut self, kind: ResourceKind) -> &mut ResourcePool {
        match kind {
            ResourceKind::Power => &mut self.power,
            ResourceKind::Food => &mut self.food,
            ResourceKind::Water => &mut self.water,
        }
    }
}

/// Net per-resource change applied by one tick (production minus
/// consumption, after clamping).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourcesDelta {
    /// Net power change.
    pub power: f64,
    /// Net food change.
    pub food: f64,
    /// Net water change.
    pub water: f64,
}

impl ResourcesDelta {
    /// Read the delta for a resource kind.
    pub const fn get(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Power => self.power,
            ResourceKind::Food => self.food,
            ResourceKind::Water => self.water,
        }
    }

    /// Write the delta for a resource kind.
    pub const fn set(&mut self, kind: ResourceKind, value: f64) {
        match kind {
            ResourceKind::Power => self.power = value,
            ResourceKind::Food => self.food = value,
            ResourceKind::Water => self.water = value,
        }
    }
}

/// A threshold warning emitted by the resource engine for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourceWarning {
    /// The resource the warning concerns.
    pub resource: ResourceKind,
    /// Warning severity. Critical supersedes low for the same resource.
    pub level: WarningLevel,
}

impl ResourceWarning {
    /// Canonical warning label, e.g. `critical_power` or `low_food`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.level.as_str(), self.resource.as_str())
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Per-vault scheduling record: the durable pause/active status, last
/// tick timestamp, and accumulated simulated time.
///
/// Invariant: `total_game_time` only increases, and only the tick
/// processor, holding the per-vault lease, may advance it. Pause and
/// resume touch `is_paused`/`last_tick_time` but never the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameState {
    /// The vault this record belongs to (1:1).
    pub vault_id: VaultId,
    /// Whether the vault exists in the active population at all.
    pub is_active: bool,
    /// Whether scheduled ticks are suspended for this vault.
    pub is_paused: bool,
    /// Wall-clock time of the last committed tick (or resume/creation).
    pub last_tick_time: DateTime<Utc>,
    /// Accumulated simulated seconds, monotonic non-decreasing.
    pub total_game_time: u64,
}

impl GameState {
    /// Create the game state for a freshly created vault: active, not
    /// paused, `last_tick_time` = creation time, zero simulated time.
    pub const fn new(vault_id: VaultId, created_at: DateTime<Utc>) -> Self {
        Self {
            vault_id,
            is_active: true,
            is_paused: false,
            last_tick_time: created_at,
            total_game_time: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Rooms and dwellers
// ---------------------------------------------------------------------------

/// A room in a vault.
///
/// Rooms that produce a resource do so proportionally to the ability of
/// their assigned dwellers. Every room consumes power proportionally to
/// `size * tier`. Adjacency for incident spread is positional: a room's
/// neighbors are the rooms next to it in the vault's room list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Human-readable room name.
    pub name: String,
    /// The resource this room produces, if any.
    pub produces: Option<ResourceKind>,
    /// Base output factor (units per ability point per second, before the
    /// global production rate and tier multiplier).
    pub output: f64,
    /// Number of merged room segments (drives power consumption).
    pub size: u32,
    /// Upgrade tier, 1 through 3.
    pub tier: u32,
}

/// A dweller, as projected into the tick engine.
///
/// The broader dweller lifecycle (hiring, leveling, outfits) is owned by
/// an external collaborator; the tick engine reads the assignment and
/// ability, and mutates only `health` and `is_alive`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Dweller {
    /// Dweller identifier.
    pub id: DwellerId,
    /// Human-readable dweller name.
    pub name: String,
    /// The room this dweller works in, if assigned.
    pub room_id: Option<RoomId>,
    /// Current health, `0..=100`. Incidents deal damage here.
    pub health: f64,
    /// Whether the dweller is alive. Dead dwellers stop consuming.
    pub is_alive: bool,
    /// Production ability stat relevant to the assigned room.
    pub ability: f64,
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// An incident threatening a vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Incident {
    /// Incident identifier.
    pub id: IncidentId,
    /// The vault this incident belongs to.
    pub vault_id: VaultId,
    /// The closed incident kind.
    pub kind: IncidentKind,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// The room where the incident started.
    pub room_id: RoomId,
    /// All rooms currently affected. Starts as `{room_id}`, grows while
    /// spreading.
    pub rooms_affected: BTreeSet<RoomId>,
    /// Difficulty 1 through 10, weighted toward lower values at spawn.
    pub difficulty: u8,
    /// Wall-clock time the incident spawned.
    pub start_time: DateTime<Utc>,
    /// Total damage accrued so far across all ticks.
    pub damage_dealt: f64,
    /// Enemies defeated by player actions (written by the resolve path).
    pub enemies_defeated: u32,
    /// How many times the incident has spread to an adjacent room.
    pub spread_count: u32,
}

impl Incident {
    /// Whether the incident still advances each tick.
    pub const fn is_unresolved(&self) -> bool {
        self.status.is_unresolved()
    }
}

// ---------------------------------------------------------------------------
// Tick result
// ---------------------------------------------------------------------------

/// Summary of one committed vault tick, returned by the force-tick
/// operation and logged by the scheduled path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickResult {
    /// The vault that ticked.
    pub vault_id: VaultId,
    /// Simulated seconds applied (post catch-up clamp).
    pub elapsed_seconds: u64,
    /// Net resource change after clamping.
    pub resources_delta: ResourcesDelta,
    /// Threshold warnings emitted this tick.
    pub warnings: Vec<ResourceWarning>,
    /// Incidents spawned this tick (zero or one).
    pub incidents_spawned: Vec<IncidentId>,
    /// Number of existing incidents that were advanced.
    pub incidents_advanced: u32,
    /// Number of dwellers that took incident damage this tick.
    pub dwellers_injured: u32,
    /// The vault's accumulated simulated time after this tick.
    pub total_game_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_clamps_on_construction() {
        let over = ResourcePool::new(1500.0, 1000.0);
        assert!((over.current - 1000.0).abs() < f64::EPSILON);

        let under = ResourcePool::new(-3.0, 1000.0);
        assert!(under.current.abs() < f64::EPSILON);
    }

    #[test]
    fn pool_set_clamps() {
        let mut pool = ResourcePool::new(500.0, 1000.0);
        pool.set(-50.0);
        assert!(pool.current.abs() < f64::EPSILON);
        pool.set(2000.0);
        assert!((pool.current - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pool_display_floors() {
        let pool = ResourcePool::new(99.9, 1000.0);
        assert_eq!(pool.display(), 99);
    }

    #[test]
    fn zero_capacity_pool_ratio_is_zero() {
        let pool = ResourcePool::new(0.0, 0.0);
        assert!(pool.ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn warning_labels() {
        let warning = ResourceWarning {
            resource: ResourceKind::Power,
            level: WarningLevel::Critical,
        };
        assert_eq!(warning.label(), "critical_power");

        let warning = ResourceWarning {
            resource: ResourceKind::Food,
            level: WarningLevel::Low,
        };
        assert_eq!(warning.label(), "low_food");
    }

    #[test]
    fn new_game_state_defaults() {
        let vault_id = VaultId::new();
        let now = Utc::now();
        let state = GameState::new(vault_id, now);
        assert!(state.is_active);
        assert!(!state.is_paused);
        assert_eq!(state.last_tick_time, now);
        assert_eq!(state.total_game_time, 0);
    }

    #[test]
    fn incident_serde_roundtrip() {
        let incident = Incident {
            id: IncidentId::new(),
            vault_id: VaultId::new(),
            kind: IncidentKind::Fire,
            status: IncidentStatus::Active,
            room_id: RoomId::new(),
            rooms_affected: BTreeSet::new(),
            difficulty: 3,
            start_time: Utc::now(),
            damage_dealt: 0.0,
            enemies_defeated: 0,
            spread_count: 0,
        };
        let json = serde_json::to_string(&incident).ok();
        assert!(json.is_some());
        let restored: Result<Incident, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert!(restored.is_ok());
    }
}
