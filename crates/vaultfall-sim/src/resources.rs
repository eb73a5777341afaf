//! Resource production and consumption engine.
//!
//! One call to [`ResourceEngine::advance`] converts an elapsed simulated
//! duration into a new resource snapshot plus threshold warnings. The
//! engine is pure: it reads its rate constants at construction and never
//! touches storage, clocks, or randomness, which makes every formula here
//! directly unit-testable.
//!
//! # Formulas
//!
//! - Production per room: `output * ability_sum * base_rate * tier_mult * elapsed`
//!   where `ability_sum` sums the ability of living dwellers assigned to
//!   the room and `tier_mult` is 1.0 / 1.25 / 1.5 for tiers 1 / 2 / 3.
//! - Power consumption: `sum(size * tier) * power_rate * elapsed` over all
//!   rooms, powered or not.
//! - Food and water consumption: `living_dwellers * rate * elapsed`. Dead
//!   dwellers consume nothing.
//!
//! Levels clamp into `[0, max]` after the net change; shortfall beyond the
//! floor is forgiven, not carried as debt.

use tracing::debug;
use vaultfall_types::{
    Dweller, ResourceKind, ResourcePool, ResourceWarning, ResourcesDelta, Room, VaultResources,
    WarningLevel,
};

use crate::config::ResourceRatesConfig;

/// Output of one resource advance: the new snapshot, the net applied
/// delta, and any threshold warnings from the post-tick levels.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOutcome {
    /// Resource levels after production, consumption, and clamping.
    pub resources: VaultResources,
    /// Net change actually applied per resource (post-clamp, so a pool
    /// already at its floor reports a smaller magnitude than the raw
    /// production-minus-consumption).
    pub delta: ResourcesDelta,
    /// Threshold warnings, at most one per resource.
    pub warnings: Vec<ResourceWarning>,
}

/// Multiplier applied to a room's production for its upgrade tier.
pub fn tier_multiplier(tier: u32) -> f64 {
    match tier {
        0 | 1 => 1.0,
        2 => 1.25,
        _ => 1.5,
    }
}

/// Pure resource computation over rooms and dwellers.
#[derive(Debug, Clone)]
pub struct ResourceEngine {
    rates: ResourceRatesConfig,
}

impl ResourceEngine {
    /// Create an engine with the given rate constants.
    pub fn new(rates: &ResourceRatesConfig) -> Self {
        Self {
            rates: rates.clone(),
        }
    }

    /// Advance resource levels by `elapsed_seconds` of simulated time.
    ///
    /// Computes gross production and consumption, applies the net change
    /// with clamping into `[0, max]` per pool, and derives warnings from
    /// the post-tick fill ratios. Does not mutate its inputs.
    pub fn advance(
        &self,
        resources: &VaultResources,
        rooms: &[Room],
        dwellers: &[Dweller],
        elapsed_seconds: u64,
    ) -> ResourceOutcome {
        let elapsed = elapsed_seconds as f64;

        let mut produced = ResourcesDelta::default();
        for room in rooms {
            let Some(kind) = room.produces else { continue };
            let ability_sum: f64 = dwellers
                .iter()
                .filter(|d| d.is_alive && d.room_id == Some(room.id))
                .map(|d| d.ability)
                .sum();
            let amount = room.output
                * ability_sum
                * self.rates.base_production_rate
                * tier_multiplier(room.tier)
                * elapsed;
            produced.set(kind, produced.get(kind) + amount);
        }

        let living = dwellers.iter().filter(|d| d.is_alive).count() as f64;
        let segment_tiers: f64 = rooms.iter().map(|r| f64::from(r.size * r.tier)).sum();

        let mut consumed = ResourcesDelta::default();
        consumed.set(
            ResourceKind::Power,
            segment_tiers * self.rates.power_consumption_rate * elapsed,
        );
        consumed.set(
            ResourceKind::Food,
            living * self.rates.food_per_dweller_rate * elapsed,
        );
        consumed.set(
            ResourceKind::Water,
            living * self.rates.water_per_dweller_rate * elapsed,
        );

        let mut next = *resources;
        let mut delta = ResourcesDelta::default();
        for kind in ResourceKind::ALL {
            let pool = next.pool_mut(kind);
            let before = pool.current;
            pool.set(before + produced.get(kind) - consumed.get(kind));
            delta.set(kind, pool.current - before);
        }

        let warnings = self.warnings_for(&next);
        if !warnings.is_empty() {
            debug!(
                warnings = ?warnings.iter().map(ResourceWarning::label).collect::<Vec<_>>(),
                "Resource thresholds crossed"
            );
        }

        ResourceOutcome {
            resources: next,
            delta,
            warnings,
        }
    }

    /// Derive threshold warnings from a resource snapshot. At most one
    /// warning per resource; critical supersedes low.
    pub fn warnings_for(&self, resources: &VaultResources) -> Vec<ResourceWarning> {
        let mut warnings = Vec::new();
        for kind in ResourceKind::ALL {
            if let Some(level) = self.warning_level(resources.pool(kind)) {
                warnings.push(ResourceWarning {
                    resource: kind,
                    level,
                });
            }
        }
        warnings
    }

    fn warning_level(&self, pool: &ResourcePool) -> Option<WarningLevel> {
        let ratio = pool.ratio();
        if ratio <= self.rates.critical_resource_threshold {
            Some(WarningLevel::Critical)
        } else if ratio <= self.rates.low_resource_threshold {
            Some(WarningLevel::Low)
        } else {
            None
        }
    }
}
