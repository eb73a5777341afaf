//! Enumeration types for the Vaultfall simulation.
//!
//! Incident kinds form a closed set: per-kind behavior (spawn weight,
//! damage curve) lives in a lookup table in the simulation crate rather
//! than in any polymorphic dispatch.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// One of the three vault resources tracked per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Electricity produced by power rooms and consumed by all rooms.
    Power,
    /// Food produced by diners/gardens and consumed per living dweller.
    Food,
    /// Purified water produced by treatment rooms, consumed per dweller.
    Water,
}

impl ResourceKind {
    /// All resource kinds, in canonical order.
    pub const ALL: [Self; 3] = [Self::Power, Self::Food, Self::Water];

    /// Lower-case label used in warning names and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Food => "food",
            Self::Water => "water",
        }
    }
}

/// Severity of a resource threshold warning.
///
/// `Critical` supersedes `Low`: a resource never emits both in the same
/// tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    /// Resource at or below the low threshold (default 20% of max).
    Low,
    /// Resource at or below the critical threshold (default 5% of max).
    Critical,
}

impl WarningLevel {
    /// Lower-case label used in warning names (`low_power` etc.).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// The kind of an incident threatening a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Armed raiders breaching the vault door.
    RaiderAttack,
    /// Radroach or mole rat infestation.
    Infestation,
    /// Fire breaking out in a room.
    Fire,
    /// Radiation leaking from a breach or failed seal.
    RadiationLeak,
    /// Electrical fault disabling equipment.
    ElectricalFailure,
    /// Contaminated water supply.
    WaterContamination,
}

impl IncidentKind {
    /// All incident kinds, in canonical order.
    pub const ALL: [Self; 6] = [
        Self::RaiderAttack,
        Self::Infestation,
        Self::Fire,
        Self::RadiationLeak,
        Self::ElectricalFailure,
        Self::WaterContamination,
    ];
}

/// Lifecycle status of an incident.
///
/// `Resolved` is terminal and is only ever set by the resolve operation
/// (player action); the engine advances incidents but never resolves them
/// spontaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// The incident is confined to its starting room.
    Active,
    /// The incident has spread to at least one adjacent room.
    Spreading,
    /// The incident has been resolved (success or failure).
    Resolved,
}

impl IncidentStatus {
    /// Whether the incident still advances each tick.
    pub const fn is_unresolved(self) -> bool {
        matches!(self, Self::Active | Self::Spreading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_labels_are_lowercase() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str(), kind.as_str().to_lowercase());
        }
    }

    #[test]
    fn resolved_is_terminal() {
        assert!(IncidentStatus::Active.is_unresolved());
        assert!(IncidentStatus::Spreading.is_unresolved());
        assert!(!IncidentStatus::Resolved.is_unresolved());
    }

    #[test]
    fn incident_kind_serde_snake_case() {
        let json = serde_json::to_string(&IncidentKind::RadiationLeak).ok();
        assert_eq!(json.as_deref(), Some("\"radiation_leak\""));
    }
}
