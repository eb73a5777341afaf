//! Shared type definitions for the Vaultfall simulation.
//!
//! This crate is the single source of truth for all types used across the
//! Vaultfall workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the overseer dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Enumeration types (resources, incidents, warnings)
//! - [`structs`] -- Core entity structs (game state, rooms, dwellers,
//!   incidents, tick results)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{IncidentKind, IncidentStatus, ResourceKind, WarningLevel};
pub use ids::{DwellerId, IncidentId, RoomId, VaultId};
pub use structs::{
    Dweller, GameState, Incident, ResourcePool, ResourceWarning, ResourcesDelta, Room, TickResult,
    VaultResources,
};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are used. Importing them here triggers generation.
        // The actual files are written to the `bindings/` directory
        // relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::VaultId::export_all();
        let _ = crate::ids::RoomId::export_all();
        let _ = crate::ids::DwellerId::export_all();
        let _ = crate::ids::IncidentId::export_all();
        let _ = crate::enums::ResourceKind::export_all();
        let _ = crate::enums::IncidentKind::export_all();
        let _ = crate::structs::GameState::export_all();
        let _ = crate::structs::Incident::export_all();
        let _ = crate::structs::TickResult::export_all();
    }
}
