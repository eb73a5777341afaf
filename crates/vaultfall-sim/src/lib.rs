//! Pure simulation engines for Vaultfall.
//!
//! Everything in this crate is deterministic given its inputs: no I/O, no
//! wall clock reads, no ambient randomness. The tick processor in
//! `vaultfall-engine` wires these engines to time, storage, and the
//! scheduler.
//!
//! # Modules
//!
//! - [`clock`] -- wall-clock gaps to bounded simulated seconds
//! - [`config`] -- typed YAML configuration with environment overrides
//! - [`resources`] -- production, consumption, and threshold warnings
//! - [`incidents`] -- incident spawn rolls and advancement

pub mod clock;
pub mod config;
pub mod incidents;
pub mod resources;

pub use clock::elapsed_seconds;
pub use config::{ConfigError, SimulationConfig};
pub use incidents::{AdvanceSummary, IncidentEngine, SpawnContext};
pub use resources::{ResourceEngine, ResourceOutcome};
