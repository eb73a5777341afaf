//! Tick processing engine for Vaultfall.
//!
//! Ties the pure simulation engines (`vaultfall-sim`) to time, storage
//! (`vaultfall-store`), and the scheduler: the [`TickProcessor`] runs one
//! vault's tick end to end, and the [`TickDispatcher`] fans scheduled
//! ticks across all active vaults on a bounded worker pool.
//!
//! # Modules
//!
//! - [`processor`] -- one vault, one tick: lock, snapshot, compute, commit
//! - [`dispatcher`] -- periodic fan-out over all schedulable vaults
//! - [`seed`] -- demo vault for local development
//! - [`error`] -- [`TickError`]

pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod seed;

pub use dispatcher::{BatchSummary, StopHandle, TickDispatcher};
pub use error::TickError;
pub use processor::{SkipReason, TickProcessor, TickReport};
