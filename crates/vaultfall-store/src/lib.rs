//! Game state store for Vaultfall.
//!
//! Two layers: an in-memory authoritative store that serves all reads and
//! takes all writes, and an optional `PostgreSQL` cold store that makes
//! ticks durable. Every tick commits to `PostgreSQL` in one transaction
//! before the in-memory state moves, so the two layers never diverge past
//! a single in-flight tick.
//!
//! # Modules
//!
//! - [`store`] -- the [`VaultStore`] and its commit protocol
//! - [`lease`] -- per-vault tick leases (mutual exclusion)
//! - [`postgres`] -- connection pool and migrations
//! - [`persist`] -- SQL for vault, dweller, and incident persistence
//! - [`error`] -- [`StoreError`]

pub mod error;
pub mod lease;
pub mod persist;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use lease::{LeaseGuard, LeaseTable};
pub use postgres::{PostgresConfig, PostgresPool};
pub use store::{NewVault, TickCommit, VaultSnapshot, VaultStore};
