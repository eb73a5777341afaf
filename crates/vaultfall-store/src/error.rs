//! Error types for the game state store.
//!
//! All store operations report failures through [`StoreError`], which
//! wraps the underlying [`sqlx`] errors with context about which layer
//! failed. Lock contention is a first-class variant so the tick processor
//! can treat it as "skip this cycle" rather than an error.

use vaultfall_types::{IncidentId, VaultId};

/// Errors that can occur in the game state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested vault does not exist.
    #[error("vault not found: {0}")]
    VaultNotFound(VaultId),

    /// The requested incident does not exist in the vault.
    #[error("incident not found: {0}")]
    IncidentNotFound(IncidentId),

    /// Another worker holds the per-vault tick lease.
    #[error("tick lease for vault {0} is held by another worker")]
    LeaseHeld(VaultId),

    /// A tick commit was computed against a scheduling anchor that a
    /// pause or resume moved in the meantime. The computed result is
    /// discarded; nothing is written.
    #[error("tick commit for vault {0} is stale, scheduling record changed mid-tick")]
    StaleCommit(VaultId),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
