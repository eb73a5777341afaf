//! Error types for tick processing.

use vaultfall_store::StoreError;
use vaultfall_types::VaultId;

/// Errors that can occur while processing a vault tick.
///
/// Skips (paused vault, held lease) are not errors on the scheduled
/// path; they become errors only when a caller explicitly forced the
/// tick and needs to know why nothing happened.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The vault does not exist.
    #[error("vault not found: {0}")]
    VaultNotFound(VaultId),

    /// The vault is paused, so a forced tick cannot run.
    #[error("vault {0} is paused")]
    VaultPaused(VaultId),

    /// Another worker holds the vault's tick lease.
    #[error("vault {0} is already being processed")]
    Contention(VaultId),

    /// The tick exceeded its execution timeout.
    #[error("tick for vault {0} timed out")]
    Timeout(VaultId),

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
