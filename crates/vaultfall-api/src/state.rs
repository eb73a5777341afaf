//! Shared application state for the Vault API server.

use std::sync::Arc;

use vaultfall_engine::TickProcessor;
use vaultfall_store::VaultStore;

/// State shared by all request handlers.
pub struct AppState {
    /// The authoritative game state store.
    pub store: Arc<VaultStore>,
    /// Processor used by the force-tick endpoint. Shares the store (and
    /// its lease table) with the scheduled dispatcher, so a forced tick
    /// and a scheduled tick can never run concurrently for one vault.
    pub processor: Arc<TickProcessor>,
}

impl AppState {
    /// Create the application state.
    pub fn new(store: Arc<VaultStore>, processor: Arc<TickProcessor>) -> Self {
        Self { store, processor }
    }
}
