//! Vault API server for the Vaultfall simulation.
//!
//! An Axum HTTP server exposing:
//!
//! - **Vault endpoints** for creating and inspecting vaults
//! - **Control endpoints** for pause, resume, and forced ticks
//! - **Incident endpoints** for listing and resolving incidents
//! - **Minimal HTML status page** (`GET /`)
//!
//! All reads come from the in-memory [`VaultStore`]; writes go through
//! the same store (and its `PostgreSQL` layer when configured) that the
//! tick dispatcher uses, so the API and the scheduler always agree.
//!
//! [`VaultStore`]: vaultfall_store::VaultStore

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, spawn_server, start_server};
pub use state::AppState;
