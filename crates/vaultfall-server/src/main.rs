//! Vaultfall server entry point.
//!
//! Boots the whole stack in one process:
//!
//! 1. Structured logging (`tracing` with `RUST_LOG` filtering)
//! 2. YAML configuration (`vaultfall-config.yaml`, env overrides)
//! 3. Game state store: `PostgreSQL`-backed when a URL is configured
//!    (migrations + hydration), memory-only otherwise
//! 4. Vault API server on a background task
//! 5. Tick dispatcher loop, until `Ctrl-C`

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vaultfall_api::AppState;
use vaultfall_engine::{TickDispatcher, TickProcessor, seed};
use vaultfall_sim::config::SimulationConfig;
use vaultfall_store::{PostgresPool, VaultStore};

/// Default configuration file path, relative to the working directory.
const CONFIG_PATH: &str = "vaultfall-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if initialization fails (config, database, or API
/// bind). The dispatcher loop itself runs until `Ctrl-C`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("vaultfall-server starting");

    let config_path = Path::new(CONFIG_PATH);
    let config = if config_path.exists() {
        SimulationConfig::from_file(config_path)?
    } else {
        warn!(path = CONFIG_PATH, "Config file not found, using defaults");
        SimulationConfig::default()
    };
    info!(
        tick_interval_seconds = config.scheduler.tick_interval_seconds,
        worker_pool_size = config.scheduler.worker_pool_size,
        max_offline_catchup_seconds = config.clock.max_offline_catchup_seconds,
        "configuration loaded"
    );

    let store = if config.infrastructure.postgres_url.is_empty() {
        warn!("No PostgreSQL URL configured, running memory-only (state is not durable)");
        Arc::new(VaultStore::memory())
    } else {
        let pool = PostgresPool::connect_url(&config.infrastructure.postgres_url).await?;
        pool.run_migrations().await?;
        let store = Arc::new(VaultStore::with_postgres(pool));
        let count = store.hydrate().await?;
        info!(vaults = count, "Store hydrated");
        store
    };

    // An empty deployment gets one demo vault so there is something to
    // watch and poke at.
    if store.list_states().await.is_empty() {
        let created = store.create_vault(seed::demo_vault()).await?;
        info!(vault_id = %created.vault_id, "Seeded demo vault");
    }

    let processor = Arc::new(TickProcessor::new(Arc::clone(&store), &config));
    let dispatcher = TickDispatcher::new(Arc::clone(&processor), config.scheduler.clone());
    let stop = dispatcher.stop_handle();

    let app_state = Arc::new(AppState::new(Arc::clone(&store), processor));
    let api_handle =
        vaultfall_api::spawn_server(config.infrastructure.api_port, app_state).await?;
    info!(port = config.infrastructure.api_port, "Vault API started");

    tokio::select! {
        () = dispatcher.run() => {
            warn!("Dispatcher loop exited");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
            stop.stop();
        }
    }

    api_handle.abort();
    info!("vaultfall-server stopped");
    Ok(())
}
