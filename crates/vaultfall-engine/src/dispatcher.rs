//! The tick dispatcher: fans scheduled ticks out over a bounded worker
//! pool.
//!
//! Every cycle the dispatcher lists schedulable vaults and runs each
//! vault's tick as its own task, bounded by a semaphore so a large vault
//! population cannot exhaust the runtime. Vaults are independent: one
//! vault's failure or timeout never blocks another's tick. A vault whose
//! tick times out counts as failed for the cycle and is retried on the
//! next one (its lease expiry guarantees eventual reclamation if the
//! task wedged).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{error, info, warn};
use vaultfall_sim::config::SchedulerConfig;

use crate::error::TickError;
use crate::processor::{TickProcessor, TickReport};

/// Counts for one dispatcher cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Vaults whose tick completed and committed.
    pub completed: u32,
    /// Vaults skipped (paused or lease contention).
    pub skipped: u32,
    /// Vaults whose tick errored or timed out.
    pub failed: u32,
    /// Wall-clock time the cycle took.
    pub duration: Duration,
}

/// Periodic scheduler driving ticks for all active vaults.
pub struct TickDispatcher {
    processor: Arc<TickProcessor>,
    scheduler: SchedulerConfig,
    stopped: Arc<AtomicBool>,
}

impl TickDispatcher {
    /// Create a dispatcher over the given processor.
    pub fn new(processor: Arc<TickProcessor>, scheduler: SchedulerConfig) -> Self {
        Self {
            processor,
            scheduler,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that stops the dispatch loop after the current cycle.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopped: Arc::clone(&self.stopped),
        }
    }

    /// Run the dispatch loop until stopped. The first cycle runs after
    /// one full interval, not immediately.
    pub async fn run(&self) {
        let period = Duration::from_secs(self.scheduler.tick_interval_seconds.max(1));
        let mut ticker = interval(period);
        // A delayed cycle must not cause a burst of catch-up cycles; the
        // clock catch-up inside each tick already accounts for the gap.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            interval_seconds = self.scheduler.tick_interval_seconds,
            worker_pool_size = self.scheduler.worker_pool_size,
            "Tick dispatcher started"
        );

        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            self.run_cycle().await;
        }

        info!("Tick dispatcher stopped");
    }

    /// Run one dispatch cycle: tick every schedulable vault, bounded by
    /// the worker pool, and return the batch summary.
    pub async fn run_cycle(&self) -> BatchSummary {
        let started = std::time::Instant::now();
        let vault_ids = self.processor.store().list_schedulable().await;
        if vault_ids.is_empty() {
            return BatchSummary {
                duration: started.elapsed(),
                ..BatchSummary::default()
            };
        }

        let semaphore = Arc::new(Semaphore::new(self.scheduler.worker_pool_size.max(1)));
        let tick_timeout = Duration::from_secs(self.scheduler.tick_timeout_seconds.max(1));
        let mut tasks = JoinSet::new();

        for vault_id in vault_ids {
            let processor = Arc::clone(&self.processor);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    // Semaphore closes only on shutdown.
                    return (vault_id, None);
                };
                let outcome = timeout(tick_timeout, processor.run_tick(vault_id)).await;
                (vault_id, Some(outcome))
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some(Ok(Ok(TickReport::Completed(_)))))) => {
                    summary.completed += 1;
                }
                Ok((_, Some(Ok(Ok(TickReport::Skipped(_)))))) => {
                    summary.skipped += 1;
                }
                Ok((vault_id, Some(Ok(Err(e))))) => {
                    summary.failed += 1;
                    error!(vault_id = %vault_id, error = %e, "Vault tick failed");
                }
                Ok((vault_id, Some(Err(_)))) => {
                    summary.failed += 1;
                    let error = TickError::Timeout(vault_id);
                    warn!(
                        vault_id = %vault_id,
                        error = %error,
                        timeout_seconds = self.scheduler.tick_timeout_seconds,
                        "Vault tick timed out, will retry next cycle"
                    );
                }
                Ok((_, None)) => {
                    summary.skipped += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(error = %e, "Vault tick task panicked or was cancelled");
                }
            }
        }

        summary.duration = started.elapsed();
        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            duration_ms = u64::try_from(summary.duration.as_millis()).unwrap_or(u64::MAX),
            "Dispatch cycle finished"
        );
        summary
    }
}

/// Stops a running [`TickDispatcher`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the dispatcher stop after its current cycle.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::unreachable, clippy::indexing_slicing)]
mod tests {
    use vaultfall_sim::config::SimulationConfig;
    use vaultfall_store::{NewVault, VaultStore};
    use vaultfall_types::{ResourcePool, VaultResources};

    use super::*;

    fn empty_vault(name: &str) -> NewVault {
        NewVault {
            name: name.to_owned(),
            resources: VaultResources {
                power: ResourcePool::new(500.0, 1000.0),
                food: ResourcePool::new(500.0, 1000.0),
                water: ResourcePool::new(500.0, 1000.0),
            },
            rooms: Vec::new(),
            dwellers: Vec::new(),
        }
    }

    async fn setup(vaults: usize) -> (Arc<VaultStore>, TickDispatcher) {
        let store = Arc::new(VaultStore::memory());
        for i in 0..vaults {
            let created = store.create_vault(empty_vault(&format!("Vault {i}"))).await;
            assert!(created.is_ok());
        }
        let config = SimulationConfig::default();
        let processor = Arc::new(TickProcessor::new(Arc::clone(&store), &config));
        let dispatcher = TickDispatcher::new(processor, config.scheduler);
        (store, dispatcher)
    }

    #[tokio::test]
    async fn cycle_ticks_every_schedulable_vault() {
        let (store, dispatcher) = setup(5).await;
        let before = chrono::Utc::now();
        let summary = dispatcher.run_cycle().await;

        assert_eq!(summary.completed, 5);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);

        // Every vault's anchor moved to the tick time.
        for state in store.list_states().await {
            assert!(state.last_tick_time >= before);
        }
    }

    #[tokio::test]
    async fn paused_vaults_are_not_dispatched() {
        let (store, dispatcher) = setup(3).await;
        let states = store.list_states().await;
        let _ = store.pause(states[0].vault_id).await;

        let summary = dispatcher.run_cycle().await;
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn contended_vault_counts_as_skipped() {
        let (store, dispatcher) = setup(2).await;
        let states = store.list_states().await;
        let _guard = store.try_lease(states[0].vault_id, 120);

        let summary = dispatcher.run_cycle().await;
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn timed_out_vault_fails_without_blocking_the_batch() {
        let store = Arc::new(VaultStore::memory());
        for i in 0..3 {
            let created = store.create_vault(empty_vault(&format!("Vault {i}"))).await;
            assert!(created.is_ok());
        }
        let states = store.list_states().await;
        let slow = states[0].vault_id;
        let slow_anchor = states[0].last_tick_time;

        let config = SimulationConfig::default();
        let processor = Arc::new(
            TickProcessor::new(Arc::clone(&store), &config)
                .with_stalled_vault(slow, Duration::from_secs(30)),
        );
        let scheduler = SchedulerConfig {
            tick_timeout_seconds: 1,
            ..config.scheduler
        };
        let dispatcher = TickDispatcher::new(processor, scheduler);

        let summary = dispatcher.run_cycle().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped, 0);

        // The timed-out vault committed nothing; it retries next cycle.
        let Ok(state) = store.game_state(slow).await else {
            unreachable!("vault exists")
        };
        assert_eq!(state.last_tick_time, slow_anchor);

        // The other vaults were unaffected by the stalled one.
        for state in store.list_states().await {
            if state.vault_id != slow {
                assert!(state.last_tick_time > slow_anchor);
            }
        }
    }

    #[tokio::test]
    async fn empty_store_is_a_quiet_cycle() {
        let (_, dispatcher) = setup(0).await;
        let summary = dispatcher.run_cycle().await;
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn stop_handle_ends_the_loop() {
        let store = Arc::new(VaultStore::memory());
        let config = SimulationConfig::default();
        let processor = Arc::new(TickProcessor::new(store, &config));
        let scheduler = SchedulerConfig {
            tick_interval_seconds: 1,
            ..config.scheduler
        };
        let dispatcher = TickDispatcher::new(processor, scheduler);
        let stop = dispatcher.stop_handle();
        stop.stop();

        // With the stop flag set before the first interval fires, run()
        // returns after one period without dispatching.
        let run = tokio::time::timeout(Duration::from_secs(10), dispatcher.run()).await;
        assert!(run.is_ok());
    }
}
