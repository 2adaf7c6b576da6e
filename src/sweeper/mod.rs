// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Update sweeper lifecycle.
//!
//! [`UpdateSweeper`] ties together:
//! - Queue access via a [`QueueConnector`]
//! - Replica placement via a [`ReplicaResolver`]
//! - Network delivery via a [`DeliveryClient`]
//! - The per-location [`SweepDriver`] and the periodic loop in [`schedule`]
//!
//! # Modes
//!
//! - **Once**: [`run_once()`](UpdateSweeper::run_once) sweeps every location a
//!   single time and returns the merged counters.
//! - **Daemon**: [`start()`](UpdateSweeper::start) spawns the sweep loop;
//!   [`shutdown()`](UpdateSweeper::shutdown) stops it and closes the queues.

mod driver;
pub mod schedule;
mod types;

pub use driver::SweepDriver;
pub use types::{LocationOutcome, SweeperState};

use crate::config::SweeperConfig;
use crate::delivery::DeliveryClient;
use crate::error::{Result, SweepError};
use crate::metrics;
use crate::processor::UpdateProcessor;
use crate::queue::QueueConnector;
use crate::resilience::RateLimiter;
use crate::ring::{sweep_locations, ReplicaResolver};
use crate::stats::SweepStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Extra time allowed for the loop to finish after the in-flight deliveries time out.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Drains pending-update queues to replica nodes.
pub struct UpdateSweeper<C, R, D>
where
    C: QueueConnector,
    R: ReplicaResolver,
    D: DeliveryClient,
{
    config: Arc<SweeperConfig>,

    connector: Arc<C>,

    driver: SweepDriver<C, R, D>,

    /// Sweeper state (broadcast to watchers)
    state_tx: watch::Sender<SweeperState>,
    state_rx: watch::Receiver<SweeperState>,

    /// Shutdown signal
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    /// Sweep loop task (daemon mode only)
    loop_handle: Option<JoinHandle<()>>,
}

impl<C, R, D> UpdateSweeper<C, R, D>
where
    C: QueueConnector,
    R: ReplicaResolver,
    D: DeliveryClient,
{
    /// Create a sweeper in the `Created` state.
    pub fn new(config: SweeperConfig, connector: Arc<C>, resolver: Arc<R>, delivery: Arc<D>) -> Self {
        let (state_tx, state_rx) = watch::channel(SweeperState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let rate_limiter = config.rate_limit_config().map(|cfg| {
            info!(
                rate_per_sec = cfg.per_second,
                burst = cfg.burst,
                "Rate limiting enabled for pending updates"
            );
            Arc::new(RateLimiter::new(cfg))
        });

        let processor = UpdateProcessor::new(resolver, delivery);
        let driver = SweepDriver::new(
            Arc::clone(&connector),
            processor,
            rate_limiter,
            config.scan_page_size,
        );

        Self {
            config: Arc::new(config),
            connector,
            driver,
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            loop_handle: None,
        }
    }

    /// Get current sweeper state.
    pub fn state(&self) -> SweeperState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<SweeperState> {
        self.state_rx.clone()
    }

    /// Check if the sweep loop is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), SweeperState::Running)
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Locations the next sweep will visit.
    pub fn locations(&self) -> Vec<String> {
        sweep_locations(&self.config.devices, &self.config.policies)
    }

    fn set_state(&self, state: SweeperState) {
        let _ = self.state_tx.send(state);
        metrics::set_sweeper_state(state.as_str());
    }

    fn require_created(&self) -> Result<()> {
        if self.state() != SweeperState::Created {
            return Err(SweepError::InvalidState {
                expected: SweeperState::Created.to_string(),
                actual: self.state().to_string(),
            });
        }
        Ok(())
    }

    /// Sweep every location once.
    ///
    /// Only valid before [`start()`](Self::start): the loop and a single pass
    /// must never own the same location at the same time.
    pub async fn run_once(&self) -> Result<SweepStats> {
        self.require_created()?;
        let (stats, _) = schedule::run_sweep(&self.driver, &self.config, &self.shutdown_rx).await;
        Ok(stats)
    }

    /// Spawn the periodic sweep loop.
    ///
    /// An invalid config moves the sweeper to [`SweeperState::Failed`].
    pub async fn start(&mut self) -> Result<()> {
        self.require_created()?;

        if let Err(e) = self.config.validate() {
            error!(error = %e, "Refusing to start update sweeper");
            self.set_state(SweeperState::Failed);
            return Err(e);
        }

        let locations = self.locations();
        if locations.is_empty() {
            warn!("No locations configured; sweeps will be empty");
        }
        info!(
            locations = locations.len(),
            interval_secs = self.config.interval_sec,
            concurrency = self.config.concurrency,
            "Starting update sweeper"
        );

        let driver = self.driver.clone();
        let config = Arc::clone(&self.config);
        let shutdown_rx = self.shutdown_rx.clone();
        self.loop_handle = Some(tokio::spawn(schedule::run_sweep_loop(
            driver,
            config,
            shutdown_rx,
        )));

        self.set_state(SweeperState::Running);
        info!("Update sweeper running");
        Ok(())
    }

    /// Stop the sweep loop and close every queue connection.
    ///
    /// Shutdown sequence:
    /// 1. Signal the loop and the location workers
    /// 2. Wait for the in-flight entries to finish (bounded)
    /// 3. Close queue connections
    pub async fn shutdown(&mut self) {
        info!("Shutting down update sweeper");
        self.set_state(SweeperState::ShuttingDown);

        let _ = self.shutdown_tx.send(true);

        if let Some(mut handle) = self.loop_handle.take() {
            let drain_timeout = self.config.node_timeout_duration() + SHUTDOWN_GRACE;
            match tokio::time::timeout(drain_timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Sweep loop completed gracefully"),
                Ok(Err(e)) => warn!(error = %e, "Sweep loop panicked during shutdown"),
                Err(_) => {
                    warn!(
                        timeout_secs = drain_timeout.as_secs(),
                        "Sweep loop did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }

        self.connector.close_all().await;

        self.set_state(SweeperState::Stopped);
        info!("Update sweeper stopped");
    }
}
