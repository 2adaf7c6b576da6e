// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sweep scheduling.
//!
//! [`sweep_all`] runs one full sweep over a set of locations, up to
//! `concurrency` at a time. [`run_sweep_loop`] repeats it on a ticker until
//! shutdown.
//!
//! # Pacing
//!
//! ```text
//! t0 = now + jitter            jitter ~ U[0, interval)
//! tick at t0, t0 + I, t0 + 2I, ...
//! ```
//!
//! A sweep shorter than the interval waits for the next tick. A sweep longer
//! than the interval finds the tick already due and starts the next sweep
//! immediately; missed ticks are not replayed.

use super::driver::SweepDriver;
use crate::config::SweeperConfig;
use crate::delivery::DeliveryClient;
use crate::metrics;
use crate::queue::QueueConnector;
use crate::resilience::LocationSlots;
use crate::ring::{sweep_locations, ReplicaResolver};
use crate::stats::SweepStats;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn, Instrument};

/// Random startup delay within one interval.
pub fn jitter_delay(interval: Duration) -> Duration {
    if interval.is_zero() {
        return Duration::ZERO;
    }
    interval.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
}

/// Sweep every location once and merge the per-location counters.
///
/// Each location is owned by exactly one task. Shutdown is checked before
/// each location starts; locations already running finish their current
/// entry and stop.
#[instrument(skip_all, fields(locations = locations.len(), concurrency = concurrency))]
pub async fn sweep_all<C, R, D>(
    driver: &SweepDriver<C, R, D>,
    locations: &[String],
    concurrency: usize,
    shutdown_rx: &watch::Receiver<bool>,
) -> SweepStats
where
    C: QueueConnector,
    R: ReplicaResolver,
    D: DeliveryClient,
{
    let slots = LocationSlots::new(concurrency);
    let mut tasks = JoinSet::new();
    let mut total = SweepStats::default();

    for location in locations {
        if *shutdown_rx.borrow() {
            debug!("Shutdown requested, not starting remaining locations");
            break;
        }

        let permit = match slots.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(error = %e, "Location slots closed");
                break;
            }
        };
        // Shutdown may have arrived while waiting for a slot.
        if *shutdown_rx.borrow() {
            break;
        }

        let driver = driver.clone();
        let location = location.clone();
        let shutdown_rx = shutdown_rx.clone();
        tasks.spawn(
            async move {
                let _permit = permit;
                driver.sweep(&location, &shutdown_rx).await
            }
            .in_current_span(),
        );
        metrics::set_active_locations(slots.in_use());
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(stats) => total += stats,
            Err(e) => {
                warn!(error = %e, "Location sweep task failed");
                total.locations_failed += 1;
            }
        }
    }
    metrics::set_active_locations(0);

    total
}

/// Run one sweep, log it, and record its metrics. Returns stats and elapsed time.
pub(crate) async fn run_sweep<C, R, D>(
    driver: &SweepDriver<C, R, D>,
    config: &SweeperConfig,
    shutdown_rx: &watch::Receiver<bool>,
) -> (SweepStats, Duration)
where
    C: QueueConnector,
    R: ReplicaResolver,
    D: DeliveryClient,
{
    let locations = sweep_locations(&config.devices, &config.policies);
    info!(locations = locations.len(), "Begin object update sweep");

    let start = Instant::now();
    let stats = sweep_all(driver, &locations, config.concurrency, shutdown_rx).await;
    let elapsed = start.elapsed();

    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        found = stats.found_updates,
        successes = stats.successes,
        failures = stats.failures,
        unlinks = stats.unlinks,
        locations_ok = stats.locations_succeeded,
        locations_failed = stats.locations_failed,
        "Object update sweep completed"
    );
    metrics::record_sweep_complete(
        stats.found_updates,
        stats.successes,
        stats.failures,
        stats.unlinks,
        elapsed,
    );

    (stats, elapsed)
}

/// Sweep forever on the configured interval until shutdown is signalled.
pub async fn run_sweep_loop<C, R, D>(
    driver: SweepDriver<C, R, D>,
    config: Arc<SweeperConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    C: QueueConnector,
    R: ReplicaResolver,
    D: DeliveryClient,
{
    let span = tracing::info_span!("sweep_loop");

    async move {
        // Mark initial shutdown value as seen so changed() only fires on actual changes
        let _ = shutdown_rx.borrow_and_update();
        if *shutdown_rx.borrow() {
            return;
        }

        let interval = config.interval();
        let jitter = jitter_delay(interval);
        info!(
            interval_secs = interval.as_secs(),
            jitter_ms = jitter.as_millis() as u64,
            "Starting update sweep loop"
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + jitter, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping sweep loop");
                        break;
                    }
                    continue;
                }

                _ = ticker.tick() => {}
            }

            let (_, elapsed) = run_sweep(&driver, &config, &shutdown_rx).await;

            if let Err(e) =
                crate::recon::dump_sweep_elapsed(&config.recon_cache_path, elapsed.as_secs_f64()).await
            {
                warn!(error = %e, "Failed to update recon cache");
            }

            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping sweep loop");
                break;
            }
        }

        info!("Update sweep loop stopped");
    }
    .instrument(span)
    .await
}
