// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-location sweep.
//!
//! [`SweepDriver::sweep`] pages through the pending-update namespace of one
//! location and hands every key to the [`UpdateProcessor`]:
//!
//! ```text
//! start = "async_pending"
//! loop:
//!     keys = range_keys(start, "async_pending/", page_size)
//!     for key in keys: process(key)
//!     if keys.len() < page_size: done
//!     start = last_key + "\0"
//! ```
//!
//! Entries deleted during the pass sort before `start` and never affect the
//! next page.
//!
//! # Failure Isolation
//!
//! Any error from the location (connect, scan, or an entry) ends the pass for
//! that location and is classified by [`FailureKind`]. The driver never
//! returns an error, so one bad location cannot stop the sweep of the others.

use super::types::LocationOutcome;
use crate::delivery::DeliveryClient;
use crate::entry::{key_successor, ASYNC_PENDING_END, ASYNC_PENDING_START};
use crate::error::{FailureKind, Result};
use crate::metrics;
use crate::processor::UpdateProcessor;
use crate::queue::{QueueConnector, QueueStore};
use crate::resilience::RateLimiter;
use crate::ring::ReplicaResolver;
use crate::stats::SweepStats;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Sweeps the queue of one location at a time.
pub struct SweepDriver<C, R, D> {
    connector: Arc<C>,
    processor: UpdateProcessor<R, D>,
    rate_limiter: Option<Arc<RateLimiter>>,
    page_size: usize,
}

impl<C, R, D> Clone for SweepDriver<C, R, D> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            processor: self.processor.clone(),
            rate_limiter: self.rate_limiter.clone(),
            page_size: self.page_size,
        }
    }
}

impl<C, R, D> SweepDriver<C, R, D>
where
    C: QueueConnector,
    R: ReplicaResolver,
    D: DeliveryClient,
{
    pub fn new(
        connector: Arc<C>,
        processor: UpdateProcessor<R, D>,
        rate_limiter: Option<Arc<RateLimiter>>,
        page_size: usize,
    ) -> Self {
        Self {
            connector,
            processor,
            rate_limiter,
            page_size: page_size.max(1),
        }
    }

    /// Sweep every pending entry of `location`.
    ///
    /// Returns this location's counters, including exactly one of
    /// `locations_succeeded` / `locations_failed` unless shutdown interrupted
    /// the pass.
    pub async fn sweep(&self, location: &str, shutdown_rx: &watch::Receiver<bool>) -> SweepStats {
        let span = info_span!("sweep_location", location = %location);

        async move {
            let start = Instant::now();
            let mut stats = SweepStats::default();

            let outcome = match self.sweep_entries(location, &mut stats, shutdown_rx).await {
                Ok(LocationOutcome::Completed) => {
                    stats.locations_succeeded += 1;
                    info!(
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        found = stats.found_updates,
                        successes = stats.successes,
                        failures = stats.failures,
                        "Location sweep completed"
                    );
                    "success"
                }
                Ok(LocationOutcome::Interrupted) => {
                    info!(found = stats.found_updates, "Location sweep interrupted by shutdown");
                    "interrupted"
                }
                Err(e) => {
                    stats.locations_failed += 1;
                    let kind = e.kind();
                    match kind {
                        FailureKind::Unavailable => {
                            warn!(error = %e, "Unable to connect to location");
                        }
                        FailureKind::Corrupt | FailureKind::Transport | FailureKind::Other => {
                            error!(error = %e, details = ?e, "Unhandled error sweeping pending updates");
                        }
                    }
                    metrics::record_error(location, kind.as_str());
                    kind.as_str()
                }
            };

            metrics::record_location_sweep(location, outcome, start.elapsed());
            stats
        }
        .instrument(span)
        .await
    }

    async fn sweep_entries(
        &self,
        location: &str,
        stats: &mut SweepStats,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> Result<LocationOutcome> {
        let store = self.connector.connect(location).await?;
        let mut start = ASYNC_PENDING_START.to_string();

        loop {
            let keys = store
                .range_keys(&start, ASYNC_PENDING_END, self.page_size)
                .await?;
            debug!(page = keys.len(), start = %start, "Scanned pending keys");

            for key in &keys {
                if *shutdown_rx.borrow() {
                    return Ok(LocationOutcome::Interrupted);
                }
                if let Some(limiter) = &self.rate_limiter {
                    limiter.acquire().await;
                }

                stats.found_updates += 1;
                if self.processor.process(location, &*store, key).await? {
                    stats.successes += 1;
                    stats.unlinks += 1;
                } else {
                    stats.failures += 1;
                }
            }

            match keys.last() {
                Some(last) if keys.len() >= self.page_size => start = key_successor(last),
                _ => return Ok(LocationOutcome::Completed),
            }
        }
    }
}
