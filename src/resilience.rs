//! Pacing for a sweep.
//!
//! - [`RateLimiter`]: caps how many pending entries the whole process
//!   handles per second, so draining a large backlog after an outage does
//!   not flood the container replicas.
//! - [`LocationSlots`]: caps how many storage locations are swept at once.
//!   Every location holds one slot for its whole pass, which keeps one worker
//!   per location queue.

use crate::error::{Result, SweepError};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

// =============================================================================
// Entry Rate Limit
// =============================================================================

/// Entries per second, with up to `burst` entries allowed back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub burst: u32,
}

impl RateLimitConfig {
    /// One second of budget as the burst.
    pub fn per_second(per_second: u32) -> Self {
        Self {
            per_second,
            burst: per_second,
        }
    }
}

/// Process-wide entry rate limiter, shared by every location worker.
pub struct RateLimiter {
    limiter: GovLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
}

impl RateLimiter {
    /// Zero rates are clamped to one entry per second.
    pub fn new(config: RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(rate);
        Self {
            limiter: GovLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }

    /// Wait for the next entry's turn. Cancel-safe.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

// =============================================================================
// Location Slots
// =============================================================================

/// Semaphore of location slots.
#[derive(Debug)]
pub struct LocationSlots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl LocationSlots {
    /// At least one slot is always available.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SweepError::Shutdown)
    }

    /// Slots currently held by location workers.
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
