//! Per-client token bucket. Refill is computed lazily from
//! elapsed wall time on each `try_acquire` — no background ticker, matching
//! the "Suspension points" rule that nothing in the hot path may block.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const DEFAULT_CAPACITY: u32 = 100;
const DEFAULT_REFILL_MS: u64 = 10;

struct Bucket {
    /// Scaled by 1_000 so fractional tokens survive integer arithmetic
    /// without pulling in a float (`AtomicU64` vs. a float needing a mutex).
    tokens_milli: AtomicU64,
    last_refill: std::sync::Mutex<Instant>,
}

/// Shared, internally-locked token bucket per client id. Constructed once
/// and held as `Arc<RateLimiter>` by `AppServer`.
pub struct RateLimiter {
    capacity_milli: u64,
    refill_interval_ms: u64,
    buckets: DashMap<u64, Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_interval_ms: u64) -> Self {
        Self {
            capacity_milli: capacity as u64 * 1000,
            refill_interval_ms: refill_interval_ms.max(1),
            buckets: DashMap::new(),
        }
    }

    /// `try_acquire` consumes one token for `client_id`, refilling first
    /// based on elapsed time. Unknown clients start full.
    pub fn try_acquire(&self, client_id: u64) -> bool {
        let bucket = self
            .buckets
            .entry(client_id)
            .or_insert_with(|| Bucket {
                tokens_milli: AtomicU64::new(self.capacity_milli),
                last_refill: std::sync::Mutex::new(Instant::now()),
            });

        let now = Instant::now();
        let mut last = bucket.last_refill.lock().expect("bucket mutex poisoned");
        let elapsed_ms = now.duration_since(*last).as_millis() as u64;
        *last = now;
        drop(last);

        if elapsed_ms > 0 {
            let refilled_milli = (elapsed_ms * 1000) / self.refill_interval_ms;
            if refilled_milli > 0 {
                let current = bucket.tokens_milli.load(Ordering::Relaxed);
                let next = (current + refilled_milli).min(self.capacity_milli);
                bucket.tokens_milli.store(next, Ordering::Relaxed);
            }
        }

        let current = bucket.tokens_milli.load(Ordering::Relaxed);
        if current >= 1000 {
            bucket.tokens_milli.store(current - 1000, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn remove(&self, client_id: u64) {
        self.buckets.remove(&client_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_REFILL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_client_starts_full() {
        let limiter = RateLimiter::new(3, 10_000);
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }

    #[test]
    fn remove_resets_client_to_full() {
        let limiter = RateLimiter::new(1, 10_000);
        assert!(limiter.try_acquire(7));
        assert!(!limiter.try_acquire(7));
        limiter.remove(7);
        assert!(limiter.try_acquire(7));
    }

    #[test]
    fn buckets_are_independent_per_client() {
        let limiter = RateLimiter::new(1, 10_000);
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
        assert!(!limiter.try_acquire(1));
        assert!(!limiter.try_acquire(2));
    }
}
