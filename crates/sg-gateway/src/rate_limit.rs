//! Per-device rate limiting
//!
//! Token bucket per device id, refilled continuously at the configured
//! per-minute rate. Devices that never identify themselves share one
//! bucket under an empty key, which throttles anonymous abuse without
//! blocking a single curious request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: f64,
    refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

impl RateLimiter {
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(burst.max(1)),
            refill_per_sec: f64::from(per_minute.max(1)) / 60.0,
        }
    }

    /// Take one token for `device_id`. Returns false when the bucket is dry.
    pub fn check(&self, device_id: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(device_id.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.capacity,
                refreshed: now,
            });

        let elapsed = now.duration_since(bucket.refreshed).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.refreshed = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that have refilled to capacity; they carry no state
    /// a fresh bucket wouldn't. Device ids are client-supplied, so the map
    /// must not grow with every id ever seen.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let elapsed = now.duration_since(bucket.refreshed).as_secs_f64();
            bucket.tokens + elapsed * self.refill_per_sec < self.capacity
        });
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Spawn a background reaper sweeping at `interval`.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let swept = limiter.sweep();
                if swept > 0 {
                    debug!(swept, "rate limiter reaper");
                }
            }
        })
    }
}
