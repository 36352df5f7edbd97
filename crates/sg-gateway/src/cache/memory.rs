//! In-memory fast tier
//!
//! DashMap keyed by fingerprint, expiry checked lazily at read time with a
//! periodic reaper as a safety net against keys that are written once and
//! never read again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{CacheTier, CachedVerdict};
use crate::error::CacheError;
use sg_core::Verdict;

struct Entry {
    verdict: Verdict,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryTier {
    entries: DashMap<String, Entry>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Called by the reaper task.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    /// Spawn a background reaper sweeping at `interval`.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let tier = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let swept = tier.sweep();
                if swept > 0 {
                    debug!(swept, "memory cache reaper");
                }
            }
        })
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, fp: &str) -> Result<Option<CachedVerdict>, CacheError> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(fp) {
            if entry.expires_at > now {
                return Ok(Some(CachedVerdict {
                    verdict: entry.verdict.clone(),
                    remaining: entry.expires_at - now,
                }));
            }
        }

        // Expired: remove lazily and report a miss
        self.entries
            .remove_if(fp, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn put(&self, fp: &str, verdict: &Verdict, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            fp.to_string(),
            Entry {
                verdict: verdict.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let tier = MemoryTier::new();
        let v = Verdict::policy_block("manual_blocklist");
        tier.put("url:k1", &v, Duration::from_secs(60)).await.unwrap();

        let hit = tier.get("url:k1").await.unwrap().unwrap();
        assert_eq!(hit.verdict, v);
        assert!(hit.remaining <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let tier = MemoryTier::new();
        tier.put("url:k1", &Verdict::safe(), Duration::from_millis(0))
            .await
            .unwrap();

        assert!(tier.get("url:k1").await.unwrap().is_none());
        // and the lazy expiry actually removed it
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let tier = MemoryTier::new();
        tier.put("a", &Verdict::safe(), Duration::from_millis(0)).await.unwrap();
        tier.put("b", &Verdict::safe(), Duration::from_secs(60)).await.unwrap();

        let swept = tier.sweep();
        assert_eq!(swept, 1);
        assert_eq!(tier.len(), 1);
        assert!(tier.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_is_idempotent() {
        let tier = MemoryTier::new();
        let v = Verdict::safe();
        tier.put("k", &v, Duration::from_secs(60)).await.unwrap();
        tier.put("k", &v, Duration::from_secs(60)).await.unwrap();
        assert_eq!(tier.len(), 1);
    }
}
