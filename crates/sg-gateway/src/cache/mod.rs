//! Two-tier verdict cache
//!
//! Content-addressed store mapping a fingerprint of
//! `(check type, payload, filtering level)` to a previously computed
//! verdict. Caching is an optimization, never a correctness dependency:
//! both tiers are independently optional and every operation is
//! best-effort — a tier failure degrades to more external calls, nothing
//! else.
//!
//! Read path: fast tier, then durable tier; a durable hit re-populates the
//! fast tier opportunistically with the remaining TTL. Write path:
//! write-through to both tiers, each failure logged and swallowed.
//!
//! Entries are immutable once written, so concurrent same-fingerprint
//! writers are an idempotent overwrite, not a race.

mod memory;
mod sqlite;

pub use memory::MemoryTier;
pub use sqlite::SqliteTier;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheError;
use sg_core::{CheckType, FilteringLevel, Verdict};

/// Hex length kept from the sha256 digest. Long enough that collisions are
/// not a practical concern for a cache key.
const FINGERPRINT_HEX_LEN: usize = 24;

/// Stable cache key over check type, payload, and policy level. Identical
/// inputs under the same level always produce the same key.
pub fn fingerprint(check_type: CheckType, payload: &str, level: FilteringLevel) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(b":");
    hasher.update(level.as_str().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}:{}", check_type.as_str(), &digest[..FINGERPRINT_HEX_LEN])
}

/// A cached verdict plus how long it is still valid.
#[derive(Debug, Clone)]
pub struct CachedVerdict {
    pub verdict: Verdict,
    pub remaining: Duration,
}

/// One storage tier. Implementations must expire lazily at read time.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, fp: &str) -> Result<Option<CachedVerdict>, CacheError>;

    async fn put(&self, fp: &str, verdict: &Verdict, ttl: Duration) -> Result<(), CacheError>;
}

/// The tier stack the orchestrator talks to.
#[derive(Clone, Default)]
pub struct ResultCache {
    fast: Option<Arc<dyn CacheTier>>,
    durable: Option<Arc<dyn CacheTier>>,
}

impl ResultCache {
    pub fn new(fast: Option<Arc<dyn CacheTier>>, durable: Option<Arc<dyn CacheTier>>) -> Self {
        Self { fast, durable }
    }

    /// Look up a fingerprint. Tier errors count as misses.
    pub async fn get(&self, fp: &str) -> Option<Verdict> {
        if let Some(fast) = &self.fast {
            match fast.get(fp).await {
                Ok(Some(hit)) => {
                    debug!(fp, tier = fast.name(), "cache hit");
                    return Some(hit.verdict);
                }
                Ok(None) => {}
                Err(e) => warn!(fp, tier = fast.name(), error = %e, "cache read failed"),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.get(fp).await {
                Ok(Some(hit)) => {
                    debug!(fp, tier = durable.name(), "cache hit");
                    // Re-populate the fast tier with whatever validity is left.
                    if let Some(fast) = &self.fast {
                        if let Err(e) = fast.put(fp, &hit.verdict, hit.remaining).await {
                            warn!(fp, tier = fast.name(), error = %e, "cache repopulate failed");
                        }
                    }
                    return Some(hit.verdict);
                }
                Ok(None) => {}
                Err(e) => warn!(fp, tier = durable.name(), error = %e, "cache read failed"),
            }
        }

        None
    }

    /// Write-through to both tiers; never fails the caller.
    pub async fn put(&self, fp: &str, verdict: &Verdict, ttl: Duration) {
        for tier in [&self.fast, &self.durable].into_iter().flatten() {
            if let Err(e) = tier.put(fp, verdict, ttl).await {
                warn!(fp, tier = tier.name(), error = %e, "cache write failed");
            }
        }
    }
}
