//! Durable sqlite tier
//!
//! Survives gateway restarts so a redeploy does not translate into a burst
//! of external classifier calls. rusqlite is synchronous, so every
//! operation hops onto the blocking pool.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheTier, CachedVerdict};
use crate::error::CacheError;
use sg_core::Verdict;

pub struct SqliteTier {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTier {
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        // The gateway holds several connections to the same file; without
        // WAL and a busy timeout, concurrent writers surface SQLITE_BUSY.
        conn.busy_timeout(Duration::from_millis(5_000))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS verdict_cache (
                fingerprint TEXT PRIMARY KEY,
                verdict     TEXT NOT NULL,
                expires_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_verdict_cache_expiry
                ON verdict_cache (expires_at);",
        )?;
        Ok(())
    }

    fn now_unix() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl CacheTier for SqliteTier {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, fp: &str) -> Result<Option<CachedVerdict>, CacheError> {
        let conn = Arc::clone(&self.conn);
        let fp = fp.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| CacheError::Task("poisoned lock".into()))?;
            let now = Self::now_unix();

            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT verdict, expires_at FROM verdict_cache WHERE fingerprint = ?1",
                    params![fp],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((verdict_json, expires_at)) = row else {
                return Ok(None);
            };

            if expires_at <= now {
                // Lazy expiry
                conn.execute("DELETE FROM verdict_cache WHERE fingerprint = ?1", params![fp])?;
                return Ok(None);
            }

            let verdict: Verdict = serde_json::from_str(&verdict_json)?;
            Ok(Some(CachedVerdict {
                verdict,
                remaining: Duration::from_secs((expires_at - now) as u64),
            }))
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }

    async fn put(&self, fp: &str, verdict: &Verdict, ttl: Duration) -> Result<(), CacheError> {
        let conn = Arc::clone(&self.conn);
        let fp = fp.to_string();
        let verdict_json = serde_json::to_string(verdict)?;
        let expires_at = Self::now_unix() + ttl.as_secs() as i64;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| CacheError::Task("poisoned lock".into()))?;
            conn.execute(
                "INSERT OR REPLACE INTO verdict_cache (fingerprint, verdict, expires_at)
                 VALUES (?1, ?2, ?3)",
                params![fp, verdict_json, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}
