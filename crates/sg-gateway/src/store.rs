//! Profile and activity store contracts
//!
//! Profile CRUD and activity analytics live outside this subsystem; the
//! pipeline only needs these two narrow interfaces. The sqlite
//! implementations back the standalone binary; tests use the in-memory
//! ones.
//!
//! Activity writes are best-effort by contract: the orchestrator spawns
//! them off the response path and a failure is logged, never surfaced.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use sg_core::{CheckType, Profile};

/// Append-only fact recorded when a check blocks for a known profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub child_id: String,
    pub parent_id: String,
    pub url: String,
    pub domain: Option<String>,
    pub check_type: CheckType,
    pub status: String,
    pub reason: Option<String>,
    pub confidence: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_device_id(&self, device_id: &str) -> Result<Option<Profile>, StoreError>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, record: ActivityRecord) -> Result<(), StoreError>;
}

// =============================================================================
// Sqlite implementations
// =============================================================================

/// The gateway holds several connections to the same file; without WAL and
/// a busy timeout, concurrent writers surface SQLITE_BUSY.
fn tune(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(())
}

pub struct SqliteProfileStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProfileStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        tune(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id        TEXT PRIMARY KEY,
                device_id TEXT UNIQUE,
                profile   TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace a profile. Operator path (sg-cli), not pipeline.
    pub fn upsert(&self, profile: &Profile) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Task("poisoned lock".into()))?;
        conn.execute(
            "INSERT OR REPLACE INTO profiles (id, device_id, profile) VALUES (?1, ?2, ?3)",
            params![profile.id, profile.device_id, serde_json::to_string(profile)?],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Profile>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Task("poisoned lock".into()))?;
        let mut stmt = conn.prepare("SELECT profile FROM profiles ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(serde_json::from_str(&row?)?);
        }
        Ok(profiles)
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn find_by_device_id(&self, device_id: &str) -> Result<Option<Profile>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let device_id = device_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Task("poisoned lock".into()))?;
            let row: Option<String> = conn
                .query_row(
                    "SELECT profile FROM profiles WHERE device_id = ?1",
                    params![device_id],
                    |row| row.get(0),
                )
                .optional()?;

            match row {
                Some(json) => {
                    let profile: Profile = serde_json::from_str(&json)?;
                    // Inactive profiles are invisible to the pipeline
                    Ok(if profile.is_active { Some(profile) } else { None })
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

pub struct SqliteActivityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActivityStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        tune(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS activity_log (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                child_id   TEXT NOT NULL,
                parent_id  TEXT NOT NULL,
                url        TEXT NOT NULL,
                domain     TEXT,
                check_type TEXT NOT NULL,
                status     TEXT NOT NULL,
                reason     TEXT,
                confidence INTEGER,
                ts         TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_child_ts
                ON activity_log (child_id, ts);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ActivityStore for SqliteActivityStore {
    async fn append(&self, record: ActivityRecord) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Task("poisoned lock".into()))?;
            conn.execute(
                "INSERT INTO activity_log
                 (child_id, parent_id, url, domain, check_type, status, reason, confidence, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.child_id,
                    record.parent_id,
                    record.url,
                    record.domain,
                    record.check_type.as_str(),
                    record.status,
                    record.reason,
                    record.confidence,
                    record.timestamp.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// Profile store keyed by device id. Used by tests and local development.
#[derive(Default)]
pub struct MemoryProfileStore {
    by_device: DashMap<String, Profile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        if let Some(device_id) = profile.device_id.clone() {
            self.by_device.insert(device_id, profile);
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_device_id(&self, device_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .by_device
            .get(device_id)
            .filter(|p| p.is_active)
            .map(|p| p.clone()))
    }
}

#[derive(Default)]
pub struct MemoryActivityStore {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ActivityRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn append(&self, record: ActivityRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Task("poisoned lock".into()))?
            .push(record);
        Ok(())
    }
}
