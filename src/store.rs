//! # Key-Value Store Capability
//!
//! ## Responsibility
//! The sync core owns no persistence engine. It reads credentials, mapping
//! configuration, cached provider payloads and monthly records through the
//! [`KvStore`] trait, keyed by plain strings (see [`keys`]).
//!
//! ## Implementations
//! - [`MemoryStore`]: process-local map; tests and hosts that persist elsewhere.
//! - [`SqliteStore`]: single-table SQLite file used by the CLI.
//!
//! ## Guarantees
//! - Values are JSON; a `set` replaces the whole value under its key.
//! - Non-panicking: lock poisoning and SQLite failures surface as
//!   [`FunnelError::Store`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FunnelError, Result};
use crate::record::ProviderId;

/// Storage key layout.
pub mod keys {
    use super::ProviderId;

    pub const CRM_API_KEY: &str = "crm_api_key";
    pub const ATS_API_KEY: &str = "ats_api_key";
    pub const CALENDAR_CONNECTED: &str = "calendar_connected";
    /// CRM project id → role name (or `"ignore"`).
    pub const CRM_PROJECT_ROLES: &str = "crm_project_roles";
    /// ATS job id → role name (or `"ignore"`).
    pub const ATS_JOB_ROLES: &str = "ats_job_roles";
    /// ATS stage id → stage class.
    pub const ATS_STAGE_CLASSES: &str = "ats_stage_classes";
    pub const ROLES: &str = "roles";

    pub fn monthly_record(month: &str) -> String {
        format!("funnel_record_{month}")
    }

    pub fn sync_cache(provider: ProviderId, month: &str) -> String {
        format!("sync_cache_{provider}_{month}")
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Read `key` and deserialize it. Absent keys yield `Ok(None)`.
pub async fn load<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| FunnelError::Store("memory store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| FunnelError::Store("memory store lock poisoned".into()))?;
        map.insert(key.to_string(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| FunnelError::Store("sqlite store lock poisoned".into()))
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, text],
        )?;
        Ok(())
    }
}
