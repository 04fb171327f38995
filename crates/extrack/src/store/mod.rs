//! Key-value job store contract and its backends.
//!
//! The tracker only talks to [`JobStore`]. Every value carries a TTL; an
//! expired entry is indistinguishable from a missing one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::db::Database;
use crate::error::StoreError;

pub mod keys;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Writes a backend accepts between sweeps of its expired entries.
pub const SWEEP_INTERVAL: usize = 256;

/// Shared key-value store with per-key expiry.
///
/// Single-key operations are independent; the only compound operations are
/// [`set_if_absent`](JobStore::set_if_absent) and
/// [`delete_if_eq`](JobStore::delete_if_eq), which implementations must
/// perform atomically.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns the value, or `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value, replacing any previous one and its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Stores a value only if the key is absent or expired. Returns whether
    /// the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Removes a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Removes a key only if it currently holds `expected`. Returns whether
    /// the key was removed.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}

/// Reads and decodes a JSON record.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn JobStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes and writes a JSON record.
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn JobStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

/// Builds the store backend selected by configuration.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn JobStore>, StoreError> {
    match config {
        StoreConfig::Memory => {
            log::info!("Using in-memory job store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Sqlite { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => crate::db::default_database_path().ok_or_else(|| {
                    StoreError::Backend("could not determine home directory".to_string())
                })?,
            };
            let db = Database::open(&path)?;
            log::info!("Using SQLite job store at {}", path.display());
            Ok(Arc::new(SqliteStore::new(db)))
        }
    }
}
