//! Job store persisted in SQLite.
//!
//! Several processes may share one database file. Conditional writes are
//! single statements, so SQLite's write lock makes them atomic across
//! processes as well as across tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{JobStore, SWEEP_INTERVAL};
use crate::db::{Database, DatabaseError};
use crate::error::StoreError;

/// [`JobStore`] backed by the `kv_entries` table.
///
/// Every [`SWEEP_INTERVAL`]th write through a handle also deletes expired
/// rows, so keys that are never read again do not pile up in the file.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
    writes: Arc<AtomicUsize>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Deletes expired rows and returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = now_ms();
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM kv_entries WHERE expires_at_ms <= ?1",
                params![now],
            )?)
        })?;
        if removed > 0 {
            log::debug!("Purged {} expired store entries", removed);
        }
        Ok(removed)
    }

    /// Counts a write and sweeps when the interval comes round. A failed
    /// sweep is logged and does not fail the write that triggered it.
    fn after_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL == 0 {
            if let Err(e) = self.purge_expired() {
                log::warn!("Failed to sweep expired store entries: {}", e);
            }
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(now: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(ttl_ms)
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = now_ms();
        let value = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1 AND expires_at_ms > ?2",
                params![key, now],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(DatabaseError::statement("get", key))
        })?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = expiry_ms(now_ms(), ttl);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at_ms = excluded.expires_at_ms",
                params![key, value, expires_at],
            )
            .map_err(DatabaseError::statement("set", key))?;
            Ok(())
        })?;
        self.after_write();
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = now_ms();
        let expires_at = expiry_ms(now, ttl);
        // An expired row is overwritten; a live one leaves the statement
        // with zero changed rows.
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at_ms = excluded.expires_at_ms
                 WHERE kv_entries.expires_at_ms <= ?4",
                params![key, value, expires_at, now],
            )
            .map_err(DatabaseError::statement("set_if_absent", key))?)
        })?;
        if changed > 0 {
            self.after_write();
        }
        Ok(changed > 0)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .map_err(DatabaseError::statement("delete", key))?;
            Ok(())
        })?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = now_ms();
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM kv_entries WHERE key = ?1 AND value = ?2 AND expires_at_ms > ?3",
                params![key, expected, now],
            )
            .map_err(DatabaseError::statement("delete_if_eq", key))?)
        })?;
        Ok(removed > 0)
    }
}
