//! In-process job store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{JobStore, SWEEP_INTERVAL};
use crate::error::StoreError;

struct Entry {
    value: String,
    /// `None` when the TTL runs past what the clock can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, now: Instant, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// [`JobStore`] backed by a `HashMap`.
///
/// Expiry follows the tokio clock, so tests can pause and advance time.
/// Reads skip expired entries; every [`SWEEP_INTERVAL`]th write also drops
/// them from the map, and [`purge_expired`](MemoryStore::purge_expired)
/// does so on demand.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        sweep(&mut self.write(), now)
    }

    /// Counts a write and sweeps the map when the interval comes round.
    fn after_write(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL == 0 {
            let removed = sweep(entries, now);
            if removed > 0 {
                log::debug!("Swept {} expired entries from memory store", removed);
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.is_live(now));
    before - entries.len()
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.write();
        entries.insert(key.to_string(), Entry::new(value, now, ttl));
        self.after_write(&mut entries, now);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.write();

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(key.to_string(), Entry::new(value, now, ttl));
        self.after_write(&mut entries, now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write().remove(key);
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.write();

        let matches = entries
            .get(key)
            .is_some_and(|e| e.is_live(now) && e.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}
