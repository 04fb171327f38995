//! Test harness for isolated tracker execution.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use extrack::config::{RunnerConfig, TrackerConfig};
use extrack::db::Database;
use extrack::{ExtractionRunner, JobStore, JobTracker, MemoryStore, SqliteStore};

/// Tracker, runner and store for one test.
pub struct TestHarness {
    /// Keeps the SQLite file alive for the duration of the test.
    temp_dir: Option<TempDir>,
    pub store: Arc<dyn JobStore>,
    pub tracker: Arc<JobTracker>,
    pub config: TrackerConfig,
}

impl TestHarness {
    /// Harness over the in-memory store.
    pub fn memory() -> Self {
        Self::build(None, Arc::new(MemoryStore::new()))
    }

    /// Harness over a fresh SQLite file in a temp directory.
    pub fn sqlite() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("jobs.db")).expect("Failed to open database");
        Self::build(Some(temp_dir), Arc::new(SqliteStore::new(db)))
    }

    fn build(temp_dir: Option<TempDir>, store: Arc<dyn JobStore>) -> Self {
        let mut config = TrackerConfig::default();
        config.runner = fast_runner();
        let tracker = Arc::new(JobTracker::new(Arc::clone(&store), config.ttl));
        Self {
            temp_dir,
            store,
            tracker,
            config,
        }
    }

    /// Path of the SQLite file, if this harness uses one.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("jobs.db"))
    }

    /// A second tracker sharing this harness's store.
    pub fn second_tracker(&self) -> JobTracker {
        JobTracker::new(Arc::clone(&self.store), self.config.ttl)
    }

    pub fn runner(&self) -> ExtractionRunner {
        ExtractionRunner::from_config(Arc::clone(&self.tracker), &self.config)
    }
}

/// Runner settings with short delays so retries finish quickly.
pub fn fast_runner() -> RunnerConfig {
    RunnerConfig {
        max_concurrent: 3,
        max_retries: 3,
        retry_delay_secs: 0,
        backoff_multiplier: 1.0,
        max_backoff_secs: 0,
        chunk_timeout_secs: 5,
        max_failure_ratio: 0.5,
    }
}
