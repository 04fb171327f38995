//! SQLite file behind [`SqliteStore`](crate::store::SqliteStore).
//!
//! Each handle owns one connection behind a mutex. Processes sharing the
//! file coordinate through SQLite's own locking, so a writer in another
//! process waits up to the busy timeout instead of failing at once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod migrations;

pub use error::DatabaseError;

/// How long a write waits on another process's lock by default.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the store database. Clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<Arc<Path>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Self::open_with(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens or creates the store file, creating its directory as needed,
    /// and brings the schema up to date.
    pub fn open_with(path: &Path, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::CreateDir {
                dir: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| DatabaseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(busy_timeout)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrations::run_all(&conn)?;

        log::info!(
            "Job store database ready at {} (journal={}, busy_timeout={:?})",
            path.display(),
            journal,
            busy_timeout
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(Arc::from(path)),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Backing file, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.extrack/data/jobs.db`, used when the config names no path.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".extrack").join("data").join("jobs.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(db: &Database, sql: &str) -> u32 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_in_memory_has_schema() {
        let db = Database::open_in_memory().unwrap();
        assert!(count(&db, "SELECT COUNT(*) FROM _migrations") > 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM kv_entries"), 0);
        assert!(db.path().is_none());
    }

    #[test]
    fn test_file_db_uses_wal_and_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("jobs.db");
        let db = Database::open_with(&path, Duration::from_millis(250)).unwrap();

        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
        let journal: String = db
            .with_conn(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(journal, "wal");
    }

    #[test]
    fn test_unusable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = Database::open(&blocker.join("jobs.db"));
        assert!(matches!(
            result,
            Err(DatabaseError::CreateDir { ref dir, .. }) if dir == &blocker
        ));
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES ('a', 'b', 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&other, "SELECT COUNT(*) FROM kv_entries"), 1);
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with(".extrack/data/jobs.db"));
    }
}
