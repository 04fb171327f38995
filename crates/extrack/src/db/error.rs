use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Cannot create store directory {}: {source}", dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open store file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement against one `kv_entries` key failed.
    #[error("{op} of key '{key}' failed: {source}")]
    Statement {
        op: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store schema v{version} failed to apply: {reason}")]
    Migration { version: u32, reason: String },

    /// A thread panicked while holding the connection.
    #[error("Store connection lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Error mapper that tags a rusqlite failure with the operation and key.
    pub(crate) fn statement<'a>(
        op: &'static str,
        key: &'a str,
    ) -> impl FnOnce(rusqlite::Error) -> Self + 'a {
        move |source| DatabaseError::Statement {
            op,
            key: key.to_string(),
            source,
        }
    }
}
