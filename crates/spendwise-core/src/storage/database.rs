//! Database connection and schema management.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::storage::error::StorageResult;

/// Runs `f` against the shared connection on tokio's blocking pool.
///
/// rusqlite calls block while SQLite waits on a lock, so they must stay off
/// the async workers for a surrounding `tokio::time::timeout` to fire.
///
/// # Errors
/// Returns whatever `f` returns, or `StorageError::Task` if the blocking task panics
pub(crate) async fn with_connection<T, F>(db: &Arc<Mutex<Database>>, f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> StorageResult<T> + Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let guard = db.blocking_lock();
        f(&guard)
    })
    .await?
}

/// Database connection wrapper.
///
/// Manages SQLite connection and schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a new database connection at the specified path.
    ///
    /// Parent directories are created when missing.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    /// * `StorageError::Io` - If the parent directory cannot be created
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Gets a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Initializes the database schema.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If schema creation fails
    fn init_schema(&self) -> StorageResult<()> {
        info!("Initializing database schema");

        // One row per user; `version` guards every write
        self.conn.execute(
            r"
            CREATE TABLE IF NOT EXISTS skillbooks (
                user_id TEXT PRIMARY KEY,
                skills TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            [],
        )?;

        // Append-only audit trail of learning runs
        self.conn.execute(
            r"
            CREATE TABLE IF NOT EXISTS learning_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                detail_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_learning_events_user_id ON learning_events(user_id)",
            [],
        )?;

        Ok(())
    }
}
