//! Skillbook persistence.
//!
//! One row per user holds the serialized skillbook and a version number. The
//! repository never locks a row; writers use [`SkillbookRepository::update_if_version`]
//! and retry on conflict.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::database::{Database, with_connection};
use crate::storage::error::StorageResult;

/// A skillbook row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSkillbook {
    /// Owner of the skillbook.
    pub user_id: String,
    /// Serialized skillbook payload.
    pub payload: String,
    /// Version of this row; starts at 1 on insert.
    pub version: i64,
    /// Time of the last successful write.
    pub updated_at: DateTime<Utc>,
}

/// Storage primitives the optimistic commit loop needs.
#[async_trait]
pub trait SkillbookRepository: Send + Sync {
    /// Loads the user's row, if one exists.
    async fn load(&self, user_id: &str) -> StorageResult<Option<StoredSkillbook>>;

    /// Inserts the first row for a user at version 1.
    ///
    /// Returns `false` when a row already exists (another writer got there first).
    async fn insert_if_absent(&self, user_id: &str, payload: &str) -> StorageResult<bool>;

    /// Writes `payload` and bumps the version, only if the stored version is `expected_version`.
    ///
    /// Returns the number of rows affected: 1 on success, 0 on a version conflict.
    async fn update_if_version(
        &self,
        user_id: &str,
        payload: &str,
        expected_version: i64,
    ) -> StorageResult<usize>;
}

/// Parses an RFC3339 timestamp string from a row into a `DateTime<Utc>`.
fn parse_timestamp(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let timestamp_str: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&timestamp_str).map(|dt| dt.with_timezone(&Utc)).map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, column_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// SQLite implementation of [`SkillbookRepository`].
#[derive(Clone)]
pub struct SqliteSkillbookRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteSkillbookRepository {
    /// Creates a repository owning `db`.
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(Mutex::new(db)) }
    }

    /// Creates a repository over a connection shared with other components.
    pub fn shared(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SkillbookRepository for SqliteSkillbookRepository {
    async fn load(&self, user_id: &str) -> StorageResult<Option<StoredSkillbook>> {
        let key = user_id.to_string();
        let row = with_connection(&self.db, move |db| {
            let row = db
                .conn()
                .query_row(
                    "SELECT user_id, skills, version, updated_at FROM skillbooks WHERE user_id = ?1",
                    params![key],
                    |row| {
                        Ok(StoredSkillbook {
                            user_id: row.get(0)?,
                            payload: row.get(1)?,
                            version: row.get(2)?,
                            updated_at: parse_timestamp(row, 3, "updated_at")?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await?;

        debug!(user_id = %user_id, version = ?row.as_ref().map(|r| r.version), "Loaded skillbook row");
        Ok(row)
    }

    async fn insert_if_absent(&self, user_id: &str, payload: &str) -> StorageResult<bool> {
        let (key, payload) = (user_id.to_string(), payload.to_string());
        let inserted = with_connection(&self.db, move |db| {
            Ok(db.conn().execute(
                "INSERT INTO skillbooks (user_id, skills, version, updated_at) VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(user_id) DO NOTHING",
                params![key, payload, Utc::now().to_rfc3339()],
            )?)
        })
        .await?;

        debug!(user_id = %user_id, inserted, "Insert-if-absent skillbook row");
        Ok(inserted == 1)
    }

    async fn update_if_version(
        &self,
        user_id: &str,
        payload: &str,
        expected_version: i64,
    ) -> StorageResult<usize> {
        let (key, payload) = (user_id.to_string(), payload.to_string());
        let affected = with_connection(&self.db, move |db| {
            Ok(db.conn().execute(
                "UPDATE skillbooks SET skills = ?1, version = version + 1, updated_at = ?2
                 WHERE user_id = ?3 AND version = ?4",
                params![payload, Utc::now().to_rfc3339(), key, expected_version],
            )?)
        })
        .await?;

        debug!(user_id = %user_id, expected_version, affected, "Conditional skillbook update");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SqliteSkillbookRepository {
        SqliteSkillbookRepository::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_load_missing_row() {
        assert!(repo().load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_if_absent_then_load() {
        let repo = repo();
        assert!(repo.insert_if_absent("user-1", r#"{"skills":{}}"#).await.unwrap());

        let row = repo.load("user-1").await.unwrap().unwrap();
        assert_eq!(row.version, 1);
        assert_eq!(row.payload, r#"{"skills":{}}"#);
    }

    #[tokio::test]
    async fn test_second_insert_conflicts() {
        let repo = repo();
        assert!(repo.insert_if_absent("user-1", "first").await.unwrap());
        assert!(!repo.insert_if_absent("user-1", "second").await.unwrap());
        assert_eq!(repo.load("user-1").await.unwrap().unwrap().payload, "first");
    }

    #[tokio::test]
    async fn test_update_if_version_bumps_version() {
        let repo = repo();
        repo.insert_if_absent("user-1", "v1").await.unwrap();

        assert_eq!(repo.update_if_version("user-1", "v2", 1).await.unwrap(), 1);
        let row = repo.load("user-1").await.unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.payload, "v2");
    }

    #[tokio::test]
    async fn test_stale_update_affects_no_rows() {
        let repo = repo();
        repo.insert_if_absent("user-1", "v1").await.unwrap();
        repo.update_if_version("user-1", "v2", 1).await.unwrap();

        assert_eq!(repo.update_if_version("user-1", "stale", 1).await.unwrap(), 0);
        let row = repo.load("user-1").await.unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.payload, "v2");
    }

    #[tokio::test]
    async fn test_update_missing_row_affects_no_rows() {
        assert_eq!(repo().update_if_version("ghost", "x", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let repo = repo();
        repo.insert_if_absent("alice", "a").await.unwrap();
        repo.insert_if_absent("bob", "b").await.unwrap();
        repo.update_if_version("alice", "a2", 1).await.unwrap();

        assert_eq!(repo.load("bob").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_locked_database_does_not_block_runtime() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("spendwise.db");
        let repo = SqliteSkillbookRepository::new(Database::open(&path).unwrap());

        let locker = rusqlite::Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(std::time::Duration::from_millis(100), repo.load("user-1")).await;
        assert!(result.is_err(), "load should still be waiting on the lock");
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        locker.execute_batch("COMMIT").unwrap();
        assert!(repo.load("user-1").await.unwrap().is_none());
    }
}
