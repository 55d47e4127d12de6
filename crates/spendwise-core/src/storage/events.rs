//! SQLite audit log of learning events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio::sync::Mutex;

use crate::storage::database::{Database, with_connection};
use crate::storage::error::{StorageError, StorageResult};
use crate::telemetry::{self, LearningEvent, LearningEventKind, LearningTelemetry, TelemetryError};

/// Stores every [`LearningEvent`] as a row in `learning_events`.
#[derive(Clone)]
pub struct SqliteTelemetry {
    db: Arc<Mutex<Database>>,
}

impl SqliteTelemetry {
    /// Creates a sink over a connection, usually shared with the skillbook repository.
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Inserts one event.
    ///
    /// # Errors
    /// Returns error if serialization or the insert fails
    pub async fn insert(&self, event: &LearningEvent) -> StorageResult<()> {
        let detail = serde_json::to_string(&event.detail)?;
        let (user_id, kind, at) = (event.user_id.clone(), event.detail.name(), event.at.to_rfc3339());
        with_connection(&self.db, move |db| {
            db.conn().execute(
                "INSERT INTO learning_events (user_id, kind, detail_json, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, kind, detail, at],
            )?;
            Ok(())
        })
        .await
    }

    /// Lists a user's events, oldest first.
    ///
    /// # Errors
    /// Returns error if the query fails or a stored row is malformed
    pub async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<LearningEvent>> {
        let key = user_id.to_string();
        let rows = with_connection(&self.db, move |db| {
            let mut stmt = db.conn().prepare(
                "SELECT user_id, detail_json, created_at FROM learning_events WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![key], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;

        rows.into_iter()
            .map(|(user_id, detail_json, created_at)| -> StorageResult<LearningEvent> {
                let detail: LearningEventKind = serde_json::from_str(&detail_json)?;
                let at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| StorageError::InvalidData(format!("bad created_at: {}", e)))?
                    .with_timezone(&Utc);
                Ok(LearningEvent { user_id, at, detail })
            })
            .collect()
    }
}

#[async_trait]
impl LearningTelemetry for SqliteTelemetry {
    async fn record(&self, event: &LearningEvent) -> telemetry::Result<()> {
        self.insert(event).await.map_err(|e| TelemetryError::Sink(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> SqliteTelemetry {
        SqliteTelemetry::new(Arc::new(Mutex::new(Database::open_in_memory().unwrap())))
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let sink = sink();
        sink.record(&LearningEvent::new(
            "user-1",
            LearningEventKind::Curated { operations: 2, reasoning: "tidy up".to_string() },
        ))
        .await
        .unwrap();
        sink.record(&LearningEvent::new(
            "user-1",
            LearningEventKind::Committed { version: 3, attempts: 1 },
        ))
        .await
        .unwrap();
        sink.record(&LearningEvent::new("user-2", LearningEventKind::CommitExhausted { attempts: 3 }))
            .await
            .unwrap();

        let events = sink.list_for_user("user-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail.name(), "curated");
        assert_eq!(events[1].detail, LearningEventKind::Committed { version: 3, attempts: 1 });
    }

    #[tokio::test]
    async fn test_list_for_unknown_user_is_empty() {
        assert!(sink().list_for_user("nobody").await.unwrap().is_empty());
    }
}
