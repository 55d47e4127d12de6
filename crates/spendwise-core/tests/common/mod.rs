//! Shared test utilities for Spendwise Core integration tests.
//!
//! Canned model answers, repository wrappers that stage concurrent writers or
//! slow storage, and telemetry sinks that record or fail.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use spendwise_core::telemetry::{self, TelemetryError};
use spendwise_core::{
    Database, LearningConfig, LearningEvent, LearningPipeline, LearningTelemetry, Reflector,
    SkillManager, SkillbookRepository, Skillbook, SqliteSkillbookRepository, StorageResult,
    StoredSkillbook, UpdateBatch,
};
use spendwise_models::ReplayModel;

/// Reflector answer naming helpful and harmful skills, plus optional learnings.
pub fn reflection(helpful: &[&str], harmful: &[&str], new_learnings: Value) -> Value {
    json!({
        "analysis": "The suggestion shaped the user's decision.",
        "helpful_skill_ids": helpful,
        "harmful_skill_ids": harmful,
        "new_learnings": new_learnings,
        "reflection_quality": {
            "root_cause_identified": true,
            "learnings_actionable": true,
            "evidence_based": true
        }
    })
}

/// SkillManager answer with the given operations.
pub fn batch(reasoning: &str, operations: Value) -> Value {
    json!({"reasoning": reasoning, "operations": operations})
}

/// Fresh in-memory SQLite repository.
pub fn sqlite_repository() -> Arc<SqliteSkillbookRepository> {
    Arc::new(SqliteSkillbookRepository::new(Database::open_in_memory().unwrap()))
}

/// Stores `skillbook` as the user's first row (version 1).
pub async fn seed(repository: &dyn SkillbookRepository, user_id: &str, skillbook: &Skillbook) {
    assert!(repository.insert_if_absent(user_id, &skillbook.dumps().unwrap()).await.unwrap());
}

/// Pipeline whose Reflector and SkillManager share one replay model.
pub fn pipeline_with(
    model: Arc<ReplayModel>,
    repository: Arc<dyn SkillbookRepository>,
    telemetry: Arc<dyn LearningTelemetry>,
    config: LearningConfig,
) -> LearningPipeline {
    LearningPipeline::new(
        Reflector::new(model.clone()),
        SkillManager::new(model),
        repository,
        telemetry,
        config,
    )
}

/// Repository that lets a competing writer commit `competitor` right before
/// each of the next `races` writes.
pub struct RacingRepository {
    inner: Arc<SqliteSkillbookRepository>,
    competitor: UpdateBatch,
    races_left: AtomicU32,
    writes: AtomicU32,
}

impl RacingRepository {
    pub fn new(inner: Arc<SqliteSkillbookRepository>, competitor: UpdateBatch, races: u32) -> Self {
        Self { inner, competitor, races_left: AtomicU32::new(races), writes: AtomicU32::new(0) }
    }

    /// Writes attempted by the code under test.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn race(&self, user_id: &str) {
        let raced = self
            .races_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !raced {
            return;
        }

        match self.inner.load(user_id).await.unwrap() {
            Some(row) => {
                let mut skillbook = Skillbook::loads(&row.payload).unwrap();
                skillbook.apply_update(&self.competitor);
                let affected = self
                    .inner
                    .update_if_version(user_id, &skillbook.dumps().unwrap(), row.version)
                    .await
                    .unwrap();
                assert_eq!(affected, 1);
            }
            None => {
                let mut skillbook = Skillbook::new();
                skillbook.apply_update(&self.competitor);
                assert!(self.inner.insert_if_absent(user_id, &skillbook.dumps().unwrap()).await.unwrap());
            }
        }
    }
}

#[async_trait]
impl SkillbookRepository for RacingRepository {
    async fn load(&self, user_id: &str) -> StorageResult<Option<StoredSkillbook>> {
        self.inner.load(user_id).await
    }

    async fn insert_if_absent(&self, user_id: &str, payload: &str) -> StorageResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.race(user_id).await;
        self.inner.insert_if_absent(user_id, payload).await
    }

    async fn update_if_version(
        &self,
        user_id: &str,
        payload: &str,
        expected_version: i64,
    ) -> StorageResult<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.race(user_id).await;
        self.inner.update_if_version(user_id, payload, expected_version).await
    }
}

/// Repository whose reads take `delay`.
pub struct SlowRepository {
    pub inner: Arc<SqliteSkillbookRepository>,
    pub delay: Duration,
}

#[async_trait]
impl SkillbookRepository for SlowRepository {
    async fn load(&self, user_id: &str) -> StorageResult<Option<StoredSkillbook>> {
        tokio::time::sleep(self.delay).await;
        self.inner.load(user_id).await
    }

    async fn insert_if_absent(&self, user_id: &str, payload: &str) -> StorageResult<bool> {
        self.inner.insert_if_absent(user_id, payload).await
    }

    async fn update_if_version(
        &self,
        user_id: &str,
        payload: &str,
        expected_version: i64,
    ) -> StorageResult<usize> {
        self.inner.update_if_version(user_id, payload, expected_version).await
    }
}

/// Telemetry sink that keeps every event.
#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<LearningEvent>>,
}

impl RecordingTelemetry {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.detail.name()).collect()
    }

    /// Waits for fire-and-forget events to land.
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..100 {
            if self.events.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} telemetry events, got {:?}", self.kinds());
    }
}

#[async_trait]
impl LearningTelemetry for RecordingTelemetry {
    async fn record(&self, event: &LearningEvent) -> telemetry::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Telemetry sink that always fails.
pub struct FailingTelemetry;

#[async_trait]
impl LearningTelemetry for FailingTelemetry {
    async fn record(&self, _event: &LearningEvent) -> telemetry::Result<()> {
        Err(TelemetryError::Sink("telemetry backend unavailable".to_string()))
    }
}
