//! Learning telemetry hooks and tracing setup.
//!
//! Telemetry is advisory: [`emit`] hands the event to a background task and a
//! failing sink is logged, never returned to the learning run.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised by telemetry sinks.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The sink could not persist the event.
    #[error("Telemetry sink error: {0}")]
    Sink(String),

    /// The event could not be serialized.
    #[error("Telemetry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// What happened during a learning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningEventKind {
    /// The Reflector produced a critique.
    Reflected {
        /// Skills marked helpful.
        helpful: usize,
        /// Skills marked harmful.
        harmful: usize,
        /// Candidate learnings proposed.
        new_learnings: usize,
    },
    /// The SkillManager produced a batch.
    Curated {
        /// Number of operations in the batch.
        operations: usize,
        /// The SkillManager's reasoning.
        reasoning: String,
    },
    /// A batch was committed.
    Committed {
        /// Version written.
        version: i64,
        /// Attempts it took.
        attempts: u32,
    },
    /// Every commit attempt hit a version conflict.
    CommitExhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// A stage failed and the run was abandoned.
    Failed {
        /// Stage that failed.
        stage: String,
        /// Error text.
        error: String,
    },
}

impl LearningEventKind {
    /// Short name used as the stored `kind` column.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reflected { .. } => "reflected",
            Self::Curated { .. } => "curated",
            Self::Committed { .. } => "committed",
            Self::CommitExhausted { .. } => "commit_exhausted",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningEvent {
    /// User whose skillbook the run concerns.
    pub user_id: String,
    /// When the event was produced.
    pub at: DateTime<Utc>,
    /// Event payload.
    pub detail: LearningEventKind,
}

impl LearningEvent {
    /// Creates an event stamped with the current time.
    pub fn new(user_id: impl Into<String>, detail: LearningEventKind) -> Self {
        Self { user_id: user_id.into(), at: Utc::now(), detail }
    }
}

/// A sink for learning events.
#[async_trait]
pub trait LearningTelemetry: Send + Sync {
    /// Records one event.
    async fn record(&self, event: &LearningEvent) -> Result<()>;
}

/// Writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

#[async_trait]
impl LearningTelemetry for TracingTelemetry {
    async fn record(&self, event: &LearningEvent) -> Result<()> {
        let detail = serde_json::to_string(&event.detail)?;
        info!(
            target: "spendwise::telemetry",
            user_id = %event.user_id,
            kind = event.detail.name(),
            detail = %detail,
            "Learning event"
        );
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

#[async_trait]
impl LearningTelemetry for NoopTelemetry {
    async fn record(&self, _event: &LearningEvent) -> Result<()> {
        Ok(())
    }
}

/// Records `event` on a background task.
///
/// Errors are logged at warn level.
pub fn emit(telemetry: &Arc<dyn LearningTelemetry>, event: LearningEvent) {
    let telemetry = Arc::clone(telemetry);
    tokio::spawn(async move {
        if let Err(e) = telemetry.record(&event).await {
            warn!(
                user_id = %event.user_id,
                kind = event.detail.name(),
                error = %e,
                "Failed to record learning event"
            );
        }
    });
}

/// Installs the global tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to `spendwise_core=debug,info`. Calling it
/// again after a subscriber is installed does nothing.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spendwise_core=debug,info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
