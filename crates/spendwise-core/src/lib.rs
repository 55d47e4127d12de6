//! Spendwise Core - self-learning memory for a spending assistant.
//!
//! This crate provides:
//! - The per-user [`Skillbook`] and its [`UpdateBatch`] mutations
//! - The [`Reflector`] and [`SkillManager`] model-backed stages
//! - The [`LearningPipeline`] with optimistic-concurrency commits
//! - SQLite storage, telemetry hooks and configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use spendwise_core::{
//!     Database, Interaction, InteractionOutcome, LearningConfig, LearningPipeline, Reflector,
//!     SkillManager, SqliteSkillbookRepository, TracingTelemetry,
//! };
//! use spendwise_models::ReplayModel;
//!
//! #[tokio::main]
//! async fn main() -> spendwise_core::Result<()> {
//!     spendwise_core::telemetry::init_tracing();
//!
//!     let model = Arc::new(ReplayModel::new("replay"));
//!     let repository = Arc::new(SqliteSkillbookRepository::new(Database::open("spendwise.db")?));
//!     let pipeline = Arc::new(LearningPipeline::new(
//!         Reflector::new(model.clone()),
//!         SkillManager::new(model),
//!         repository,
//!         Arc::new(TracingTelemetry),
//!         LearningConfig::load("spendwise.toml")?,
//!     ));
//!
//!     let loaded = pipeline.load("user-1").await?;
//!     let interaction = Interaction::new(
//!         "user-1",
//!         "Buy the $300 jacket?",
//!         "Wait for Friday's sale",
//!         InteractionOutcome::Wait,
//!     );
//!     pipeline.spawn_learning(interaction, loaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod learning;
pub mod storage;
pub mod telemetry;

pub use config::{ConfigError, LearningConfig, ModelConfigSection};
pub use error::{Result, SpendwiseError};
pub use learning::{
    ApplySummary, CommitOutcome, Interaction, InteractionOutcome, LearningPipeline, LearningReport,
    LoadedSkillbook, NewLearning, PipelineError, ReflectionInput, ReflectionQuality, Reflector,
    ReflectorError, ReflectorOutput, Skill, SkillManager, SkillManagerError, Skillbook,
    SkillbookDict, SkillbookError, TagMetadata, UpdateBatch, UpdateOperation,
};
pub use storage::{
    Database, SkillbookRepository, SqliteSkillbookRepository, SqliteTelemetry, StorageError,
    StorageResult, StoredSkillbook,
};
pub use telemetry::{
    LearningEvent, LearningEventKind, LearningTelemetry, NoopTelemetry, TelemetryError,
    TracingTelemetry, init_tracing,
};
