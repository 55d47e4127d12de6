//! Self-learning skillbook.
//!
//! Each user has a skillbook of short strategies the spending assistant reads
//! before it decides. After every interaction the [`Reflector`] critiques the
//! outcome, the [`SkillManager`] turns the critique into an [`UpdateBatch`],
//! and the [`LearningPipeline`] commits the batch with optimistic concurrency.

pub mod feedback;
pub mod pipeline;
pub mod reflector;
pub mod skill_manager;
pub mod skillbook;
pub mod updates;

pub use feedback::{Interaction, InteractionOutcome};
pub use pipeline::{
    CommitOutcome, LearningPipeline, LearningReport, LoadedSkillbook, PipelineError,
    Result as PipelineResult,
};
pub use reflector::{
    NewLearning, ReflectionInput, ReflectionQuality, Reflector, ReflectorError, ReflectorOutput,
    Result as ReflectorResult, reflection_schema,
};
pub use skill_manager::{
    Result as SkillManagerResult, SkillManager, SkillManagerError, update_batch_schema,
};
pub use skillbook::{
    ApplySummary, Result as SkillbookResult, Skill, Skillbook, SkillbookDict, SkillbookError,
    SkillbookMetadata,
};
pub use updates::{TagMetadata, UpdateBatch, UpdateOperation};
