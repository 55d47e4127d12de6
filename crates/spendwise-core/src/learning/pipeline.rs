//! Learning pipeline: reflect, curate, commit.
//!
//! After an interaction ends, the pipeline asks the [`Reflector`] for a
//! critique, turns it into an [`UpdateBatch`] with the [`SkillManager`], and
//! commits the batch to the user's skillbook row.
//!
//! Nothing locks the row. A commit is a conditional write keyed on the version
//! the batch was applied to; on conflict the row is re-read and the same batch
//! is re-applied to the fresh skillbook, up to `max_commit_attempts` times.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::LearningConfig;
use crate::learning::feedback::Interaction;
use crate::learning::reflector::{Reflector, ReflectorError, ReflectorOutput};
use crate::learning::skill_manager::{SkillManager, SkillManagerError};
use crate::learning::skillbook::{Skillbook, SkillbookError};
use crate::learning::updates::UpdateBatch;
use crate::storage::{SkillbookRepository, StorageError, StorageResult};
use crate::telemetry::{self, LearningEvent, LearningEventKind, LearningTelemetry};

/// Errors that abort a learning run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The Reflector call failed.
    #[error("Reflector failed: {0}")]
    Reflector(#[from] ReflectorError),

    /// The SkillManager call failed.
    #[error("SkillManager failed: {0}")]
    SkillManager(#[from] SkillManagerError),

    /// A storage call failed or timed out.
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    /// The stored payload could not be decoded, or the new one encoded.
    #[error("Skillbook payload error: {0}")]
    Skillbook(#[from] SkillbookError),

    /// A model call did not finish in time.
    #[error("Stage '{stage}' timed out after {limit:?}")]
    Timeout {
        /// Stage that timed out.
        stage: &'static str,
        /// The configured limit.
        limit: Duration,
    },
}

impl PipelineError {
    /// Name of the stage the error came from.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Reflector(_) => "reflector",
            Self::SkillManager(_) => "skill_manager",
            Self::Storage(_) => "storage",
            Self::Skillbook(_) => "skillbook",
            Self::Timeout { stage, .. } => *stage,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A skillbook together with the version it was read at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedSkillbook {
    /// The decoded skillbook.
    pub skillbook: Skillbook,
    /// Stored version; 0 means no row exists yet.
    pub version: i64,
}

impl LoadedSkillbook {
    /// Empty skillbook for a user without a stored row.
    pub fn new_user() -> Self {
        Self::default()
    }
}

/// How a commit loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The batch was written.
    Committed {
        /// Version now stored.
        version: i64,
        /// Attempts it took, starting at 1.
        attempts: u32,
        /// The skillbook as written.
        skillbook: Skillbook,
    },
    /// Every attempt hit a conflict; the batch went to the retry queue log.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Result of one learning run.
#[derive(Debug, Clone, PartialEq)]
pub enum LearningReport {
    /// Learning is switched off in the configuration.
    Disabled,
    /// The SkillManager asked for no changes; nothing was written.
    Unchanged {
        /// The Reflector's critique.
        reflection: ReflectorOutput,
        /// The empty batch.
        batch: UpdateBatch,
    },
    /// A non-empty batch went through the commit loop.
    Completed {
        /// The Reflector's critique.
        reflection: ReflectorOutput,
        /// The batch that was committed or queued.
        batch: UpdateBatch,
        /// How the commit loop ended.
        outcome: CommitOutcome,
    },
}

/// Drives Reflector, SkillManager and the optimistic commit for one user at a time.
pub struct LearningPipeline {
    reflector: Reflector,
    skill_manager: SkillManager,
    repository: Arc<dyn SkillbookRepository>,
    telemetry: Arc<dyn LearningTelemetry>,
    config: LearningConfig,
}

impl LearningPipeline {
    /// Creates a new pipeline.
    ///
    /// The Reflector and SkillManager prompts are bounded by
    /// `config.max_skills_per_section`.
    pub fn new(
        reflector: Reflector,
        skill_manager: SkillManager,
        repository: Arc<dyn SkillbookRepository>,
        telemetry: Arc<dyn LearningTelemetry>,
        config: LearningConfig,
    ) -> Self {
        Self {
            reflector: reflector.with_context_limit(config.max_skills_per_section),
            skill_manager: skill_manager.with_context_limit(config.max_skills_per_section),
            repository,
            telemetry,
            config,
        }
    }

    /// Loads a user's skillbook and its version.
    ///
    /// A user without a row gets an empty skillbook at version 0.
    ///
    /// # Errors
    /// Returns error if the storage call fails or times out, or the payload is corrupt
    pub async fn load(&self, user_id: &str) -> Result<LoadedSkillbook> {
        let row = self.storage_call("load", self.repository.load(user_id)).await?;

        match row {
            Some(row) => Ok(LoadedSkillbook {
                skillbook: Skillbook::loads(&row.payload)?,
                version: row.version,
            }),
            None => {
                debug!(user_id = %user_id, "No stored skillbook; starting empty");
                Ok(LoadedSkillbook::new_user())
            }
        }
    }

    /// Runs one learning pass for a finished interaction.
    ///
    /// `loaded` is the skillbook the agent read before the interaction; it is
    /// both the Reflector's context and the base of the first commit attempt.
    ///
    /// # Errors
    /// Returns error if a stage fails or times out. A commit that loses every
    /// race is not an error; it is reported as [`CommitOutcome::Exhausted`].
    pub async fn learn(&self, interaction: &Interaction, loaded: LoadedSkillbook) -> Result<LearningReport> {
        if !self.config.enabled {
            debug!(user_id = %interaction.user_id, "Learning disabled; skipping");
            return Ok(LearningReport::Disabled);
        }

        let result = self.run(interaction, loaded).await;

        if let Err(e) = &result {
            warn!(
                user_id = %interaction.user_id,
                stage = e.stage(),
                error = %e,
                "Learning run aborted"
            );
            self.emit(
                &interaction.user_id,
                LearningEventKind::Failed { stage: e.stage().to_string(), error: e.to_string() },
            );
        }

        result
    }

    async fn run(&self, interaction: &Interaction, loaded: LoadedSkillbook) -> Result<LearningReport> {
        let user_id = interaction.user_id.as_str();
        debug!(
            user_id = %user_id,
            outcome = %interaction.outcome,
            version = loaded.version,
            "Starting learning run"
        );

        // 1. Critique the interaction
        let input = interaction.reflection_input();
        let reflection = Self::within(
            "reflector",
            self.config.reflector_timeout(),
            self.reflector.reflect(&input, &loaded.skillbook),
        )
        .await?;

        self.emit(
            user_id,
            LearningEventKind::Reflected {
                helpful: reflection.helpful_skill_ids.len(),
                harmful: reflection.harmful_skill_ids.len(),
                new_learnings: reflection.new_learnings.len(),
            },
        );

        // 2. Turn the critique into a batch
        let brief = reflection.curation_brief();
        let batch = Self::within(
            "skill_manager",
            self.config.skill_manager_timeout(),
            self.skill_manager.curate(&brief, &loaded.skillbook),
        )
        .await?;

        self.emit(
            user_id,
            LearningEventKind::Curated {
                operations: batch.operations.len(),
                reasoning: batch.reasoning.clone(),
            },
        );

        if batch.is_empty() {
            debug!(user_id = %user_id, "SkillManager requested no changes");
            return Ok(LearningReport::Unchanged { reflection, batch });
        }

        // 3. Commit
        let outcome = self.commit_with_retry(user_id, &batch, loaded).await?;

        Ok(LearningReport::Completed { reflection, batch, outcome })
    }

    /// Applies `batch` and commits it, retrying on version conflicts.
    ///
    /// The first attempt uses `loaded`; later attempts re-read the row and
    /// re-apply the same batch to the fresh skillbook. A user at version 0 is
    /// inserted; if another writer inserted first, the next attempt updates.
    ///
    /// # Errors
    /// Returns error if a storage call fails or times out, or a payload cannot
    /// be encoded or decoded
    pub async fn commit_with_retry(
        &self,
        user_id: &str,
        batch: &UpdateBatch,
        loaded: LoadedSkillbook,
    ) -> Result<CommitOutcome> {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut base = Some(loaded);

        for attempt in 1..=max_attempts {
            let LoadedSkillbook { mut skillbook, version } = match base.take() {
                Some(loaded) => loaded,
                None => self.load(user_id).await?,
            };

            let summary = skillbook.apply_update(batch);
            let payload = skillbook.dumps()?;

            let committed = if version == 0 {
                let inserted = self
                    .storage_call("insert_if_absent", self.repository.insert_if_absent(user_id, &payload))
                    .await?;
                if !inserted {
                    warn!(user_id = %user_id, attempt, "Skillbook row created concurrently; retrying as update");
                }
                inserted
            } else {
                let affected = self
                    .storage_call(
                        "update_if_version",
                        self.repository.update_if_version(user_id, &payload, version),
                    )
                    .await?;
                if affected == 0 {
                    warn!(user_id = %user_id, attempt, version, "Skillbook version conflict; retrying");
                }
                affected > 0
            };

            if committed {
                let new_version = version + 1;
                info!(
                    user_id = %user_id,
                    version = new_version,
                    attempts = attempt,
                    added = summary.added.len(),
                    tagged = summary.tagged,
                    removed = summary.removed,
                    skipped = summary.skipped,
                    "Skillbook committed"
                );
                self.emit(user_id, LearningEventKind::Committed { version: new_version, attempts: attempt });
                return Ok(CommitOutcome::Committed { version: new_version, attempts: attempt, skillbook });
            }
        }

        let serialized = serde_json::to_string(batch).map_err(SkillbookError::from)?;
        error!(
            target: "spendwise::retry_queue",
            user_id = %user_id,
            attempts = max_attempts,
            reasoning = %batch.reasoning,
            batch = %serialized,
            "Skillbook commit exhausted retries; queued for reprocessing"
        );
        self.emit(user_id, LearningEventKind::CommitExhausted { attempts: max_attempts });

        Ok(CommitOutcome::Exhausted { attempts: max_attempts })
    }

    /// Runs [`learn`](Self::learn) on a background task.
    ///
    /// The interactive caller never waits on or sees the outcome; failures are logged.
    pub fn spawn_learning(self: Arc<Self>, interaction: Interaction, loaded: LoadedSkillbook) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.learn(&interaction, loaded).await {
                Ok(LearningReport::Completed { outcome: CommitOutcome::Committed { version, .. }, .. }) => {
                    debug!(user_id = %interaction.user_id, version, "Background learning committed");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        user_id = %interaction.user_id,
                        stage = e.stage(),
                        error = %e,
                        "Background learning run failed"
                    );
                }
            }
        })
    }

    /// Races a model call against its limit.
    async fn within<T, E>(
        stage: &'static str,
        limit: Duration,
        call: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        PipelineError: From<E>,
    {
        match timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(stage, limit_ms = limit.as_millis() as u64, "Learning stage timed out");
                Err(PipelineError::Timeout { stage, limit })
            }
        }
    }

    /// Races a storage call against the storage limit.
    async fn storage_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StorageResult<T>>,
    ) -> Result<T> {
        let limit = self.config.storage_timeout();
        match timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(operation, limit_ms = limit.as_millis() as u64, "Storage call timed out");
                Err(StorageError::Timeout { operation, elapsed: limit }.into())
            }
        }
    }

    fn emit(&self, user_id: &str, kind: LearningEventKind) {
        telemetry::emit(&self.telemetry, LearningEvent::new(user_id, kind));
    }
}
