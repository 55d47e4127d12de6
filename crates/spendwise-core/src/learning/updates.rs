//! Update operations for the skillbook.
//!
//! Instead of regenerating the entire skillbook after each interaction, the
//! SkillManager emits a batch of incremental operations: ADD, TAG, REMOVE.
//! Operation kinds form a closed set; anything else is rejected when the batch
//! is deserialized.

use serde::{Deserialize, Serialize};

/// Counter increments carried by a TAG operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagMetadata {
    /// Increment for the helpful counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpful: Option<u32>,
    /// Increment for the harmful counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harmful: Option<u32>,
    /// Increment for the neutral counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neutral: Option<u32>,
}

impl TagMetadata {
    /// Metadata incrementing `helpful` by `n`.
    pub fn helpful(n: u32) -> Self {
        Self { helpful: Some(n), ..Self::default() }
    }

    /// Metadata incrementing `harmful` by `n`.
    pub fn harmful(n: u32) -> Self {
        Self { harmful: Some(n), ..Self::default() }
    }

    /// Metadata incrementing `neutral` by `n`.
    pub fn neutral(n: u32) -> Self {
        Self { neutral: Some(n), ..Self::default() }
    }
}

/// Single update operation to apply to the skillbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum UpdateOperation {
    /// Add a new skill; the skillbook assigns its id.
    Add {
        /// Section for the new skill.
        section: String,
        /// Strategy text.
        content: String,
    },
    /// Increment counters on an existing skill.
    Tag {
        /// Section of the tagged skill (informational).
        #[serde(default)]
        section: Option<String>,
        /// Skill to tag.
        skill_id: String,
        /// Counter increments.
        metadata: TagMetadata,
    },
    /// Delete a skill.
    Remove {
        /// Section of the removed skill (informational).
        #[serde(default)]
        section: Option<String>,
        /// Skill to remove.
        skill_id: String,
    },
}

impl UpdateOperation {
    /// Creates an ADD operation.
    pub fn add(section: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Add { section: section.into(), content: content.into() }
    }

    /// Creates a TAG operation.
    pub fn tag(skill_id: impl Into<String>, metadata: TagMetadata) -> Self {
        Self::Tag { section: None, skill_id: skill_id.into(), metadata }
    }

    /// Creates a REMOVE operation.
    pub fn remove(skill_id: impl Into<String>) -> Self {
        Self::Remove { section: None, skill_id: skill_id.into() }
    }

    /// Short name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "ADD",
            Self::Tag { .. } => "TAG",
            Self::Remove { .. } => "REMOVE",
        }
    }
}

/// Batch of update operations with reasoning.
///
/// The SkillManager generates these batches based on reflection analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBatch {
    /// Reasoning for these updates, kept for audit.
    pub reasoning: String,
    /// Operations, applied in order.
    #[serde(default)]
    pub operations: Vec<UpdateOperation>,
}

impl UpdateBatch {
    /// Creates a new update batch.
    pub fn new(reasoning: impl Into<String>) -> Self {
        Self { reasoning: reasoning.into(), operations: Vec::new() }
    }

    /// Adds an operation to the batch.
    pub fn add_operation(&mut self, operation: UpdateOperation) {
        self.operations.push(operation);
    }

    /// Builder form of [`UpdateBatch::add_operation`].
    #[must_use]
    pub fn with_operation(mut self, operation: UpdateOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Checks if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
