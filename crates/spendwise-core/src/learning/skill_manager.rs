//! SkillManager for turning a reflection into skillbook updates.
//!
//! The SkillManager reads the Reflector's analysis and the current skillbook
//! and asks a model for an [`UpdateBatch`]. Applying the batch is the caller's
//! job.

use std::fmt::Write;
use std::sync::Arc;

use serde_json::{Value, json};
use spendwise_abstraction::{ModelError, ModelParameters, StructuredModel, StructuredRequest};
use thiserror::Error;
use tracing::debug;

use crate::learning::skillbook::Skillbook;
use crate::learning::updates::UpdateBatch;

/// Errors that can occur during skill management.
#[derive(Error, Debug)]
pub enum SkillManagerError {
    /// Model error during skill curation.
    #[error("Model error: {0}")]
    ModelError(#[from] ModelError),

    /// Failed to parse skill manager response.
    #[error("Failed to parse skill manager response: {0}")]
    ParseError(String),
}

/// Result type for skill manager operations.
pub type Result<T> = std::result::Result<T, SkillManagerError>;

/// JSON schema for [`UpdateBatch`].
pub fn update_batch_schema() -> Value {
    let section = json!({"type": ["string", "null"]});
    let count = json!({"type": ["integer", "null"], "minimum": 0});

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["reasoning", "operations"],
        "properties": {
            "reasoning": {"type": "string"},
            "operations": {
                "type": "array",
                "items": {
                    "anyOf": [
                        {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["type", "section", "content"],
                            "properties": {
                                "type": {"const": "ADD"},
                                "section": {"type": "string"},
                                "content": {"type": "string"}
                            }
                        },
                        {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["type", "section", "skill_id", "metadata"],
                            "properties": {
                                "type": {"const": "TAG"},
                                "section": section,
                                "skill_id": {"type": "string"},
                                "metadata": {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": ["helpful", "harmful", "neutral"],
                                    "properties": {
                                        "helpful": count,
                                        "harmful": count,
                                        "neutral": count
                                    }
                                }
                            }
                        },
                        {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["type", "section", "skill_id"],
                            "properties": {
                                "type": {"const": "REMOVE"},
                                "section": section,
                                "skill_id": {"type": "string"}
                            }
                        }
                    ]
                }
            }
        }
    })
}

/// SkillManager generates skillbook updates from reflection analysis.
pub struct SkillManager {
    /// The model to use for skill curation.
    model: Arc<dyn StructuredModel>,
    /// Skills per section included in the prompt.
    max_skills_per_section: usize,
}

impl SkillManager {
    /// Creates a new skill manager.
    ///
    /// # Arguments
    /// * `model` - The model to use for generating skill updates
    pub fn new(model: Arc<dyn StructuredModel>) -> Self {
        Self { model, max_skills_per_section: usize::MAX }
    }

    /// Limits how many skills per section are shown to the model.
    #[must_use]
    pub fn with_context_limit(mut self, max_skills_per_section: usize) -> Self {
        self.max_skills_per_section = max_skills_per_section;
        self
    }

    /// Generates skillbook updates from a reflection.
    ///
    /// # Arguments
    /// * `reflection_analysis` - The Reflector's analysis text
    /// * `skillbook` - The current skillbook (for context)
    ///
    /// # Returns
    /// UpdateBatch with operations to apply; an empty batch means no change is warranted
    ///
    /// # Errors
    /// Returns error if model call fails or response cannot be parsed
    pub async fn curate(&self, reflection_analysis: &str, skillbook: &Skillbook) -> Result<UpdateBatch> {
        let request = StructuredRequest::new("update_batch", update_batch_schema())
            .with_system(Self::build_system_prompt())
            .with_user(self.build_prompt(reflection_analysis, skillbook))
            .with_parameters(ModelParameters {
                temperature: Some(0.3),
                top_p: Some(0.9),
                max_tokens: Some(2048),
            });

        let response = self.model.complete_structured(&request).await?;
        let batch = Self::parse_response(response)?;

        debug!(
            model_id = %self.model.model_id(),
            operations = batch.operations.len(),
            "Curation complete"
        );

        Ok(batch)
    }

    /// Builds the system prompt for skill curation.
    fn build_system_prompt() -> String {
        "You are a SkillManager that maintains a spending assistant's skillbook.

Your role is to:
1. Turn the reflection into concrete skillbook changes
2. Reinforce strategies the reflection found helpful (TAG helpful)
3. Discourage or delete strategies it found harmful (TAG harmful, REMOVE)
4. Add new strategies only when they are atomic and not already covered

Operation types: ADD (new skill), TAG (increment helpful/harmful/neutral counters), REMOVE (delete skill).
For TAG operations, metadata holds the increment for the counter to change and null for the others.
Only reference skill ids that exist in the current skillbook.
Return an empty operations list when no change is warranted."
            .to_string()
    }

    /// Builds the user prompt with context.
    fn build_prompt(&self, reflection_analysis: &str, skillbook: &Skillbook) -> String {
        let mut prompt = String::new();

        let _ = writeln!(prompt, "Reflection:\n{}", reflection_analysis.trim());

        // Include current skillbook context (limited to avoid token bloat)
        let skillbook_context = skillbook.as_prompt_limited(self.max_skills_per_section);
        if skillbook_context.is_empty() {
            prompt.push_str("\nCurrent Skillbook: (empty)\n");
        } else {
            prompt.push_str("\nCurrent Skillbook:\n");
            prompt.push_str(&skillbook_context);
        }

        prompt.push_str("\n\nGenerate the update operations for the skillbook.");

        prompt
    }

    /// Parses the model's answer into an [`UpdateBatch`].
    ///
    /// Unknown operation kinds fail the whole batch rather than being dropped.
    fn parse_response(response: Value) -> Result<UpdateBatch> {
        serde_json::from_value(response).map_err(|e| SkillManagerError::ParseError(e.to_string()))
    }
}
