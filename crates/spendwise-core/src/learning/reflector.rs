//! Reflector: critiques an interaction outcome.
//!
//! The Reflector looks at what the agent was asked, what it answered, how the
//! user reacted, and the skillbook the agent was reading, and asks a model for
//! a structured critique: which skills helped, which hurt, and what new
//! strategies are worth learning. It never touches the skillbook.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use spendwise_abstraction::{ModelError, ModelParameters, StructuredModel, StructuredRequest};
use thiserror::Error;
use tracing::debug;

use crate::learning::skillbook::Skillbook;

/// Errors that can occur during reflection.
#[derive(Error, Debug)]
pub enum ReflectorError {
    /// Model error during reflection.
    #[error("Model error: {0}")]
    ModelError(#[from] ModelError),

    /// The model's answer does not match the reflection schema.
    #[error("Failed to parse reflector response: {0}")]
    ParseError(String),
}

/// Result type for reflector operations.
pub type Result<T> = std::result::Result<T, ReflectorError>;

/// A candidate skill proposed by the Reflector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLearning {
    /// Section the learning belongs to.
    pub section: String,
    /// Strategy text.
    pub content: String,
    /// Model's own 0..1 estimate of how atomic the learning is. Carried, not enforced.
    pub atomicity_score: f64,
}

/// Advisory self-assessment of the reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionQuality {
    /// The critique names a root cause.
    pub root_cause_identified: bool,
    /// The learnings can be acted on.
    pub learnings_actionable: bool,
    /// The critique cites evidence from the interaction.
    pub evidence_based: bool,
}

/// Structured critique of one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectorOutput {
    /// Free-text summary of what happened.
    pub analysis: String,
    /// Skills that contributed to a good outcome.
    pub helpful_skill_ids: BTreeSet<String>,
    /// Skills that contributed to a bad outcome.
    pub harmful_skill_ids: BTreeSet<String>,
    /// Candidate skills, in the model's order.
    pub new_learnings: Vec<NewLearning>,
    /// Optional self-assessment.
    #[serde(default)]
    pub reflection_quality: Option<ReflectionQuality>,
}

impl ReflectorOutput {
    /// Renders the whole critique as the analysis text handed to the SkillManager.
    pub fn curation_brief(&self) -> String {
        let mut brief = self.analysis.trim().to_string();

        if !self.helpful_skill_ids.is_empty() {
            let ids: Vec<&str> = self.helpful_skill_ids.iter().map(String::as_str).collect();
            let _ = write!(brief, "\n\nHelpful skills: {}", ids.join(", "));
        }

        if !self.harmful_skill_ids.is_empty() {
            let ids: Vec<&str> = self.harmful_skill_ids.iter().map(String::as_str).collect();
            let _ = write!(brief, "\n\nHarmful skills: {}", ids.join(", "));
        }

        if !self.new_learnings.is_empty() {
            brief.push_str("\n\nCandidate learnings:");
            for learning in &self.new_learnings {
                let _ = write!(
                    brief,
                    "\n- [{}] {} (atomicity={:.2})",
                    learning.section, learning.content, learning.atomicity_score
                );
            }
        }

        brief
    }
}

/// What the Reflector is asked to critique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionInput {
    /// What was being decided.
    pub question: String,
    /// What the agent said or did.
    pub generator_answer: String,
    /// Natural-language outcome signal.
    pub feedback: String,
}

impl ReflectionInput {
    /// Creates a new reflection input.
    pub fn new(
        question: impl Into<String>,
        generator_answer: impl Into<String>,
        feedback: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            generator_answer: generator_answer.into(),
            feedback: feedback.into(),
        }
    }
}

/// JSON schema for [`ReflectorOutput`].
pub fn reflection_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "analysis",
            "helpful_skill_ids",
            "harmful_skill_ids",
            "new_learnings",
            "reflection_quality"
        ],
        "properties": {
            "analysis": {"type": "string"},
            "helpful_skill_ids": {"type": "array", "items": {"type": "string"}},
            "harmful_skill_ids": {"type": "array", "items": {"type": "string"}},
            "new_learnings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["section", "content", "atomicity_score"],
                    "properties": {
                        "section": {"type": "string"},
                        "content": {"type": "string"},
                        "atomicity_score": {"type": "number", "minimum": 0, "maximum": 1}
                    }
                }
            },
            "reflection_quality": {
                "type": ["object", "null"],
                "additionalProperties": false,
                "required": ["root_cause_identified", "learnings_actionable", "evidence_based"],
                "properties": {
                    "root_cause_identified": {"type": "boolean"},
                    "learnings_actionable": {"type": "boolean"},
                    "evidence_based": {"type": "boolean"}
                }
            }
        }
    })
}

/// Reflector critiques interactions with a model.
pub struct Reflector {
    /// The model to use for reflection.
    model: Arc<dyn StructuredModel>,
    /// Skills per section included in the prompt.
    max_skills_per_section: usize,
}

impl Reflector {
    /// Creates a new reflector.
    pub fn new(model: Arc<dyn StructuredModel>) -> Self {
        Self { model, max_skills_per_section: usize::MAX }
    }

    /// Limits how many skills per section are shown to the model.
    #[must_use]
    pub fn with_context_limit(mut self, max_skills_per_section: usize) -> Self {
        self.max_skills_per_section = max_skills_per_section;
        self
    }

    /// Critiques one interaction.
    ///
    /// Issues exactly one structured completion. Failures are returned as-is;
    /// retrying is the caller's decision.
    ///
    /// # Errors
    /// Returns error if the model call fails or the answer does not match the schema
    pub async fn reflect(
        &self,
        input: &ReflectionInput,
        skillbook: &Skillbook,
    ) -> Result<ReflectorOutput> {
        let request = StructuredRequest::new("reflector_output", reflection_schema())
            .with_system(Self::build_system_prompt())
            .with_user(self.build_prompt(input, skillbook))
            .with_parameters(ModelParameters {
                temperature: Some(0.2),
                top_p: Some(0.9),
                max_tokens: Some(1024),
            });

        let response = self.model.complete_structured(&request).await?;
        let output = Self::parse_response(response)?;

        debug!(
            model_id = %self.model.model_id(),
            helpful = output.helpful_skill_ids.len(),
            harmful = output.harmful_skill_ids.len(),
            new_learnings = output.new_learnings.len(),
            "Reflection complete"
        );

        Ok(output)
    }

    /// Builds the system prompt for reflection.
    fn build_system_prompt() -> String {
        "You are the Reflector for a spending assistant. The assistant read a skillbook of \
strategies, advised a user about a purchase, and the user reacted.

Your role is to:
1. Explain what happened and why the advice worked or failed
2. List the ids of skillbook strategies that helped and those that hurt
3. Propose new, atomic strategies worth remembering (one idea each)

Only cite skill ids that appear in the skillbook. Rate each new learning's atomicity \
between 0 and 1. Answer with JSON matching the provided schema."
            .to_string()
    }

    /// Builds the user prompt with context.
    fn build_prompt(&self, input: &ReflectionInput, skillbook: &Skillbook) -> String {
        let mut prompt = String::new();

        let _ = writeln!(prompt, "Question: {}", input.question);
        let _ = writeln!(prompt, "Assistant Answer: {}", input.generator_answer);
        let _ = writeln!(prompt, "Feedback: {}", input.feedback);

        let skillbook_context = skillbook.as_prompt_limited(self.max_skills_per_section);
        if skillbook_context.is_empty() {
            prompt.push_str("\nCurrent Skillbook: (empty)\n");
        } else {
            prompt.push_str("\nCurrent Skillbook:\n");
            prompt.push_str(&skillbook_context);
        }

        prompt
    }

    /// Parses the model's answer into a [`ReflectorOutput`].
    fn parse_response(response: Value) -> Result<ReflectorOutput> {
        serde_json::from_value(response).map_err(|e| ReflectorError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendwise_models::ReplayModel;

    fn reflection_json() -> Value {
        json!({
            "analysis": "The wait-a-day rule stopped an impulse buy",
            "helpful_skill_ids": ["impulse-control-00001"],
            "harmful_skill_ids": [],
            "new_learnings": [
                {"section": "price-comparison", "content": "Check two alternative sources", "atomicity_score": 0.9}
            ],
            "reflection_quality": {
                "root_cause_identified": true,
                "learnings_actionable": true,
                "evidence_based": false
            }
        })
    }

    #[test]
    fn test_parse_response() {
        let output = Reflector::parse_response(reflection_json()).unwrap();
        assert!(output.helpful_skill_ids.contains("impulse-control-00001"));
        assert!(output.harmful_skill_ids.is_empty());
        assert_eq!(output.new_learnings[0].section, "price-comparison");
        assert!((output.new_learnings[0].atomicity_score - 0.9).abs() < f64::EPSILON);
        assert!(!output.reflection_quality.unwrap().evidence_based);
    }

    #[test]
    fn test_parse_response_quality_optional() {
        let mut value = reflection_json();
        value.as_object_mut().unwrap().remove("reflection_quality");
        assert!(Reflector::parse_response(value).unwrap().reflection_quality.is_none());
    }

    #[test]
    fn test_parse_response_rejects_wrong_shape() {
        let err = Reflector::parse_response(json!({"analysis": "ok", "helpful_skill_ids": "x"}))
            .unwrap_err();
        assert!(matches!(err, ReflectorError::ParseError(_)));
    }

    #[test]
    fn test_build_prompt() {
        let mut skillbook = Skillbook::new();
        skillbook.add_skill("impulse-control", "Wait a day before buying gadgets");
        let reflector = Reflector::new(Arc::new(ReplayModel::new("replay")));

        let input = ReflectionInput::new("Buy headphones?", "Wait a day", "correct");
        let prompt = reflector.build_prompt(&input, &skillbook);
        assert!(prompt.contains("Question: Buy headphones?"));
        assert!(prompt.contains("Feedback: correct"));
        assert!(prompt.contains("[impulse-control-00001] Wait a day before buying gadgets"));
    }

    #[test]
    fn test_curation_brief() {
        let output = Reflector::parse_response(reflection_json()).unwrap();
        let brief = output.curation_brief();
        assert!(brief.starts_with("The wait-a-day rule stopped an impulse buy"));
        assert!(brief.contains("Helpful skills: impulse-control-00001"));
        assert!(!brief.contains("Harmful skills"));
        assert!(brief.contains("- [price-comparison] Check two alternative sources (atomicity=0.90)"));
    }

    #[tokio::test]
    async fn test_reflect_issues_one_request() {
        let model = Arc::new(ReplayModel::with_responses("replay", [reflection_json()]));
        let reflector = Reflector::new(model.clone());
        let skillbook = Skillbook::new();

        let output = reflector
            .reflect(&ReflectionInput::new("q", "a", "correct"), &skillbook)
            .await
            .unwrap();

        assert_eq!(output.new_learnings.len(), 1);
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].schema.name, "reflector_output");
        assert!(requests[0].messages[1].content.contains("(empty)"));
    }

    #[tokio::test]
    async fn test_reflect_propagates_model_error() {
        let model = Arc::new(ReplayModel::new("replay"));
        model.push_error(ModelError::RequestError("down".to_string()));
        let reflector = Reflector::new(model);

        let err = reflector
            .reflect(&ReflectionInput::new("q", "a", "f"), &Skillbook::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReflectorError::ModelError(_)));
    }
}
