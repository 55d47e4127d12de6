//! Per-user skillbook.
//!
//! A skillbook is the agent's learned memory: short strategies grouped by
//! section, each with helpful/harmful/neutral counters. It is mutated only
//! through [`Skillbook::add_skill`] and [`Skillbook::apply_update`], and
//! persisted as a JSON payload whose shape is fixed by [`SkillbookDict`].
//! The storage version is carried next to the skillbook, never inside it.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::learning::updates::{TagMetadata, UpdateBatch, UpdateOperation};

/// A single learned strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Stable identifier, unique within the skillbook and never reused.
    pub id: String,
    /// Topical bucket (not unique).
    pub section: String,
    /// Strategy text shown to the agent.
    pub content: String,
    /// Count of times this skill was helpful.
    #[serde(default)]
    pub helpful: u32,
    /// Count of times this skill was harmful.
    #[serde(default)]
    pub harmful: u32,
    /// Count of times this skill was neutral.
    #[serde(default)]
    pub neutral: u32,
}

impl Skill {
    fn new(id: String, section: String, content: String) -> Self {
        Self { id, section, content, helpful: 0, harmful: 0, neutral: 0 }
    }

    /// Applies the counter increments of a TAG operation.
    fn tag(&mut self, metadata: &TagMetadata) {
        self.helpful = self.helpful.saturating_add(metadata.helpful.unwrap_or(0));
        self.harmful = self.harmful.saturating_add(metadata.harmful.unwrap_or(0));
        self.neutral = self.neutral.saturating_add(metadata.neutral.unwrap_or(0));
    }

    /// Net effectiveness used for ranking.
    pub fn score(&self) -> i64 {
        i64::from(self.helpful) - i64::from(self.harmful)
    }
}

/// Errors that can occur while (de)serializing a skillbook.
#[derive(Error, Debug)]
pub enum SkillbookError {
    /// Payload is not valid JSON or has the wrong shape.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload is well-formed JSON but internally inconsistent.
    #[error("Invalid skillbook payload: {0}")]
    InvalidPayload(String),
}

/// Result type for skillbook operations.
pub type Result<T> = std::result::Result<T, SkillbookError>;

/// Largest id counter a payload may carry; minting stays far from `u64::MAX`.
const MAX_ID_COUNTER: u64 = i64::MAX.unsigned_abs();

/// Reserved payload metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillbookMetadata {
    /// Counter used to mint the next skill id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<u64>,
    /// Keys this version does not interpret; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Serialization-ready snapshot of a skillbook.
///
/// This is the persisted wire shape: skills keyed by id, a derived
/// section index, and reserved metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillbookDict {
    /// Skills keyed by id.
    pub skills: BTreeMap<String, Skill>,
    /// Section name to the ids of its skills.
    #[serde(default)]
    pub sections: BTreeMap<String, Vec<String>>,
    /// Reserved metadata.
    #[serde(default)]
    pub metadata: SkillbookMetadata,
}

/// Counts of what an [`UpdateBatch`] actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Ids of skills created by ADD operations, in order.
    pub added: Vec<String>,
    /// TAG operations that hit an existing skill.
    pub tagged: usize,
    /// REMOVE operations that deleted a skill.
    pub removed: usize,
    /// TAG/REMOVE operations whose skill id was not present.
    pub skipped: usize,
}

/// Per-user collection of skills.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skillbook {
    skills: BTreeMap<String, Skill>,
    next_id: u64,
    metadata_extra: Map<String, Value>,
}

impl Skillbook {
    /// Creates an empty skillbook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of skills.
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// True when the skillbook holds no skills.
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Generates a skill ID for a given section.
    ///
    /// Ids look like `price-comparison-00007`. The counter only grows, so an id
    /// is never handed out twice, even after the skill is removed.
    fn generate_skill_id(&mut self, section: &str) -> String {
        let prefix: String = section
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let prefix = if prefix.is_empty() { "general".to_string() } else { prefix };

        loop {
            self.next_id += 1;
            let id = format!("{}-{:05}", prefix, self.next_id);
            if !self.skills.contains_key(&id) {
                return id;
            }
        }
    }

    /// Adds a new skill with a freshly generated id.
    pub fn add_skill(&mut self, section: impl Into<String>, content: impl Into<String>) -> Skill {
        let section = section.into();
        let id = self.generate_skill_id(&section);
        let skill = Skill::new(id.clone(), section, content.into());
        self.skills.insert(id, skill.clone());
        skill
    }

    /// Snapshot of all skills, ordered by id.
    pub fn skills(&self) -> Vec<Skill> {
        self.skills.values().cloned().collect()
    }

    /// Gets a skill by ID.
    pub fn get_skill(&self, skill_id: &str) -> Option<Skill> {
        self.skills.get(skill_id).cloned()
    }

    /// Applies a batch of update operations in order.
    ///
    /// Never fails: TAG and REMOVE operations naming an unknown skill are
    /// skipped, so a batch computed against an older skillbook still applies.
    pub fn apply_update(&mut self, update: &UpdateBatch) -> ApplySummary {
        let mut summary = ApplySummary::default();

        for operation in &update.operations {
            match operation {
                UpdateOperation::Add { section, content } => {
                    let skill = self.add_skill(section.clone(), content.clone());
                    summary.added.push(skill.id);
                }
                UpdateOperation::Tag { skill_id, metadata, .. } => {
                    if let Some(skill) = self.skills.get_mut(skill_id) {
                        skill.tag(metadata);
                        summary.tagged += 1;
                    } else {
                        debug!(skill_id = %skill_id, "Skipping TAG for unknown skill");
                        summary.skipped += 1;
                    }
                }
                UpdateOperation::Remove { skill_id, .. } => {
                    if self.skills.remove(skill_id).is_some() {
                        summary.removed += 1;
                    } else {
                        debug!(skill_id = %skill_id, "Skipping REMOVE for unknown skill");
                        summary.skipped += 1;
                    }
                }
            }
        }

        summary
    }

    /// Derived section index.
    fn sections(&self) -> BTreeMap<String, Vec<String>> {
        let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for skill in self.skills.values() {
            sections.entry(skill.section.clone()).or_default().push(skill.id.clone());
        }
        sections
    }

    /// Serialization-ready snapshot.
    pub fn to_dict(&self) -> SkillbookDict {
        SkillbookDict {
            skills: self.skills.clone(),
            sections: self.sections(),
            metadata: SkillbookMetadata {
                next_id: Some(self.next_id),
                extra: self.metadata_extra.clone(),
            },
        }
    }

    /// Rebuilds a skillbook from a snapshot.
    ///
    /// The section index is recomputed from the skills; a stored index that
    /// disagrees is logged and discarded.
    pub fn from_dict(dict: SkillbookDict) -> Result<Self> {
        for (key, skill) in &dict.skills {
            if key != &skill.id {
                return Err(SkillbookError::InvalidPayload(format!(
                    "skill stored under '{}' has id '{}'",
                    key, skill.id
                )));
            }
        }

        let highest_suffix = dict
            .skills
            .keys()
            .filter_map(|id| id.rsplit('-').next().and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0);

        let next_id = dict.metadata.next_id.unwrap_or(0).max(highest_suffix);
        if next_id > MAX_ID_COUNTER {
            return Err(SkillbookError::InvalidPayload(format!(
                "id counter {} exceeds {}",
                next_id, MAX_ID_COUNTER
            )));
        }

        let skillbook = Self {
            next_id,
            skills: dict.skills,
            metadata_extra: dict.metadata.extra,
        };

        if !dict.sections.is_empty() && dict.sections != skillbook.sections() {
            warn!("Stored section index disagrees with skills; rebuilding it");
        }

        Ok(skillbook)
    }

    /// Serializes the skillbook to its JSON payload.
    pub fn dumps(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_dict())?)
    }

    /// Deserializes a skillbook from its JSON payload.
    pub fn loads(payload: &str) -> Result<Self> {
        let dict: SkillbookDict = serde_json::from_str(payload)?;
        Self::from_dict(dict)
    }

    /// Renders every skill as agent-readable context.
    pub fn as_prompt(&self) -> String {
        self.as_prompt_limited(usize::MAX)
    }

    /// Renders skills as context, keeping the best `max_per_section` of each section.
    ///
    /// Skills are ranked by `helpful - harmful` within their section.
    pub fn as_prompt_limited(&self, max_per_section: usize) -> String {
        let mut context = String::new();

        if self.skills.is_empty() {
            return context;
        }

        context.push_str("# Skillbook Strategies\n\n");

        let sections = self.sections();
        for (section, skill_ids) in &sections {
            let mut skills: Vec<&Skill> =
                skill_ids.iter().filter_map(|id| self.skills.get(id)).collect();
            skills.sort_by(|a, b| b.score().cmp(&a.score()));

            let _ = writeln!(context, "## {}\n", section);

            for skill in skills.into_iter().take(max_per_section) {
                let _ = writeln!(
                    context,
                    "- [{}] {} (helpful={}, harmful={}, neutral={})",
                    skill.id, skill.content, skill.helpful, skill.harmful, skill.neutral
                );
            }

            context.push('\n');
        }

        context.trim().to_string()
    }
}
