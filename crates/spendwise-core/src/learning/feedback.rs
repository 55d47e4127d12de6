//! Interaction outcomes and the feedback sentences the Reflector sees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::learning::reflector::ReflectionInput;

/// How an interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionOutcome {
    /// User took the suggestion.
    Accepted,
    /// User went against the suggestion.
    Overridden,
    /// User waited, as suggested.
    Wait,
    /// User left without deciding.
    Abandoned,
    /// Purchase cleared without the assistant stepping in.
    AutoApproved,
    /// User bypassed the assistant with the break-glass override.
    BreakGlass,
    /// The decision window expired.
    Timeout,
}

impl InteractionOutcome {
    /// All outcomes, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Accepted,
        Self::Overridden,
        Self::Wait,
        Self::Abandoned,
        Self::AutoApproved,
        Self::BreakGlass,
        Self::Timeout,
    ];

    /// The one-sentence signal handed to the Reflector.
    pub fn feedback_signal(self) -> &'static str {
        match self {
            Self::Accepted => "correct — user accepted the suggestion",
            Self::Overridden => "incorrect — user overrode the suggestion",
            Self::Wait => "correct — user chose to wait as suggested",
            Self::Abandoned => "neutral — user abandoned without deciding",
            Self::AutoApproved => {
                "neutral — purchase auto-approved below the risk threshold, no intervention/learning signal"
            }
            Self::BreakGlass => {
                "neutral — user invoked break-glass override, no intervention/learning signal"
            }
            Self::Timeout => "neutral — decision window timed out, no intervention/learning signal",
        }
    }

    /// Wire name of the outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Overridden => "overridden",
            Self::Wait => "wait",
            Self::Abandoned => "abandoned",
            Self::AutoApproved => "auto_approved",
            Self::BreakGlass => "break_glass",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for InteractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == normalized)
            .ok_or_else(|| format!("Unknown interaction outcome: {}", s))
    }
}

/// One finished interaction, ready to learn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Owner of the skillbook.
    pub user_id: String,
    /// What was being decided.
    pub question: String,
    /// What the agent said or did.
    pub generator_answer: String,
    /// How it ended.
    pub outcome: InteractionOutcome,
}

impl Interaction {
    /// Creates a new interaction.
    pub fn new(
        user_id: impl Into<String>,
        question: impl Into<String>,
        generator_answer: impl Into<String>,
        outcome: InteractionOutcome,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            question: question.into(),
            generator_answer: generator_answer.into(),
            outcome,
        }
    }

    /// Reflector input with the outcome mapped to its feedback sentence.
    pub fn reflection_input(&self) -> ReflectionInput {
        ReflectionInput::new(
            self.question.clone(),
            self.generator_answer.clone(),
            self.outcome.feedback_signal(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_decision_signals() {
        assert_eq!(
            InteractionOutcome::Accepted.feedback_signal(),
            "correct — user accepted the suggestion"
        );
        assert_eq!(
            InteractionOutcome::Overridden.feedback_signal(),
            "incorrect — user overrode the suggestion"
        );
        assert_eq!(
            InteractionOutcome::Wait.feedback_signal(),
            "correct — user chose to wait as suggested"
        );
        assert_eq!(
            InteractionOutcome::Abandoned.feedback_signal(),
            "neutral — user abandoned without deciding"
        );
    }

    #[test]
    fn test_system_conditions_carry_no_signal() {
        let system = [InteractionOutcome::AutoApproved, InteractionOutcome::BreakGlass, InteractionOutcome::Timeout];
        for outcome in system {
            let signal = outcome.feedback_signal();
            assert!(signal.starts_with("neutral — "), "{outcome}: {signal}");
            assert!(signal.ends_with("no intervention/learning signal"), "{outcome}: {signal}");
        }
        assert!(!InteractionOutcome::Abandoned.feedback_signal().contains("no intervention"));
    }

    #[test]
    fn test_from_str_round_trips() {
        for outcome in InteractionOutcome::ALL {
            assert_eq!(outcome.to_string().parse::<InteractionOutcome>(), Ok(outcome));
        }
        assert_eq!("Break-Glass".parse::<InteractionOutcome>(), Ok(InteractionOutcome::BreakGlass));
        assert!("maybe".parse::<InteractionOutcome>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&InteractionOutcome::AutoApproved).unwrap(),
            "\"auto_approved\""
        );
    }

    #[test]
    fn test_reflection_input_uses_signal() {
        let interaction =
            Interaction::new("user-1", "Buy the $300 jacket?", "Wait until Friday's sale", InteractionOutcome::Wait);
        let input = interaction.reflection_input();
        assert_eq!(input.question, "Buy the $300 jacket?");
        assert_eq!(input.feedback, "correct — user chose to wait as suggested");
    }
}
