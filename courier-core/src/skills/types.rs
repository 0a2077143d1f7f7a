//! Dispatch result types.

use crate::error::SkillError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a skill produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillOutput {
    /// Reply shown to the user.
    pub text: String,
    /// Optional structured payload for programmatic callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SkillOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// More than one skill matched the same command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillConflict {
    pub command: String,
    /// Every matching skill, in dispatch order.
    pub skills: Vec<String>,
    /// The skill that ran.
    pub selected: String,
    pub at: DateTime<Utc>,
}

/// Result of `SkillRegistry::dispatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The selected skill ran successfully.
    Handled {
        skill: String,
        output: SkillOutput,
        conflict: Option<SkillConflict>,
    },
    /// No skill matched. The caller may hand the text to conversation.
    Unhandled { command: String },
    /// The selected skill ran and failed. Not retried.
    Failed {
        skill: String,
        error: SkillError,
        conflict: Option<SkillConflict>,
    },
}

impl DispatchOutcome {
    /// Name of the skill that ran, if any.
    pub fn skill(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Handled { skill, .. } | DispatchOutcome::Failed { skill, .. } => {
                Some(skill)
            }
            DispatchOutcome::Unhandled { .. } => None,
        }
    }

    pub fn conflict(&self) -> Option<&SkillConflict> {
        match self {
            DispatchOutcome::Handled { conflict, .. } | DispatchOutcome::Failed { conflict, .. } => {
                conflict.as_ref()
            }
            DispatchOutcome::Unhandled { .. } => None,
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, DispatchOutcome::Unhandled { .. })
    }
}
