//! Skills: symbolic identifiers produced by the skill classifier.
//!
//! Each known skill has a default tier. Unknown skills are carried as
//! [`Skill::Other`] and default to [`Tier::Standard`]; they are never an error.

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Skill {
    /// Grading of written work.
    Correcteur,
    /// Mock oral exam panel.
    Jury,
    /// Long multi-document synthesis.
    Synthese,
    /// Interactive tutoring.
    Tuteur,
    /// Free conversation.
    Chat,
    /// Step-by-step explanations.
    Explicateur,
    /// Quiz generation.
    Quiz,
    /// Output formatting and cleanup.
    Formateur,
    /// Conversation titles.
    Titreur,
    /// Anything the classifier emits that is not in the table.
    Other(String),
}

impl Skill {
    /// Parse a classifier identifier. Never fails.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "correcteur" => Skill::Correcteur,
            "jury" => Skill::Jury,
            "synthese" => Skill::Synthese,
            "tuteur" => Skill::Tuteur,
            "chat" => Skill::Chat,
            "explicateur" => Skill::Explicateur,
            "quiz" => Skill::Quiz,
            "formateur" => Skill::Formateur,
            "titreur" => Skill::Titreur,
            other => Skill::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Skill::Correcteur => "correcteur",
            Skill::Jury => "jury",
            Skill::Synthese => "synthese",
            Skill::Tuteur => "tuteur",
            Skill::Chat => "chat",
            Skill::Explicateur => "explicateur",
            Skill::Quiz => "quiz",
            Skill::Formateur => "formateur",
            Skill::Titreur => "titreur",
            Skill::Other(name) => name,
        }
    }

    /// Built-in default tier.
    pub fn default_tier(&self) -> Tier {
        match self {
            Skill::Correcteur | Skill::Jury => Tier::Reasoning,
            Skill::Synthese => Tier::Large,
            Skill::Tuteur | Skill::Chat | Skill::Explicateur | Skill::Quiz => Tier::Standard,
            Skill::Formateur | Skill::Titreur => Tier::Micro,
            Skill::Other(_) => Tier::Standard,
        }
    }
}

impl From<String> for Skill {
    fn from(s: String) -> Self {
        Skill::parse(&s)
    }
}

impl From<&str> for Skill {
    fn from(s: &str) -> Self {
        Skill::parse(s)
    }
}

impl From<Skill> for String {
    fn from(skill: Skill) -> Self {
        skill.name().to_string()
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
