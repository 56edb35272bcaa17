//! Learner profile types.
//!
//! The profile parameterizes both conversation modes: it shapes the system
//! instruction the remote service builds for the tutor persona.

use serde::{Deserialize, Serialize};

/// Self-assessed proficiency of the learner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "Beginner"),
            Self::Intermediate => write!(f, "Intermediate"),
            Self::Advanced => write!(f, "Advanced"),
        }
    }
}

/// What the learner is practising for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningGoal {
    #[default]
    Conversation,
    Business,
    Travel,
    Exams,
}

impl std::fmt::Display for LearningGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conversation => write!(f, "Conversation"),
            Self::Business => write!(f, "Business"),
            Self::Travel => write!(f, "Travel"),
            Self::Exams => write!(f, "Exams"),
        }
    }
}

/// Learner profile passed to the conversational service at session start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name the tutor addresses the learner by.
    pub name: String,
    /// Proficiency level.
    pub level: ProficiencyLevel,
    /// Learning goal.
    pub goal: LearningGoal,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_profile_serde_round_trip() {
        let profile = UserProfile {
            name: "Ana".into(),
            level: ProficiencyLevel::Intermediate,
            goal: LearningGoal::Travel,
        };
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"intermediate\""));
        assert!(json.contains("\"travel\""));
        let back: UserProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_display() {
        assert_eq!(ProficiencyLevel::Beginner.to_string(), "Beginner");
        assert_eq!(LearningGoal::Exams.to_string(), "Exams");
    }
}
