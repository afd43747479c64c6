//! Review feedback and defects.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefectSeverity {
    Critical,
    Major,
    Minor,
    Info,
}

impl DefectSeverity {
    /// Per-defect deduction applied to the quality score. Unknown severities would
    /// deduct 0, but the enum is closed so that case cannot arise here.
    pub fn deduction(self) -> f32 {
        match self {
            Self::Critical => 25.0,
            Self::Major => 10.0,
            Self::Minor => 3.0,
            Self::Info => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defect {
    pub severity: DefectSeverity,
    pub category: String,
    pub location: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Revise,
    Escalate,
}

/// Structured review content, embedded as a `review` artifact's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub quality_score: f32,
    pub defects: Vec<Defect>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub required_changes: Vec<String>,
}

impl ReviewFeedback {
    pub fn empty(quality_score: f32) -> Self {
        Self {
            quality_score,
            defects: Vec::new(),
            suggestions: Vec::new(),
            required_changes: Vec::new(),
        }
    }
}

/// Draft feedback as returned directly by the Critic, before test/static/policy
/// defects are merged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticDraft {
    pub score_hint: f32,
    pub defects: Vec<Defect>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub required_changes: Vec<String>,
}
