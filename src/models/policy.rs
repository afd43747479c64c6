//! Organization policy rules and violations.
//!
//! Grounded in the teacher's `orchestrator/policy.rs` rule/category/severity
//! shape, retargeted from "plan compliance" to "code artifact compliance".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyCategory {
    Style,
    Security,
    Custom,
}

impl std::fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Style => write!(f, "style"),
            Self::Security => write!(f, "security"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for PolicyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "style" => Ok(Self::Style),
            "security" => Ok(Self::Security),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown policy_type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySeverity {
    Critical,
    Warning,
    Info,
}

/// A single enforceable rule, either loaded from a configured policy file or
/// drawn from the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub description: String,
    pub severity: PolicySeverity,
    pub category: PolicyCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Regex that must match somewhere in the artifact for the rule to be
    /// satisfied; absence of a match is a violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement_pattern: Option<String>,
    /// Regex whose presence in the artifact is itself a violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_pattern: Option<String>,
    /// `"default"` for the built-in baseline, else the configured file path.
    pub source_file: String,
}

/// A violation detected when checking a code artifact against a `PolicyRule` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule_id: String,
    pub description: String,
    pub severity: PolicySeverity,
}
