//! The `execute_task_spec` input. Not persisted as a distinct entity;
//! its essentials are embedded in the session's first audit-trail entry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    pub language: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub context_files: Vec<String>,
}

impl TaskSpec {
    /// Validation: description bounds and non-empty language.
    pub fn validate(&self) -> Result<(), String> {
        let len = self.description.trim().chars().count();
        if len < 10 {
            return Err("description must be at least 10 characters".into());
        }
        if len > 10_000 {
            return Err("description must be at most 10,000 characters".into());
        }
        if self.language.trim().is_empty() {
            return Err("language must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_description() {
        let spec = TaskSpec {
            description: "too short".into(),
            language: "rust".into(),
            constraints: vec![],
            examples: vec![],
            context_files: vec![],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_missing_language() {
        let spec = TaskSpec {
            description: "Implement a rate limiter with token buckets".into(),
            language: "".into(),
            constraints: vec![],
            examples: vec![],
            context_files: vec![],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_spec() {
        let spec = TaskSpec {
            description: "Implement a rate limiter with token buckets".into(),
            language: "rust".into(),
            constraints: vec![],
            examples: vec![],
            context_files: vec![],
        };
        assert!(spec.validate().is_ok());
    }
}
