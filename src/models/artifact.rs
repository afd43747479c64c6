//! Immutable output record of one stage of the loop.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Code,
    TestSuite,
    Review,
    Log,
    AuditTrail,
}

/// An immutable record of a stage's output. Once appended to a session it is
/// never mutated; revisions and new reviews produce new artifacts instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub description: String,
    pub timestamp_ms: i64,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Artifact {
    pub fn new(
        id: impl Into<String>,
        kind: ArtifactKind,
        description: impl Into<String>,
        timestamp_ms: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            timestamp_ms,
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Generate an artifact id in the `artifact-<lowercase-alphanum-hyphens>` shape.
pub fn new_artifact_id() -> String {
    format!("artifact-{}", uuid::Uuid::new_v4().simple())
}
