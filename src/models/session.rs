//! The session aggregate: `SessionState` and its lifecycle status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::artifact::{Artifact, ArtifactKind};

/// Schema version of persisted session snapshots. Bump when the on-disk
/// shape changes and extend `crate::store::file::migrate` accordingly.
pub const SCHEMA_VERSION: u32 = 1;

/// The state-machine position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Idle,
    Generating,
    Reviewing,
    Revising,
    Converged,
    Escalated,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Generating => "GENERATING",
            Self::Reviewing => "REVIEWING",
            Self::Revising => "REVISING",
            Self::Converged => "CONVERGED",
            Self::Escalated => "ESCALATED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// The primary aggregate: one orchestration's full lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub schema_version: u32,
    pub session_id: String,
    pub state: SessionStatus,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub quality_threshold: f32,
    pub task_timeout_minutes: u32,
    pub start_time_ms: i64,
    pub last_quality_score: Option<f32>,
    pub score_history: Vec<f32>,
    pub time_per_iteration_ms: Vec<i64>,
    pub content_hashes: BTreeSet<String>,
    pub artifacts: Vec<Artifact>,
}

impl SessionState {
    /// Create a fresh session in `IDLE` with the given bounds.
    pub fn new(
        session_id: impl Into<String>,
        max_iterations: u32,
        quality_threshold: f32,
        task_timeout_minutes: u32,
        now_ms: i64,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.into(),
            state: SessionStatus::Idle,
            current_iteration: 0,
            max_iterations,
            quality_threshold,
            task_timeout_minutes,
            start_time_ms: now_ms,
            last_quality_score: None,
            score_history: Vec::new(),
            time_per_iteration_ms: Vec::new(),
            content_hashes: BTreeSet::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn elapsed_time_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.start_time_ms).max(0)
    }

    /// Code artifacts in append order.
    pub fn code_artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.kind == ArtifactKind::Code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_idle_with_empty_sequences() {
        let s = SessionState::new("session-abc123defg", 5, 85.0, 30, 1_000);
        assert_eq!(s.state, SessionStatus::Idle);
        assert_eq!(s.current_iteration, 0);
        assert!(s.score_history.is_empty());
        assert!(s.time_per_iteration_ms.is_empty());
        assert!(s.content_hashes.is_empty());
    }

    #[test]
    fn elapsed_time_is_nonnegative() {
        let s = SessionState::new("session-abc123defg", 5, 85.0, 30, 1_000);
        assert_eq!(s.elapsed_time_ms(500), 0);
        assert_eq!(s.elapsed_time_ms(1_500), 500);
    }
}
