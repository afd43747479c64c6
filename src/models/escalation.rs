//! Escalation message construction.

use serde::{Deserialize, Serialize};

use super::{artifact::Artifact, review::ReviewFeedback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MaxIterationsReached,
    StagnationDetected,
    OscillationDetected,
    TimeoutExceeded,
    DangerousOutputDetected,
    TaskRejected,
    InternalError,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AvailableAction {
    #[serde(rename = "switch_llm")]
    SwitchLlm,
    #[serde(rename = "retry_with_constraints")]
    RetryWithConstraints,
    #[serde(rename = "abort")]
    Abort,
    #[serde(rename = "accept_best_effort")]
    AcceptBestEffort,
}

pub const AVAILABLE_ACTIONS: [AvailableAction; 4] = [
    AvailableAction::SwitchLlm,
    AvailableAction::RetryWithConstraints,
    AvailableAction::Abort,
    AvailableAction::AcceptBestEffort,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationHistoryEntry {
    pub iteration: u32,
    pub score: f32,
    pub artifact_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationMessage {
    pub session_id: String,
    pub reason: EscalationReason,
    pub best_artifact: Option<Artifact>,
    pub iteration_history: Vec<IterationHistoryEntry>,
    pub final_critique: ReviewFeedback,
    pub available_actions: Vec<AvailableAction>,
}
