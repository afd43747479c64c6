//! Escalation message construction.

use crate::errors::Result;
use crate::models::escalation::{IterationHistoryEntry, AVAILABLE_ACTIONS};
use crate::models::{ArtifactKind, EscalationMessage, EscalationReason, ReviewFeedback, SessionState};

/// Build an `EscalationMessage` from the current session state.
///
/// A session can be escalated before any code artifact exists (a rejected
/// task spec, or an internal error on the very first generate call); those
/// paths get an empty history and no `best_artifact` rather than an error.
pub fn build(session: &SessionState, reason: EscalationReason) -> Result<EscalationMessage> {
    let code_artifacts: Vec<_> = session
        .artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::Code)
        .collect();

    if code_artifacts.is_empty() {
        return Ok(EscalationMessage {
            session_id: session.session_id.clone(),
            reason,
            best_artifact: None,
            iteration_history: Vec::new(),
            final_critique: ReviewFeedback::empty(session.last_quality_score.unwrap_or(0.0)),
            available_actions: AVAILABLE_ACTIONS.to_vec(),
        });
    }

    let iteration_history: Vec<IterationHistoryEntry> = session
        .score_history
        .iter()
        .zip(code_artifacts.iter())
        .enumerate()
        .map(|(idx, (score, artifact))| IterationHistoryEntry {
            iteration: idx as u32,
            score: *score,
            artifact_id: artifact.id.clone(),
        })
        .collect();

    let best_artifact = iteration_history
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ib.cmp(ia)) // earlier iteration wins ties
        })
        .and_then(|(idx, _)| code_artifacts.get(idx))
        .copied()
        .unwrap_or(code_artifacts[0])
        .clone();

    let final_critique = session
        .artifacts
        .iter()
        .rev()
        .find(|a| a.kind == ArtifactKind::Review)
        .and_then(|a| serde_json::from_str::<serde_json::Value>(&a.content).ok())
        .and_then(|v| v.get("feedback").cloned())
        .and_then(|v| serde_json::from_value::<ReviewFeedback>(v).ok())
        .unwrap_or_else(|| ReviewFeedback::empty(session.last_quality_score.unwrap_or(0.0)));

    Ok(EscalationMessage {
        session_id: session.session_id.clone(),
        reason,
        best_artifact: Some(best_artifact),
        iteration_history,
        final_critique,
        available_actions: AVAILABLE_ACTIONS.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artifact, ArtifactKind};

    fn session_with_two_code_artifacts() -> SessionState {
        let mut s = SessionState::new("session-abc123defg", 2, 85.0, 30, 0);
        s.artifacts.push(Artifact::new("artifact-1", ArtifactKind::Code, "v1", 0, "fn a(){}"));
        s.artifacts.push(Artifact::new("artifact-2", ArtifactKind::Code, "v2", 1, "fn b(){}"));
        s.score_history = vec![60.0, 75.0];
        s
    }

    #[test]
    fn best_artifact_is_highest_scoring() {
        let session = session_with_two_code_artifacts();
        let escalation = build(&session, EscalationReason::MaxIterationsReached).unwrap();
        assert_eq!(escalation.best_artifact.unwrap().id, "artifact-2");
    }

    #[test]
    fn ties_prefer_earliest_iteration() {
        let mut session = session_with_two_code_artifacts();
        session.score_history = vec![80.0, 80.0];
        let escalation = build(&session, EscalationReason::StagnationDetected).unwrap();
        assert_eq!(escalation.best_artifact.unwrap().id, "artifact-1");
    }

    #[test]
    fn no_code_artifact_yields_no_best_artifact_but_still_escalates() {
        let session = SessionState::new("session-abc123defg", 2, 85.0, 30, 0);
        let escalation = build(&session, EscalationReason::TaskRejected).unwrap();
        assert!(escalation.best_artifact.is_none());
        assert!(escalation.iteration_history.is_empty());
        assert_eq!(escalation.reason, EscalationReason::TaskRejected);
    }

    #[test]
    fn available_actions_are_the_fixed_four() {
        let session = session_with_two_code_artifacts();
        let escalation = build(&session, EscalationReason::MaxIterationsReached).unwrap();
        assert_eq!(escalation.available_actions.len(), 4);
    }
}
