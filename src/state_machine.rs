//! Legal state transitions for a session.

use crate::errors::{OrchestratorError, Result};
use crate::models::{SessionState, SessionStatus};

/// Attempt a transition, applying the transition-specific side effects and
/// mutating `session.state` only if the move is legal.
pub fn transition(session: &mut SessionState, to: SessionStatus) -> Result<()> {
    use SessionStatus::*;

    let legal = matches!(
        (session.state, to),
        (Idle, Generating)
            | (Generating, Reviewing)
            | (Generating, Failed)
            | (Reviewing, Converged)
            | (Reviewing, Revising)
            | (Reviewing, Escalated)
            | (Revising, Reviewing)
            | (Revising, Failed)
            | (Converged, Idle)
            | (Escalated, Revising)
            | (Escalated, Idle)
            | (Escalated, Failed)
            | (Failed, Idle)
    );

    if !legal {
        return Err(OrchestratorError::InvalidTransition {
            from: session.state.to_string(),
            to: to.to_string(),
        });
    }

    match to {
        Revising => session.current_iteration += 1,
        Idle if matches!(session.state, Converged | Escalated | Failed) => {
            session.current_iteration = 0;
            session.score_history.clear();
            session.time_per_iteration_ms.clear();
            session.content_hashes.clear();
        }
        _ => {}
    }

    tracing::debug!(session_id = %session.session_id, from = %session.state, to = %to, "state transition");
    session.state = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new("session-abc123defg", 5, 85.0, 30, 0)
    }

    #[test]
    fn idle_to_generating_is_legal() {
        let mut s = session();
        assert!(transition(&mut s, SessionStatus::Generating).is_ok());
        assert_eq!(s.state, SessionStatus::Generating);
    }

    #[test]
    fn idle_to_reviewing_is_illegal() {
        let mut s = session();
        let err = transition(&mut s, SessionStatus::Reviewing).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(s.state, SessionStatus::Idle);
    }

    #[test]
    fn entering_revising_increments_iteration() {
        let mut s = session();
        s.state = SessionStatus::Reviewing;
        transition(&mut s, SessionStatus::Revising).unwrap();
        assert_eq!(s.current_iteration, 1);
    }

    #[test]
    fn returning_to_idle_resets_loop_state() {
        let mut s = session();
        s.state = SessionStatus::Converged;
        s.current_iteration = 3;
        s.score_history = vec![70.0, 90.0];
        s.content_hashes.insert("abc".into());

        transition(&mut s, SessionStatus::Idle).unwrap();

        assert_eq!(s.current_iteration, 0);
        assert!(s.score_history.is_empty());
        assert!(s.content_hashes.is_empty());
    }
}
