//! Loop Guard: termination predicates evaluated before each revise step.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterationsReached,
    TimeoutExceeded,
    OscillationDetected,
    StagnationDetected,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopGuardConfig {
    pub stagnation_window: usize,
    pub stagnation_threshold: f32,
    pub oscillation_enabled: bool,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            stagnation_window: 2,
            stagnation_threshold: 2.0,
            oscillation_enabled: true,
        }
    }
}

pub struct LoopGuard {
    config: LoopGuardConfig,
}

impl LoopGuard {
    pub fn new(config: LoopGuardConfig) -> Self {
        Self { config }
    }

    /// Digest the exact bytes of a candidate code artifact's content.
    pub fn digest(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Evaluate the four predicates in order against a candidate revise step.
    /// `new_code_content` is the content just produced, `now_ms` the current
    /// time. Predicate 3 mutates `session.content_hashes` as documented even
    /// when it does not terminate the loop.
    pub fn check(
        &self,
        session: &mut SessionState,
        new_code_content: &str,
        now_ms: i64,
    ) -> Option<StopReason> {
        if session.current_iteration >= session.max_iterations {
            return Some(StopReason::MaxIterationsReached);
        }

        let timeout_ms = session.task_timeout_minutes as i64 * 60_000;
        if session.elapsed_time_ms(now_ms) > timeout_ms {
            return Some(StopReason::TimeoutExceeded);
        }

        if self.config.oscillation_enabled {
            let digest = Self::digest(new_code_content);
            if session.content_hashes.contains(&digest) {
                return Some(StopReason::OscillationDetected);
            }
            session.content_hashes.insert(digest);
        }

        if session.score_history.len() >= self.config.stagnation_window {
            let window = &session.score_history[session.score_history.len() - self.config.stagnation_window..];
            let deltas: Vec<f32> = window
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).abs())
                .collect();
            if !deltas.is_empty() && deltas.iter().all(|d| *d < self.config.stagnation_threshold) {
                return Some(StopReason::StagnationDetected);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionState;

    fn session() -> SessionState {
        let mut s = SessionState::new("session-abc123defg", 2, 85.0, 30, 0);
        s.current_iteration = 0;
        s
    }

    #[test]
    fn below_stagnation_window_never_stagnates() {
        let guard = LoopGuard::new(LoopGuardConfig::default());
        let mut s = session();
        s.score_history = vec![70.0];
        assert!(guard.check(&mut s, "code-v1", 0).is_none());
    }

    #[test]
    fn stagnation_detected_when_deltas_small() {
        let guard = LoopGuard::new(LoopGuardConfig::default());
        let mut s = session();
        s.max_iterations = 10;
        s.score_history = vec![70.0, 71.0, 71.0];
        let reason = guard.check(&mut s, "code-v1", 0);
        assert_eq!(reason, Some(StopReason::StagnationDetected));
    }

    #[test]
    fn oscillation_detected_on_repeated_digest() {
        let guard = LoopGuard::new(LoopGuardConfig::default());
        let mut s = session();
        s.max_iterations = 10;
        assert!(guard.check(&mut s, "identical-bytes", 0).is_none());
        let reason = guard.check(&mut s, "identical-bytes", 0);
        assert_eq!(reason, Some(StopReason::OscillationDetected));
    }

    #[test]
    fn iteration_cap_takes_priority() {
        let guard = LoopGuard::new(LoopGuardConfig::default());
        let mut s = session();
        s.current_iteration = 2;
        s.max_iterations = 2;
        let reason = guard.check(&mut s, "code-v1", 0);
        assert_eq!(reason, Some(StopReason::MaxIterationsReached));
    }

    #[test]
    fn timeout_exceeded_detected() {
        let guard = LoopGuard::new(LoopGuardConfig::default());
        let mut s = session();
        s.max_iterations = 10;
        s.task_timeout_minutes = 1;
        let reason = guard.check(&mut s, "code-v1", 120_000);
        assert_eq!(reason, Some(StopReason::TimeoutExceeded));
    }
}
