//! Orchestrator: drives generate → review → (approve|revise|escalate).

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::collaborators::{Clock, CollaboratorTimeouts, LanguageModelClient};
use crate::errors::{OrchestratorError, Result};
use crate::loop_guard::{LoopGuard, LoopGuardConfig, StopReason};
use crate::models::artifact::new_artifact_id;
use crate::models::{
    Artifact, ArtifactKind, EscalationMessage, EscalationReason, SessionState, SessionStatus, TaskSpec,
};
use crate::review_pipeline::{ReviewDepth, ReviewPipeline};
use crate::state_machine::transition;
use crate::store::SessionStore;

use super::escalation::build as build_escalation;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_iterations: Option<u32>,
    pub quality_threshold: Option<f32>,
    pub task_timeout_minutes: Option<u32>,
}

pub enum OrchestratorOutcome {
    Archived { archive_id: String },
    Escalated(Box<EscalationMessage>),
}

pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    coder: RwLock<Arc<dyn LanguageModelClient>>,
    review_pipeline: Arc<ReviewPipeline>,
    loop_guard: LoopGuard,
    defaults: RunOptions,
    timeouts: CollaboratorTimeouts,
    /// Per-session mutual exclusion: the Orchestrator is the sole writer of
    /// a given session's state.
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        coder: Arc<dyn LanguageModelClient>,
        review_pipeline: Arc<ReviewPipeline>,
        loop_guard_config: LoopGuardConfig,
        defaults: RunOptions,
    ) -> Self {
        Self {
            store,
            clock,
            coder: RwLock::new(coder),
            review_pipeline,
            loop_guard: LoopGuard::new(loop_guard_config),
            defaults,
            timeouts: CollaboratorTimeouts::default(),
            session_locks: DashMap::new(),
        }
    }

    /// Override the default per-call model timeout (10 minutes).
    pub fn with_timeouts(mut self, timeouts: CollaboratorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Swap the Coder endpoint (`configure_endpoint`, agent_type = "coder").
    pub fn set_coder(&self, coder: Arc<dyn LanguageModelClient>) {
        *self.coder.write() = coder;
    }

    fn coder(&self) -> Arc<dyn LanguageModelClient> {
        self.coder.read().clone()
    }

    async fn generate_with_timeout(&self, task_spec: &TaskSpec) -> Result<String> {
        tokio::time::timeout(self.model_timeout(), self.coder().generate(task_spec))
            .await
            .map_err(|_| OrchestratorError::ExternalTimeout("coder generate".to_string()))?
    }

    async fn revise_with_timeout(&self, current_code: &str, feedback: &crate::models::ReviewFeedback) -> Result<String> {
        tokio::time::timeout(self.model_timeout(), self.coder().revise(current_code, feedback))
            .await
            .map_err(|_| OrchestratorError::ExternalTimeout("coder revise".to_string()))?
    }

    fn model_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeouts.model_ms)
    }

    /// Ad hoc Coder revision outside the run loop, for the `revise_code` tool.
    pub async fn revise_standalone(&self, current_code: &str, feedback: &crate::models::ReviewFeedback) -> Result<String> {
        self.revise_with_timeout(current_code, feedback).await
    }

    /// Ad hoc test-suite generation outside the run loop, for the
    /// `generate_test_suite` tool.
    pub async fn generate_tests_standalone(&self, code: &str, framework: &str, coverage_target: Option<f32>) -> Result<String> {
        tokio::time::timeout(self.model_timeout(), self.coder().generate_tests(code, framework, coverage_target))
            .await
            .map_err(|_| OrchestratorError::ExternalTimeout("coder generate_tests".to_string()))?
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Single entry point: `run(session_id, task_spec, options)`.
    pub async fn run(
        &self,
        session_id: &str,
        task_spec: TaskSpec,
        options: RunOptions,
    ) -> Result<OrchestratorOutcome> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let max_iterations = options
            .max_iterations
            .or(self.defaults.max_iterations)
            .unwrap_or(5);
        let quality_threshold = options
            .quality_threshold
            .or(self.defaults.quality_threshold)
            .unwrap_or(85.0);
        let task_timeout_minutes = options
            .task_timeout_minutes
            .or(self.defaults.task_timeout_minutes)
            .unwrap_or(60);

        let now = self.clock.now_ms();
        let mut session = match self.store.load(session_id).await? {
            Some(s) => s,
            None => {
                let s = SessionState::new(session_id, max_iterations, quality_threshold, task_timeout_minutes, now);
                self.store.create(session_id, s.clone()).await?;
                s
            }
        };

        if let Err(reason) = task_spec.validate() {
            tracing::warn!(session_id, %reason, "task spec rejected");
            let escalation = build_escalation(&session, EscalationReason::TaskRejected)?;
            return Ok(OrchestratorOutcome::Escalated(Box::new(escalation)));
        }

        match self.run_loop(&mut session, &task_spec, max_iterations, quality_threshold).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(session_id, error = %e, "orchestration failed");
                session.state = SessionStatus::Failed;
                let _ = self.store.persist(&session).await;
                match build_escalation(&session, EscalationReason::InternalError) {
                    Ok(escalation) => Ok(OrchestratorOutcome::Escalated(Box::new(escalation))),
                    Err(_) => Err(e),
                }
            }
        }
    }

    async fn run_loop(
        &self,
        session: &mut SessionState,
        task_spec: &TaskSpec,
        max_iterations: u32,
        quality_threshold: f32,
    ) -> Result<OrchestratorOutcome> {
        transition(session, SessionStatus::Generating)?;
        let code_content = self.generate_with_timeout(task_spec).await?;
        let now = self.clock.now_ms();
        let code_artifact = Artifact::new(new_artifact_id(), ArtifactKind::Code, "generated code", now, code_content.clone())
            .with_metadata("language", task_spec.language.clone())
            .with_metadata("iteration", session.current_iteration.to_string());
        session.artifacts.push(code_artifact);
        self.store.persist(session).await?;

        loop {
            transition(session, SessionStatus::Reviewing)?;

            let code = session
                .artifacts
                .iter()
                .rev()
                .find(|a| a.kind == ArtifactKind::Code)
                .cloned()
                .ok_or_else(|| OrchestratorError::Internal("no code artifact to review".into()))?;

            let linked_suite = ReviewPipeline::find_linked_test_suite(&code, &session.artifacts).cloned();

            let now = self.clock.now_ms();
            let outcome = self
                .review_pipeline
                .review(
                    &code,
                    linked_suite.as_ref(),
                    &task_spec.language,
                    ReviewDepth::Standard,
                    session.current_iteration,
                    max_iterations,
                    quality_threshold,
                    now,
                    new_artifact_id,
                )
                .await?;

            session.artifacts.push(outcome.review_artifact.clone());
            session.last_quality_score = Some(outcome.feedback.quality_score);
            session.score_history.push(outcome.feedback.quality_score);
            session.time_per_iteration_ms.push(self.clock.now_ms() - now);
            self.store.persist(session).await?;

            if let Some(reason) = outcome.dangerous_output {
                tracing::error!(session_id = %session.session_id, reason, "dangerous output detected");
                transition(session, SessionStatus::Escalated)?;
                self.store.persist(session).await?;
                let escalation = build_escalation(session, EscalationReason::DangerousOutputDetected)?;
                return Ok(OrchestratorOutcome::Escalated(Box::new(escalation)));
            }

            use crate::models::Recommendation::*;
            match outcome.recommendation {
                Approve => {
                    // Loop Guard's digest check is skipped on this path, but
                    // every code artifact's digest still belongs in
                    // content_hashes, so record it here explicitly.
                    session.content_hashes.insert(LoopGuard::digest(&code.content));
                    transition(session, SessionStatus::Converged)?;
                    break;
                }
                Revise | Escalate => {
                    let stop = self.loop_guard.check(session, &code.content, self.clock.now_ms());
                    if let Some(reason) = stop {
                        transition(session, SessionStatus::Escalated)?;
                        self.store.persist(session).await?;
                        let escalation = build_escalation(session, map_stop_reason(reason))?;
                        return Ok(OrchestratorOutcome::Escalated(Box::new(escalation)));
                    }

                    transition(session, SessionStatus::Revising)?;
                    let revised_code = self.revise_with_timeout(&code.content, &outcome.feedback).await?;
                    let now = self.clock.now_ms();
                    let revised_artifact = Artifact::new(
                        new_artifact_id(),
                        ArtifactKind::Code,
                        "revised code",
                        now,
                        revised_code,
                    )
                    .with_metadata("language", task_spec.language.clone())
                    .with_metadata("iteration", session.current_iteration.to_string())
                    .with_metadata("originating_artifact_id", code.id.clone());
                    session.artifacts.push(revised_artifact);
                    self.store.persist(session).await?;
                }
            }
        }

        let archive_id = format!("archive-{}", uuid::Uuid::new_v4().simple());
        transition(session, SessionStatus::Idle)?;
        self.store.persist(session).await?;
        Ok(OrchestratorOutcome::Archived { archive_id })
    }
}

fn map_stop_reason(reason: StopReason) -> EscalationReason {
    match reason {
        StopReason::MaxIterationsReached => EscalationReason::MaxIterationsReached,
        StopReason::TimeoutExceeded => EscalationReason::TimeoutExceeded,
        StopReason::OscillationDetected => EscalationReason::OscillationDetected,
        StopReason::StagnationDetected => EscalationReason::StagnationDetected,
    }
}
