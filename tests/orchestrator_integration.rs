//! End-to-end tests driving the Orchestrator against fake Coder/Critic
//! collaborators, covering convergence and each Loop Guard escalation path.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use codeloop::{
    CriticDraft, Defect, DefectSeverity, EscalationReason, LoopGuardConfig, NullStaticAnalyzer, NullTestExecutor,
    Orchestrator, OrchestratorOutcome, PolicyStore, ReviewFeedback, ReviewPipeline, RunOptions,
    SessionStore, TaskSpec,
};
use codeloop::collaborators::{Clock, LanguageModelClient};
use codeloop::store::InMemorySessionStore;

/// Deterministic clock: each call advances by one second.
struct FakeClock(AtomicI64);

impl FakeClock {
    fn new() -> Self {
        Self(AtomicI64::new(0))
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.0.fetch_add(1_000, Ordering::SeqCst)
    }
}

/// Coder that produces a distinct code artifact on every call, so Loop Guard's
/// oscillation predicate never fires on its own.
struct DistinctCoder(AtomicUsize);

impl DistinctCoder {
    fn new() -> Self {
        Self(AtomicUsize::new(0))
    }
}

#[async_trait]
impl LanguageModelClient for DistinctCoder {
    async fn generate(&self, task: &TaskSpec) -> codeloop::Result<String> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fn solution_{n}() {{ /* {} */ }}", task.description))
    }

    async fn revise(&self, current_code: &str, _feedback: &ReviewFeedback) -> codeloop::Result<String> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{current_code}\nfn patch_{n}() {{}}"))
    }

    async fn critique(&self, _code: &str) -> codeloop::Result<CriticDraft> {
        Ok(CriticDraft { score_hint: 100.0, defects: Vec::new(), suggestions: Vec::new(), required_changes: Vec::new() })
    }

    async fn generate_tests(&self, _code: &str, framework: &str, _coverage_target: Option<f32>) -> codeloop::Result<String> {
        Ok(format!("// {framework} tests"))
    }
}

/// Coder whose revision ignores the input and always returns the same
/// content, to exercise the oscillation predicate directly.
struct ConstantRevisionCoder;

#[async_trait]
impl LanguageModelClient for ConstantRevisionCoder {
    async fn generate(&self, _task: &TaskSpec) -> codeloop::Result<String> {
        Ok("fn solution_v0() {}".to_string())
    }

    async fn revise(&self, _current_code: &str, _feedback: &ReviewFeedback) -> codeloop::Result<String> {
        Ok("fn solution_fixed() {}".to_string())
    }

    async fn critique(&self, _code: &str) -> codeloop::Result<CriticDraft> {
        Ok(CriticDraft { score_hint: 100.0, defects: Vec::new(), suggestions: Vec::new(), required_changes: Vec::new() })
    }

    async fn generate_tests(&self, _code: &str, framework: &str, _coverage_target: Option<f32>) -> codeloop::Result<String> {
        Ok(format!("// {framework} tests"))
    }
}

fn defects_for_deduction(mut deduction: i32) -> Vec<Defect> {
    let mut defects = Vec::new();
    while deduction > 0 {
        defects.push(Defect {
            severity: DefectSeverity::Info,
            category: "fake".into(),
            location: "src/lib.rs:1".into(),
            description: "fake defect".into(),
            suggested_fix: None,
        });
        deduction -= 1;
    }
    defects
}

/// Critic that walks a fixed sequence of quality scores, one per call,
/// holding at the last value once exhausted.
struct ScriptedCritic {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl ScriptedCritic {
    fn new(scores: Vec<f32>) -> Self {
        Self { scores, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedCritic {
    async fn generate(&self, _task: &TaskSpec) -> codeloop::Result<String> {
        unreachable!("critic role never generates")
    }

    async fn revise(&self, _current_code: &str, _feedback: &ReviewFeedback) -> codeloop::Result<String> {
        unreachable!("critic role never revises")
    }

    async fn critique(&self, _code: &str) -> codeloop::Result<CriticDraft> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.scores.len() - 1);
        let score = self.scores[idx];
        let deduction = (100.0 - score).round() as i32;
        Ok(CriticDraft {
            score_hint: score,
            defects: defects_for_deduction(deduction),
            suggestions: Vec::new(),
            required_changes: Vec::new(),
        })
    }

    async fn generate_tests(&self, _code: &str, _framework: &str, _coverage_target: Option<f32>) -> codeloop::Result<String> {
        unreachable!("critic role never generates tests")
    }
}

fn build_orchestrator(
    coder: Arc<dyn LanguageModelClient>,
    critic: Arc<dyn LanguageModelClient>,
    defaults: RunOptions,
) -> (Arc<Orchestrator>, Arc<dyn SessionStore>) {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let clock = Arc::new(FakeClock::new());
    let review_pipeline = Arc::new(ReviewPipeline::new(
        critic,
        Arc::new(NullTestExecutor),
        Arc::new(NullStaticAnalyzer),
        Arc::new(PolicyStore::new()),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        clock,
        coder,
        review_pipeline,
        LoopGuardConfig::default(),
        defaults,
    ));
    (orchestrator, store)
}

fn task_spec() -> TaskSpec {
    TaskSpec {
        description: "Implement a rate limiter with token buckets".to_string(),
        language: "rust".to_string(),
        constraints: Vec::new(),
        examples: Vec::new(),
        context_files: Vec::new(),
    }
}

#[tokio::test]
async fn converges_and_archives_when_the_first_review_clears_the_threshold() {
    let (orchestrator, _store) = build_orchestrator(
        Arc::new(DistinctCoder::new()),
        Arc::new(ScriptedCritic::new(vec![95.0])),
        RunOptions { max_iterations: Some(5), quality_threshold: Some(85.0), task_timeout_minutes: Some(60) },
    );

    let outcome = orchestrator.run("session-converge-1", task_spec(), RunOptions::default()).await.unwrap();
    assert!(matches!(outcome, OrchestratorOutcome::Archived { .. }));
}

#[tokio::test]
async fn escalates_once_max_iterations_is_reached() {
    // Alternating scores stay below threshold and avoid stagnation (delta 30 >= 2.0).
    let (orchestrator, _store) = build_orchestrator(
        Arc::new(DistinctCoder::new()),
        Arc::new(ScriptedCritic::new(vec![80.0, 50.0, 80.0, 50.0, 80.0, 50.0])),
        RunOptions { max_iterations: Some(2), quality_threshold: Some(99.0), task_timeout_minutes: Some(60) },
    );

    let outcome = orchestrator.run("session-max-iter", task_spec(), RunOptions::default()).await.unwrap();
    match outcome {
        OrchestratorOutcome::Escalated(msg) => assert_eq!(msg.reason, EscalationReason::MaxIterationsReached),
        _ => panic!("expected escalation"),
    }
}

#[tokio::test]
async fn escalates_on_repeated_identical_code_content() {
    // Scores swing well past the stagnation delta so Loop Guard's oscillation
    // predicate is the one that fires, on the repeated "fixed" revision.
    let (orchestrator, _store) = build_orchestrator(
        Arc::new(ConstantRevisionCoder),
        Arc::new(ScriptedCritic::new(vec![50.0, 80.0, 50.0])),
        RunOptions { max_iterations: Some(10), quality_threshold: Some(99.0), task_timeout_minutes: Some(60) },
    );

    let outcome = orchestrator.run("session-oscillate", task_spec(), RunOptions::default()).await.unwrap();
    match outcome {
        OrchestratorOutcome::Escalated(msg) => assert_eq!(msg.reason, EscalationReason::OscillationDetected),
        _ => panic!("expected escalation"),
    }
}

#[tokio::test]
async fn escalates_when_consecutive_scores_stop_moving() {
    let (orchestrator, _store) = build_orchestrator(
        Arc::new(DistinctCoder::new()),
        Arc::new(ScriptedCritic::new(vec![70.0, 71.0, 71.5])),
        RunOptions { max_iterations: Some(10), quality_threshold: Some(99.0), task_timeout_minutes: Some(60) },
    );

    let outcome = orchestrator.run("session-stagnate", task_spec(), RunOptions::default()).await.unwrap();
    match outcome {
        OrchestratorOutcome::Escalated(msg) => assert_eq!(msg.reason, EscalationReason::StagnationDetected),
        _ => panic!("expected escalation"),
    }
}

#[tokio::test]
async fn escalates_a_task_spec_that_fails_validation_before_touching_the_coder() {
    let (orchestrator, _store) = build_orchestrator(
        Arc::new(DistinctCoder::new()),
        Arc::new(ScriptedCritic::new(vec![95.0])),
        RunOptions::default(),
    );

    let bad_spec = TaskSpec {
        description: "too short".to_string(),
        language: "rust".to_string(),
        constraints: Vec::new(),
        examples: Vec::new(),
        context_files: Vec::new(),
    };

    let outcome = orchestrator.run("session-rejected", bad_spec, RunOptions::default()).await.unwrap();
    match outcome {
        OrchestratorOutcome::Escalated(msg) => {
            assert_eq!(msg.reason, EscalationReason::TaskRejected);
            assert!(msg.best_artifact.is_none());
        }
        _ => panic!("expected escalation"),
    }
}

#[tokio::test]
async fn two_sessions_run_concurrently_without_interfering() {
    let (orchestrator, store) = build_orchestrator(
        Arc::new(DistinctCoder::new()),
        Arc::new(ScriptedCritic::new(vec![95.0])),
        RunOptions { max_iterations: Some(5), quality_threshold: Some(85.0), task_timeout_minutes: Some(60) },
    );

    let (a, b) = tokio::join!(
        orchestrator.run("session-concurrent-a", task_spec(), RunOptions::default()),
        orchestrator.run("session-concurrent-b", task_spec(), RunOptions::default()),
    );

    assert!(matches!(a.unwrap(), OrchestratorOutcome::Archived { .. }));
    assert!(matches!(b.unwrap(), OrchestratorOutcome::Archived { .. }));

    let session_a = store.load("session-concurrent-a").await.unwrap().unwrap();
    let session_b = store.load("session-concurrent-b").await.unwrap().unwrap();
    assert_ne!(session_a.artifacts.first().unwrap().content, session_b.artifacts.first().unwrap().content);
}
