//! External collaborator interfaces (explicitly out of scope as concrete
//! implementations — these traits are the seam; callers supply real or fake
//! implementations).

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{CriticDraft, Defect, ReviewFeedback, TaskSpec};

/// Produces and critiques code on behalf of a Coder or Critic role.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn generate(&self, task: &TaskSpec) -> Result<String>;
    async fn revise(&self, current_code: &str, feedback: &ReviewFeedback) -> Result<String>;
    async fn critique(&self, code: &str) -> Result<CriticDraft>;
    /// Generates a test-suite artifact's content for `code` in the given
    /// test `framework`, targeting `coverage_target` if provided.
    async fn generate_tests(
        &self,
        code: &str,
        framework: &str,
        coverage_target: Option<f32>,
    ) -> Result<String>;
}

/// Identifies which role a `LanguageModelClient` endpoint serves, used by
/// `configure_endpoint`/`set_system_prompts` to target the right handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Coder,
    Critic,
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "coder" => Ok(Self::Coder),
            "critic" => Ok(Self::Critic),
            other => Err(format!("unknown agent_type '{other}'")),
        }
    }
}

/// Connection details for a `LanguageModelClient` endpoint, as accepted by
/// `configure_endpoint`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TestRunResult {
    pub coverage_percent: f32,
    pub failures: Vec<TestFailure>,
}

#[derive(Debug, Clone)]
pub struct TestFailure {
    pub name: String,
    pub location: String,
    pub error_message: String,
}

/// Runs a test suite against a code artifact in an isolated workspace.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn run(&self, code: &str, test_suite: &str) -> Result<TestRunResult>;
}

/// Runs a language-appropriate linter over a code artifact.
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn analyze(&self, code: &str, language: &str) -> Result<Vec<Defect>>;
}

/// Per-call timeouts for collaborator invocations (model, test executor,
/// static analyzer). Defaults match the documented budgets: 10 minutes for
/// the model, 5 for the test executor, 1 for static analysis.
#[derive(Debug, Clone, Copy)]
pub struct CollaboratorTimeouts {
    pub model_ms: u64,
    pub test_ms: u64,
    pub static_analysis_ms: u64,
}

impl Default for CollaboratorTimeouts {
    fn default() -> Self {
        Self { model_ms: 600_000, test_ms: 300_000, static_analysis_ms: 60_000 }
    }
}

/// Placeholder `LanguageModelClient` wired in until `configure_endpoint`
/// points the Coder/Critic handle at a real provider. Deterministic so the
/// system is runnable end-to-end without network access.
pub struct NullLanguageModelClient;

#[async_trait]
impl LanguageModelClient for NullLanguageModelClient {
    async fn generate(&self, task: &TaskSpec) -> Result<String> {
        Ok(format!("// {} (language: {})\n// no coder endpoint configured\n", task.description, task.language))
    }

    async fn revise(&self, current_code: &str, feedback: &ReviewFeedback) -> Result<String> {
        Ok(format!(
            "{current_code}\n// revision requested, {} required changes, no coder endpoint configured\n",
            feedback.required_changes.len()
        ))
    }

    async fn critique(&self, _code: &str) -> Result<CriticDraft> {
        Ok(CriticDraft {
            score_hint: 0.0,
            defects: Vec::new(),
            suggestions: Vec::new(),
            required_changes: Vec::new(),
        })
    }

    async fn generate_tests(&self, _code: &str, framework: &str, _coverage_target: Option<f32>) -> Result<String> {
        Ok(format!("// {framework} test suite placeholder, no coder endpoint configured\n"))
    }
}

/// Placeholder `TestExecutor`: reports no coverage and no failures.
pub struct NullTestExecutor;

#[async_trait]
impl TestExecutor for NullTestExecutor {
    async fn run(&self, _code: &str, _test_suite: &str) -> Result<TestRunResult> {
        Ok(TestRunResult { coverage_percent: 0.0, failures: Vec::new() })
    }
}

/// Placeholder `StaticAnalyzer`: reports no violations.
pub struct NullStaticAnalyzer;

#[async_trait]
impl StaticAnalyzer for NullStaticAnalyzer {
    async fn analyze(&self, _code: &str, _language: &str) -> Result<Vec<Defect>> {
        Ok(Vec::new())
    }
}

/// Wall-clock source, injected so tests can control time deterministically.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Source of randomness for id generation, injected for determinism in tests.
pub trait RandomSource: Send + Sync {
    fn next_token(&self) -> String;
}

pub struct SystemRandomSource;

impl RandomSource for SystemRandomSource {
    fn next_token(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Sink for counters/gauges/histograms. The concrete metrics backend is out
/// of scope; this trait is the seam the rest of the system emits through.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]);
    fn observe_duration_ms(&self, name: &str, labels: &[(&str, &str)], duration_ms: f64);
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

/// A no-op sink, also used as the default before a real backend is wired in.
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn incr_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}
    fn observe_duration_ms(&self, _name: &str, _labels: &[(&str, &str)], _duration_ms: f64) {}
    fn set_gauge(&self, _name: &str, _labels: &[(&str, &str)], _value: f64) {}
}
