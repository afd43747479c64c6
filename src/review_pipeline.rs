//! Review Pipeline: critic call, test execution, static analysis, policy
//! check, defect union, quality score, recommendation.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collaborators::{CollaboratorTimeouts, LanguageModelClient, StaticAnalyzer, TestExecutor, TestRunResult};
use crate::errors::{OrchestratorError, Result};
use crate::models::{
    Artifact, ArtifactKind, Defect, DefectSeverity, PolicyViolation, Recommendation, ReviewFeedback,
};
use crate::policy_store::PolicyStore;

static DESTRUCTIVE_FILE_OPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)rm\s+-rf\s+/(?:\s|"|'|$)|remove_dir_all\s*\(\s*"/"\s*\)|shutil\.rmtree\s*\(\s*['"]/['"]"#).unwrap()
});
static SQL_DESTRUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)drop\s+(table|database)\s|truncate\s+table\s").unwrap());
static DYNAMIC_EXEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\beval\s*\(|\bexec\s*\(|Command::new\s*\(\s*"sh""#).unwrap());
static SHELL_INJECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)sh\s+-c\s+"|os\.system\s*\(|subprocess\.\w+\([^)]*shell\s*=\s*True"#).unwrap()
});

/// Scan generated code for destructive-file-op, SQL-destruction,
/// dynamic-code-execution, and shell-injection patterns. Returns the
/// matched category, not the offending text.
fn scan_dangerous_output(code: &str) -> Option<&'static str> {
    if DESTRUCTIVE_FILE_OPS.is_match(code) {
        return Some("destructive file operation");
    }
    if SQL_DESTRUCTION.is_match(code) {
        return Some("sql destruction statement");
    }
    if DYNAMIC_EXEC.is_match(code) {
        return Some("dynamic code execution");
    }
    if SHELL_INJECTION.is_match(code) {
        return Some("shell injection risk");
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDepth {
    Quick,
    Standard,
    Comprehensive,
}

pub struct ReviewOutcome {
    pub feedback: ReviewFeedback,
    pub test_coverage: Option<f32>,
    pub test_defects: Vec<Defect>,
    pub all_defects: Vec<Defect>,
    pub policy_violations: Vec<PolicyViolation>,
    pub recommendation: Recommendation,
    pub review_artifact: Artifact,
    /// Set when the code artifact matched a dangerous-output heuristic;
    /// the caller escalates immediately rather than acting on `recommendation`.
    pub dangerous_output: Option<&'static str>,
}

pub struct ReviewPipeline {
    critic: RwLock<Arc<dyn LanguageModelClient>>,
    test_executor: Arc<dyn TestExecutor>,
    static_analyzer: Arc<dyn StaticAnalyzer>,
    policy_store: Arc<PolicyStore>,
    timeouts: CollaboratorTimeouts,
}

impl ReviewPipeline {
    pub fn new(
        critic: Arc<dyn LanguageModelClient>,
        test_executor: Arc<dyn TestExecutor>,
        static_analyzer: Arc<dyn StaticAnalyzer>,
        policy_store: Arc<PolicyStore>,
    ) -> Self {
        Self {
            critic: RwLock::new(critic),
            test_executor,
            static_analyzer,
            policy_store,
            timeouts: CollaboratorTimeouts::default(),
        }
    }

    /// Override the default per-call timeouts (`execute_task_spec`'s
    /// configured budgets rather than the 10m/5m/1m defaults).
    pub fn with_timeouts(mut self, timeouts: CollaboratorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Swap the Critic endpoint (`configure_endpoint`, agent_type = "critic").
    pub fn set_critic(&self, critic: Arc<dyn LanguageModelClient>) {
        *self.critic.write() = critic;
    }

    fn critic(&self) -> Arc<dyn LanguageModelClient> {
        self.critic.read().clone()
    }

    /// Run the full pipeline for one code artifact.
    ///
    /// `linked_test_suite` is the test-suite artifact selected by the caller, if
    /// any was found by the caller.
    pub async fn review(
        &self,
        code: &Artifact,
        linked_test_suite: Option<&Artifact>,
        language: &str,
        review_depth: ReviewDepth,
        current_iteration: u32,
        max_iterations: u32,
        quality_threshold: f32,
        now_ms: i64,
        new_artifact_id: impl FnOnce() -> String,
    ) -> Result<ReviewOutcome> {
        let dangerous_output = scan_dangerous_output(&code.content);

        let draft = tokio::time::timeout(
            std::time::Duration::from_millis(self.timeouts.model_ms),
            self.critic().critique(&code.content),
        )
        .await
        .map_err(|_| OrchestratorError::ExternalTimeout("critic review".to_string()))??;

        let (test_coverage, test_defects) = match linked_test_suite {
            Some(suite) => {
                let run = match tokio::time::timeout(
                    std::time::Duration::from_millis(self.timeouts.test_ms),
                    self.test_executor.run(&code.content, &suite.content),
                )
                .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        tracing::warn!("test executor timed out, treating as no coverage");
                        TestRunResult { coverage_percent: 0.0, failures: Vec::new() }
                    }
                };
                let defects = run
                    .failures
                    .iter()
                    .map(|f| Defect {
                        severity: DefectSeverity::Major,
                        category: "test_failure".to_string(),
                        location: f.location.clone(),
                        description: format!("Test failed: {}", f.name),
                        suggested_fix: Some(format!("Fix: {}", f.error_message)),
                    })
                    .collect();
                (Some(run.coverage_percent), defects)
            }
            None => (None, Vec::new()),
        };

        let static_defects = match tokio::time::timeout(
            std::time::Duration::from_millis(self.timeouts.static_analysis_ms),
            self.static_analyzer.analyze(&code.content, language),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("static analyzer timed out, treating as no violations");
                Vec::new()
            }
        };
        let policy_violations = self.policy_store.check_all(&code.content)?;

        let mut all_defects = Vec::with_capacity(
            draft.defects.len() + test_defects.len() + static_defects.len(),
        );
        all_defects.extend(draft.defects.clone());
        all_defects.extend(test_defects.clone());
        all_defects.extend(static_defects);

        let quality_score = compute_quality_score(&all_defects, &policy_violations, test_coverage);

        let recommendation = if quality_score >= quality_threshold {
            Recommendation::Approve
        } else if current_iteration < max_iterations {
            Recommendation::Revise
        } else {
            Recommendation::Escalate
        };

        let feedback = ReviewFeedback {
            quality_score,
            defects: all_defects.clone(),
            suggestions: draft.suggestions.clone(),
            required_changes: draft.required_changes.clone(),
        };

        let review_artifact = build_review_artifact(
            new_artifact_id(),
            &feedback,
            test_coverage,
            &test_defects,
            &all_defects,
            &policy_violations,
            review_depth,
            code.id.clone(),
            now_ms,
        )?;

        Ok(ReviewOutcome {
            feedback,
            test_coverage,
            test_defects,
            all_defects,
            policy_violations,
            recommendation,
            review_artifact,
            dangerous_output,
        })
    }

    /// Find the test-suite artifact linked to a code artifact.
    pub fn find_linked_test_suite<'a>(code: &Artifact, artifacts: &'a [Artifact]) -> Option<&'a Artifact> {
        artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::TestSuite)
            .find(|a| a.metadata.get("code_artifact_id").map(String::as_str) == Some(code.id.as_str()))
            .or_else(|| {
                artifacts
                    .iter()
                    .filter(|a| a.kind == ArtifactKind::TestSuite && a.timestamp_ms > code.timestamp_ms)
                    .max_by_key(|a| a.timestamp_ms)
            })
    }
}

/// Quality score computation.
pub fn compute_quality_score(
    defects: &[Defect],
    policy_violations: &[PolicyViolation],
    coverage: Option<f32>,
) -> f32 {
    let mut score: f32 = 100.0;

    for defect in defects {
        score -= defect.severity.deduction();
    }

    score -= 5.0 * policy_violations.len() as f32;

    if let Some(coverage) = coverage {
        if coverage < 80.0 {
            score -= (80.0 - coverage) / 5.0;
        } else {
            score += (coverage - 80.0) / 10.0;
        }
    }

    score.clamp(0.0, 100.0).round()
}

#[allow(clippy::too_many_arguments)]
fn build_review_artifact(
    id: String,
    feedback: &ReviewFeedback,
    test_coverage: Option<f32>,
    test_defects: &[Defect],
    all_defects: &[Defect],
    policy_violations: &[PolicyViolation],
    review_depth: ReviewDepth,
    code_artifact_id: String,
    now_ms: i64,
) -> Result<Artifact> {
    #[derive(Serialize)]
    struct ReviewContent<'a> {
        feedback: &'a ReviewFeedback,
        test_coverage: Option<f32>,
        test_defects: &'a [Defect],
        all_defects: &'a [Defect],
    }

    let content = serde_json::to_string(&ReviewContent {
        feedback,
        test_coverage,
        test_defects,
        all_defects,
    })
    .map_err(|e| crate::errors::OrchestratorError::Internal(e.to_string()))?;

    let mut artifact = Artifact::new(id, ArtifactKind::Review, "review feedback", now_ms, content)
        .with_metadata("quality_score", feedback.quality_score.to_string())
        .with_metadata("review_depth", format!("{review_depth:?}").to_lowercase())
        .with_metadata("code_artifact_id", code_artifact_id)
        .with_metadata(
            "policy_violations",
            serde_json::to_string(policy_violations).unwrap_or_default(),
        );
    if let Some(coverage) = test_coverage {
        artifact = artifact.with_metadata("test_coverage", coverage.to_string());
    }
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicySeverity;

    fn defect(severity: DefectSeverity) -> Defect {
        Defect {
            severity,
            category: "test".into(),
            location: "src/lib.rs:1".into(),
            description: "test".into(),
            suggested_fix: None,
        }
    }

    #[test]
    fn no_defects_full_coverage_scores_above_100_clamped() {
        let score = compute_quality_score(&[], &[], Some(100.0));
        assert_eq!(score, 100.0);
    }

    #[test]
    fn scenario_a_coverage_bonus_clamped_at_100() {
        let score = compute_quality_score(&[], &[], Some(90.0));
        assert_eq!(score, 100.0);
    }

    #[test]
    fn scenario_b_one_critical_defect_scores_75() {
        let score = compute_quality_score(&[defect(DefectSeverity::Critical)], &[], None);
        assert_eq!(score, 75.0);
    }

    #[test]
    fn policy_violation_deducts_flat_five() {
        let violation = PolicyViolation {
            rule_id: "R-1".into(),
            description: "x".into(),
            severity: PolicySeverity::Warning,
        };
        let score = compute_quality_score(&[], &[violation], None);
        assert_eq!(score, 95.0);
    }

    #[test]
    fn low_coverage_deducts_proportionally() {
        let score = compute_quality_score(&[], &[], Some(50.0));
        assert_eq!(score, 94.0); // 100 - (80-50)/5 = 100 - 6
    }

    #[test]
    fn score_never_goes_below_zero() {
        let defects: Vec<Defect> = (0..10).map(|_| defect(DefectSeverity::Critical)).collect();
        let score = compute_quality_score(&defects, &[], None);
        assert_eq!(score, 0.0);
    }
}
