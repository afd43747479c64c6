//! Tool-call surface: the twelve named tools, built on `rmcp`'s
//! `ToolRouter`/`#[tool_router]`/`#[tool]` macros, matching the pack's MCP
//! server idiom (`andrey-moor-plan-forge`'s `PlanForgeServer`).

use dashmap::DashMap;
use rmcp::{
    handler::server::router::tool::ToolRouter,
    model::{CallToolResult, Content, ErrorCode, ErrorData, Implementation, Role, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::collaborators::{AgentType, Clock, LanguageModelClient, ProviderConfig, StaticAnalyzer, TestExecutor};
use crate::models::{Artifact, ArtifactKind, PolicyCategory, ReviewFeedback, TaskSpec};
use crate::orchestrator::{Orchestrator, OrchestratorOutcome, RunOptions};
use crate::policy_store::PolicyStore;
use crate::review_pipeline::{ReviewDepth, ReviewPipeline};
use crate::services::validator::{FieldSchema, ToolSchema};
use crate::store::SessionStore;
use crate::transport::dispatch::RequestLifecycle;

// ============================================================================
// Tool parameter shapes
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpecInput {
    pub description: String,
    pub language: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub context_files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteTaskSpecParams {
    pub spec: TaskSpecInput,
    pub max_iterations: Option<u32>,
    pub quality_threshold: Option<f32>,
    /// Bearer/api-key credential for this call; required when authentication
    /// is enabled on the server.
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunCriticReviewParams {
    pub session_id: String,
    pub artifact_id: String,
    pub review_depth: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReviseCodeParams {
    pub session_id: String,
    pub feedback: String,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetRepoMapParams {
    pub repo_path: String,
    pub include_tests: Option<bool>,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetProjectStatusParams {
    pub session_id: String,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetProgressSummaryParams {
    pub session_id: String,
    pub verbosity: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FinalHandoffArchiveParams {
    pub session_id: String,
    pub include_audit: Option<bool>,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadOrgPoliciesParams {
    pub policy_type: String,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConfigureEndpointParams {
    pub agent_type: String,
    pub provider_config: ProviderConfig,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetSystemPromptsParams {
    pub agent_type: String,
    pub prompts: Vec<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GenerateTestSuiteParams {
    pub artifact_id: String,
    pub session_id: String,
    pub framework: String,
    pub coverage_target: Option<f32>,
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct InjectAlternativePatternParams {
    pub session_id: String,
    pub pattern: String,
    pub context: String,
    pub authorization: Option<String>,
}

// ============================================================================
// Server
// ============================================================================

#[derive(Clone)]
pub struct CodeloopServer {
    tool_router: ToolRouter<Self>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    orchestrator: Arc<Orchestrator>,
    review_pipeline: Arc<ReviewPipeline>,
    policy_store: Arc<PolicyStore>,
    test_executor: Arc<dyn TestExecutor>,
    static_analyzer: Arc<dyn StaticAnalyzer>,
    lifecycle: Arc<RequestLifecycle>,
    system_prompts: Arc<DashMap<AgentType, Vec<String>>>,
    pattern_hints: Arc<DashMap<String, Vec<String>>>,
}

impl CodeloopServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        orchestrator: Arc<Orchestrator>,
        review_pipeline: Arc<ReviewPipeline>,
        policy_store: Arc<PolicyStore>,
        test_executor: Arc<dyn TestExecutor>,
        static_analyzer: Arc<dyn StaticAnalyzer>,
        lifecycle: Arc<RequestLifecycle>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store,
            clock,
            orchestrator,
            review_pipeline,
            policy_store,
            test_executor,
            static_analyzer,
            lifecycle,
            system_prompts: Arc::new(DashMap::new()),
            pattern_hints: Arc::new(DashMap::new()),
        }
    }

    fn internal_error(message: impl std::fmt::Display) -> ErrorData {
        ErrorData::new(ErrorCode::INTERNAL_ERROR, message.to_string(), None)
    }

    fn invalid_params(message: impl std::fmt::Display) -> ErrorData {
        ErrorData::new(ErrorCode::INVALID_PARAMS, message.to_string(), None)
    }

    fn text_result(value: &Value) -> Result<CallToolResult, ErrorData> {
        let text = serde_json::to_string_pretty(value).map_err(Self::internal_error)?;
        Ok(CallToolResult::success(vec![Content::text(text).with_audience(vec![Role::Assistant])]))
    }

    /// Runs the shared request-lifecycle preamble: in-flight accounting,
    /// authentication, rate limiting, and schema validation (bounds,
    /// required-ness, injection sniffing) of `name`'s free-text fields.
    /// Result recording remains the caller's responsibility.
    fn enter(
        &self,
        name: &str,
        authorization: Option<&str>,
        text_fields: &[(&'static str, &str)],
    ) -> Result<crate::transport::dispatch::InFlightGuard, ErrorData> {
        let guard = self
            .lifecycle
            .begin_request()
            .map_err(|e| ErrorData::new(ErrorCode::INTERNAL_ERROR, e.to_string(), None))?;
        let auth = self
            .lifecycle
            .authenticate(authorization)
            .map_err(|e| ErrorData::new(ErrorCode::INVALID_PARAMS, e.to_string(), None))?;
        self.lifecycle
            .check_rate_limit(&auth, authorization, "local")
            .map_err(|e| ErrorData::new(ErrorCode::INVALID_PARAMS, e.to_string(), None))?;

        let schema = schema_for(name);
        if !schema.is_empty() {
            let arguments = Value::Object(
                text_fields.iter().map(|(field, value)| (field.to_string(), Value::String(value.to_string()))).collect(),
            );
            self.lifecycle
                .validate(&schema, &arguments)
                .map_err(|e| ErrorData::new(ErrorCode::INVALID_PARAMS, e.to_string(), None))?;
        }

        Ok(guard)
    }

    fn record(&self, tool_name: &str, start: Instant, success: bool) {
        self.lifecycle.record(tool_name, if success { "success" } else { "error" }, start.elapsed().as_secs_f64() * 1000.0);
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for CodeloopServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "codeloop".to_string(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                title: Some("Codeloop".to_string()),
                icons: None,
                website_url: None,
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Dual-agent iterative code-generation orchestrator. Drives a Coder/Critic \
                 refinement loop to convergence; escalates to the caller on stagnation, \
                 oscillation, or timeout."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[tool_router(router = tool_router)]
impl CodeloopServer {
    /// Start orchestration for a new task specification.
    #[tool(name = "execute_task_spec", description = "Start dual-agent orchestration for a task spec. Returns the new session id and its resulting status.")]
    pub async fn execute_task_spec(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<ExecuteTaskSpecParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter(
            "execute_task_spec",
            params.authorization.as_deref(),
            &[("description", &params.spec.description), ("language", &params.spec.language)],
        )?;

        let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
        let task_spec = TaskSpec {
            description: params.spec.description,
            language: params.spec.language,
            constraints: params.spec.constraints,
            examples: params.spec.examples,
            context_files: params.spec.context_files,
        };
        let options = RunOptions {
            max_iterations: params.max_iterations,
            quality_threshold: params.quality_threshold,
            task_timeout_minutes: None,
        };

        let result = self.orchestrator.run(&session_id, task_spec, options).await;
        self.record("execute_task_spec", start, result.is_ok());

        match result {
            Ok(OrchestratorOutcome::Archived { archive_id }) => {
                Self::text_result(&json!({ "session_id": session_id, "status": "converged", "archive_id": archive_id }))
            }
            Ok(OrchestratorOutcome::Escalated(escalation)) => {
                Self::text_result(&json!({ "session_id": session_id, "status": "escalated", "escalation": *escalation }))
            }
            Err(e) => Err(Self::internal_error(e)),
        }
    }

    /// Runs the review pipeline against a specific code artifact.
    #[tool(name = "run_critic_review", description = "Run the Critic review pipeline (critique, tests, static analysis, policy check, quality score) against a code artifact.")]
    pub async fn run_critic_review(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<RunCriticReviewParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter(
            "run_critic_review",
            params.authorization.as_deref(),
            &[("session_id", &params.session_id), ("artifact_id", &params.artifact_id)],
        )?;

        let mut session = self
            .store
            .load(&params.session_id)
            .await
            .map_err(Self::internal_error)?
            .ok_or_else(|| Self::invalid_params(format!("unknown session '{}'", params.session_id)))?;

        let code = session
            .artifacts
            .iter()
            .find(|a| a.id == params.artifact_id && a.kind == ArtifactKind::Code)
            .cloned()
            .ok_or_else(|| Self::invalid_params(format!("no code artifact '{}'", params.artifact_id)))?;

        let depth = match params.review_depth.as_deref() {
            Some("quick") => ReviewDepth::Quick,
            Some("comprehensive") => ReviewDepth::Comprehensive,
            _ => ReviewDepth::Standard,
        };

        let linked_suite = ReviewPipeline::find_linked_test_suite(&code, &session.artifacts).cloned();
        let now = self.clock.now_ms();

        let outcome = self
            .review_pipeline
            .review(
                &code,
                linked_suite.as_ref(),
                "rust",
                depth,
                session.current_iteration,
                session.max_iterations,
                session.quality_threshold,
                now,
                crate::models::artifact::new_artifact_id,
            )
            .await
            .map_err(Self::internal_error)?;

        session.artifacts.push(outcome.review_artifact.clone());
        session.last_quality_score = Some(outcome.feedback.quality_score);
        session.score_history.push(outcome.feedback.quality_score);
        self.store.persist(&session).await.map_err(Self::internal_error)?;

        self.record("run_critic_review", start, true);
        Self::text_result(&json!({
            "review_id": outcome.review_artifact.id,
            "quality_score": outcome.feedback.quality_score,
            "defects": outcome.all_defects,
            "test_coverage": outcome.test_coverage,
            "policy_violations": outcome.policy_violations,
            "suggestions": outcome.feedback.suggestions,
            "recommendation": outcome.recommendation,
            "required_changes": outcome.feedback.required_changes,
        }))
    }

    /// Invokes the Coder to revise code based on free-text feedback.
    #[tool(name = "revise_code", description = "Invoke the Coder to revise the session's latest code artifact given feedback. Appends and returns the new code artifact.")]
    pub async fn revise_code(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<ReviseCodeParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter(
            "revise_code",
            params.authorization.as_deref(),
            &[("session_id", &params.session_id), ("feedback", &params.feedback)],
        )?;

        let mut session = self
            .store
            .load(&params.session_id)
            .await
            .map_err(Self::internal_error)?
            .ok_or_else(|| Self::invalid_params(format!("unknown session '{}'", params.session_id)))?;

        let code = session
            .code_artifacts()
            .next_back()
            .cloned()
            .ok_or_else(|| Self::invalid_params("session has no code artifact yet"))?;

        let feedback = ReviewFeedback {
            quality_score: session.last_quality_score.unwrap_or(0.0),
            defects: Vec::new(),
            suggestions: Vec::new(),
            required_changes: vec![params.feedback],
        };

        let revised = self
            .orchestrator
            .revise_standalone(&code.content, &feedback)
            .await
            .map_err(Self::internal_error)?;

        let now = self.clock.now_ms();
        let artifact = Artifact::new(crate::models::artifact::new_artifact_id(), ArtifactKind::Code, "manually revised code", now, revised)
            .with_metadata("originating_artifact_id", code.id.clone());
        session.artifacts.push(artifact.clone());
        self.store.persist(&session).await.map_err(Self::internal_error)?;

        self.record("revise_code", start, true);
        Self::text_result(&json!({ "artifact": artifact }))
    }

    /// Returns a hierarchical map of a repository's files.
    #[tool(name = "get_repo_map", description = "Return a hierarchical file listing for repo_path, with total file count and an estimated token count.")]
    pub async fn get_repo_map(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<GetRepoMapParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("get_repo_map", params.authorization.as_deref(), &[("repo_path", &params.repo_path)])?;

        crate::services::validator::Validator::sanitize_path(&params.repo_path).map_err(Self::invalid_params)?;

        let include_tests = params.include_tests.unwrap_or(true);
        let root = std::path::PathBuf::from(&params.repo_path);
        let (structure, total_files, total_bytes) = walk_repo(&root, include_tests).map_err(Self::internal_error)?;

        self.record("get_repo_map", start, true);
        Self::text_result(&json!({
            "structure": structure,
            "total_files": total_files,
            "total_tokens_estimated": total_bytes / 4,
        }))
    }

    /// Returns the current snapshot of a session.
    #[tool(name = "get_project_status", description = "Return the current state-machine snapshot for a session.")]
    pub async fn get_project_status(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<GetProjectStatusParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("get_project_status", params.authorization.as_deref(), &[("session_id", &params.session_id)])?;

        let session = self
            .store
            .load(&params.session_id)
            .await
            .map_err(Self::internal_error)?
            .ok_or_else(|| Self::invalid_params(format!("unknown session '{}'", params.session_id)))?;

        let now = self.clock.now_ms();
        self.record("get_project_status", start, true);
        Self::text_result(&json!({
            "session_id": session.session_id,
            "state": session.state,
            "current_iteration": session.current_iteration,
            "max_iterations": session.max_iterations,
            "quality_threshold": session.quality_threshold,
            "last_quality_score": session.last_quality_score,
            "elapsed_time_ms": session.elapsed_time_ms(now),
            "artifact_count": session.artifacts.len(),
        }))
    }

    /// Returns a progress summary including the convergence trend.
    #[tool(name = "get_progress_summary", description = "Return iteration/score history and the computed convergence trend for a session.")]
    pub async fn get_progress_summary(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<GetProgressSummaryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("get_progress_summary", params.authorization.as_deref(), &[("session_id", &params.session_id)])?;

        let session = self
            .store
            .load(&params.session_id)
            .await
            .map_err(Self::internal_error)?
            .ok_or_else(|| Self::invalid_params(format!("unknown session '{}'", params.session_id)))?;

        let trend = convergence_trend(&session.score_history, 2, 2.0);

        self.record("get_progress_summary", start, true);
        Self::text_result(&json!({
            "iterations_completed": session.current_iteration,
            "quality_scores": session.score_history,
            "time_per_iteration_ms": session.time_per_iteration_ms,
            "current_state": session.state,
            "convergence_trend": trend,
            "verbosity": params.verbosity.unwrap_or_else(|| "summary".to_string()),
        }))
    }

    /// Produces a final handoff archive for a converged (or any) session.
    #[tool(name = "final_handoff_archive", description = "Produce an archive id, final artifact, linked test suite, final score, and iteration count for a session.")]
    pub async fn final_handoff_archive(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<FinalHandoffArchiveParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("final_handoff_archive", params.authorization.as_deref(), &[("session_id", &params.session_id)])?;

        let session = self
            .store
            .load(&params.session_id)
            .await
            .map_err(Self::internal_error)?
            .ok_or_else(|| Self::invalid_params(format!("unknown session '{}'", params.session_id)))?;

        let final_artifact = session
            .code_artifacts()
            .next_back()
            .cloned()
            .ok_or_else(|| Self::invalid_params("session has no code artifact"))?;

        let test_suite = session
            .artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::TestSuite)
            .next_back()
            .cloned();

        let archive_id = format!("archive-{}", uuid::Uuid::new_v4().simple());
        let include_audit = params.include_audit.unwrap_or(false);
        let audit_trail = include_audit.then(|| session.artifacts.clone());

        self.record("final_handoff_archive", start, true);
        Self::text_result(&json!({
            "archive_id": archive_id,
            "final_artifact": final_artifact,
            "test_suite": test_suite,
            "final_score": session.last_quality_score,
            "iteration_count": session.current_iteration,
            "audit_trail": audit_trail,
        }))
    }

    /// Returns the active rule set for one policy type.
    #[tool(name = "read_org_policies", description = "Return the active PolicyRule set for a policy_type (style, security, custom); source is 'file' or 'default'.")]
    pub async fn read_org_policies(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<ReadOrgPoliciesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("read_org_policies", params.authorization.as_deref(), &[("policy_type", &params.policy_type)])?;

        let category: PolicyCategory = params.policy_type.parse().map_err(Self::invalid_params)?;
        let (rules, source) = self.policy_store.rules_for(category).map_err(Self::internal_error)?;

        self.record("read_org_policies", start, true);
        Self::text_result(&json!({ "rules": rules, "source": source }))
    }

    /// Swaps the Coder or Critic endpoint and runs a health check.
    #[tool(name = "configure_endpoint", description = "Swap the Coder or Critic LanguageModelClient provider and run a health check against it.")]
    pub async fn configure_endpoint(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<ConfigureEndpointParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("configure_endpoint", params.authorization.as_deref(), &[("agent_type", &params.agent_type)])?;

        let agent_type: AgentType = params.agent_type.parse().map_err(Self::invalid_params)?;
        // The concrete network client for a provider is an external collaborator;
        // this records the configuration and confirms the seam is live with a
        // placeholder client until a real implementation is injected.
        let client: Arc<dyn LanguageModelClient> = Arc::new(crate::collaborators::NullLanguageModelClient);
        match agent_type {
            AgentType::Coder => self.orchestrator.set_coder(client.clone()),
            AgentType::Critic => self.review_pipeline.set_critic(client.clone()),
        }
        let healthy = client.critique("// health check").await.is_ok();

        self.record("configure_endpoint", start, healthy);
        Self::text_result(&json!({
            "agent_type": agent_type,
            "provider_config": params.provider_config,
            "healthy": healthy,
        }))
    }

    /// Updates the prompt templates recorded for an agent type.
    #[tool(name = "set_system_prompts", description = "Update the stored prompt templates for the Coder or Critic agent type.")]
    pub async fn set_system_prompts(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<SetSystemPromptsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter("set_system_prompts", params.authorization.as_deref(), &[("agent_type", &params.agent_type)])?;

        let agent_type: AgentType = params.agent_type.parse().map_err(Self::invalid_params)?;
        self.system_prompts.insert(agent_type, params.prompts.clone());

        self.record("set_system_prompts", start, true);
        Self::text_result(&json!({ "agent_type": agent_type, "prompt_count": params.prompts.len() }))
    }

    /// Generates a test-suite artifact for an existing code artifact.
    #[tool(name = "generate_test_suite", description = "Generate a test_suite artifact for a code artifact, targeting a coverage_target if given.")]
    pub async fn generate_test_suite(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<GenerateTestSuiteParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter(
            "generate_test_suite",
            params.authorization.as_deref(),
            &[("session_id", &params.session_id), ("artifact_id", &params.artifact_id), ("framework", &params.framework)],
        )?;

        let mut session = self
            .store
            .load(&params.session_id)
            .await
            .map_err(Self::internal_error)?
            .ok_or_else(|| Self::invalid_params(format!("unknown session '{}'", params.session_id)))?;

        let code = session
            .artifacts
            .iter()
            .find(|a| a.id == params.artifact_id && a.kind == ArtifactKind::Code)
            .cloned()
            .ok_or_else(|| Self::invalid_params(format!("no code artifact '{}'", params.artifact_id)))?;

        let content = self
            .orchestrator
            .generate_tests_standalone(&code.content, &params.framework, params.coverage_target)
            .await
            .map_err(Self::internal_error)?;

        let now = self.clock.now_ms();
        let artifact = Artifact::new(crate::models::artifact::new_artifact_id(), ArtifactKind::TestSuite, "generated test suite", now, content)
            .with_metadata("code_artifact_id", code.id.clone())
            .with_metadata("framework", params.framework);
        session.artifacts.push(artifact.clone());
        self.store.persist(&session).await.map_err(Self::internal_error)?;

        self.record("generate_test_suite", start, true);
        Self::text_result(&json!({ "artifact": artifact }))
    }

    /// Appends a pattern hint for subsequent revisions of a session.
    #[tool(name = "inject_alternative_pattern", description = "Append a pattern hint to a session, to be considered by subsequent Coder revisions.")]
    pub async fn inject_alternative_pattern(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<InjectAlternativePatternParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let params = params.0;
        let _guard = self.enter(
            "inject_alternative_pattern",
            params.authorization.as_deref(),
            &[("session_id", &params.session_id), ("pattern", &params.pattern), ("context", &params.context)],
        )?;

        let hint = format!("{}: {}", params.pattern, params.context);
        self.pattern_hints.entry(params.session_id.clone()).or_default().push(hint.clone());

        self.record("inject_alternative_pattern", start, true);
        Self::text_result(&json!({ "session_id": params.session_id, "hint": hint }))
    }
}

/// Per-tool schemas for the free-text fields `enter` validates: required-ness,
/// length bounds, and injection sniffing. Tools with no free-text fields (or
/// whose fields are already constrained types, e.g. bools/enums parsed
/// elsewhere) return an empty schema and skip validation.
fn schema_for(name: &str) -> ToolSchema {
    let mut schema = ToolSchema::new();
    match name {
        "execute_task_spec" => {
            schema.insert("description", FieldSchema::required().with_bounds(10, 50_000));
            schema.insert("language", FieldSchema::required().with_bounds(1, 64));
        }
        "run_critic_review" => {
            schema.insert("session_id", FieldSchema::required());
            schema.insert("artifact_id", FieldSchema::required());
        }
        "revise_code" => {
            schema.insert("session_id", FieldSchema::required());
            schema.insert("feedback", FieldSchema::required().with_bounds(1, 20_000));
        }
        "get_repo_map" => {
            schema.insert("repo_path", FieldSchema::required());
        }
        "get_project_status" => {
            schema.insert("session_id", FieldSchema::required());
        }
        "get_progress_summary" => {
            schema.insert("session_id", FieldSchema::required());
        }
        "final_handoff_archive" => {
            schema.insert("session_id", FieldSchema::required());
        }
        "read_org_policies" => {
            schema.insert("policy_type", FieldSchema::required());
        }
        "configure_endpoint" => {
            schema.insert("agent_type", FieldSchema::required());
        }
        "set_system_prompts" => {
            schema.insert("agent_type", FieldSchema::required());
        }
        "generate_test_suite" => {
            schema.insert("session_id", FieldSchema::required());
            schema.insert("artifact_id", FieldSchema::required());
            schema.insert("framework", FieldSchema::required().with_bounds(1, 128));
        }
        "inject_alternative_pattern" => {
            schema.insert("session_id", FieldSchema::required());
            schema.insert("pattern", FieldSchema::required().with_bounds(1, 2_000));
            schema.insert("context", FieldSchema::required().with_bounds(1, 20_000));
        }
        _ => {}
    }
    schema
}

/// Walks `root`, returning a hierarchical `{name, children|size}` tree plus
/// total file count and total byte count (used for the token estimate).
fn walk_repo(root: &std::path::Path, include_tests: bool) -> std::io::Result<(Value, usize, usize)> {
    let mut total_files = 0usize;
    let mut total_bytes = 0usize;
    let structure = walk_entry(root, include_tests, &mut total_files, &mut total_bytes)?;
    Ok((structure, total_files, total_bytes))
}

fn walk_entry(path: &std::path::Path, include_tests: bool, total_files: &mut usize, total_bytes: &mut usize) -> std::io::Result<Value> {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| path.to_string_lossy().to_string());

    if path.is_dir() {
        let mut children = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(path)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let child_path = entry.path();
            let is_test_path = child_path.to_string_lossy().contains("test");
            if is_test_path && !include_tests {
                continue;
            }
            children.push(walk_entry(&child_path, include_tests, total_files, total_bytes)?);
        }
        Ok(json!({ "name": name, "children": children }))
    } else {
        let size = std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0);
        *total_files += 1;
        *total_bytes += size;
        Ok(json!({ "name": name, "size": size }))
    }
}

/// Convergence trend derived from `score_history`.
fn convergence_trend(score_history: &[f32], stagnation_window: usize, stagnation_threshold: f32) -> &'static str {
    if score_history.len() < stagnation_window + 1 {
        return "insufficient_data";
    }

    let recent = &score_history[score_history.len() - stagnation_window - 1..];
    let deltas: Vec<f32> = recent.windows(2).map(|w| w[1] - w[0]).collect();

    if deltas.iter().all(|d| d.abs() < stagnation_threshold) {
        return "stagnant";
    }

    if deltas.len() >= 2 {
        let last = deltas[deltas.len() - 1];
        let prev = deltas[deltas.len() - 2];
        if last != 0.0 && prev != 0.0 && last.signum() != prev.signum() {
            return "oscillating";
        }
    }

    let overall = recent.last().unwrap() - recent.first().unwrap();
    if overall > 0.0 {
        "improving"
    } else {
        "stagnant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_history_reports_insufficient_data() {
        assert_eq!(convergence_trend(&[70.0], 2, 2.0), "insufficient_data");
    }

    #[test]
    fn small_deltas_report_stagnant() {
        assert_eq!(convergence_trend(&[80.0, 81.0, 80.5], 2, 2.0), "stagnant");
    }

    #[test]
    fn alternating_deltas_report_oscillating() {
        assert_eq!(convergence_trend(&[80.0, 90.0, 75.0], 2, 2.0), "oscillating");
    }

    #[test]
    fn rising_scores_report_improving() {
        assert_eq!(convergence_trend(&[60.0, 70.0, 85.0], 2, 2.0), "improving");
    }

    #[test]
    fn execute_task_spec_schema_rejects_short_description() {
        let schema = schema_for("execute_task_spec");
        let outcome = crate::services::validator::Validator::validate(
            &schema,
            &json!({ "description": "too short", "language": "rust" }),
        );
        assert!(!outcome.valid);
    }

    #[test]
    fn revise_code_schema_rejects_sql_injection_in_feedback() {
        let schema = schema_for("revise_code");
        let outcome = crate::services::validator::Validator::validate(
            &schema,
            &json!({ "session_id": "session-abc", "feedback": "x'; DROP TABLE users; --" }),
        );
        assert!(!outcome.valid);
    }

    #[test]
    fn unknown_tool_name_yields_empty_schema() {
        assert!(schema_for("no_such_tool").is_empty());
    }
}
