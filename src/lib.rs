pub mod collaborators;
pub mod config;
pub mod errors;
pub mod loop_guard;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod policy_store;
pub mod review_pipeline;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod transport;

pub use collaborators::{
    AgentType, Clock, CollaboratorTimeouts, LanguageModelClient, NullLanguageModelClient, NullMetricsSink,
    NullStaticAnalyzer, NullTestExecutor, ProviderConfig, RandomSource, StaticAnalyzer, SystemClock,
    SystemRandomSource, TestExecutor,
};
pub use config::Config;
pub use errors::{OrchestratorError, Result};
pub use loop_guard::{LoopGuard, LoopGuardConfig, StopReason};
pub use metrics::MetricsRegistry;
pub use models::{
    Artifact, ArtifactKind, AvailableAction, CriticDraft, Defect, DefectSeverity, EscalationMessage,
    EscalationReason, PolicyCategory, PolicyRule, PolicySeverity, PolicyViolation, Recommendation, ReviewFeedback,
    SessionState, SessionStatus, TaskSpec,
};
pub use orchestrator::{Orchestrator, OrchestratorOutcome, RunOptions};
pub use policy_store::PolicyStore;
pub use review_pipeline::{ReviewDepth, ReviewPipeline};
pub use state_machine::transition;
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
pub use transport::{CodeloopServer, RequestLifecycle};
