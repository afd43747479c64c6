pub mod escalation;
pub mod run;

pub use run::{Orchestrator, OrchestratorOutcome, RunOptions};
