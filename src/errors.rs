//! Error taxonomy shared by every component.
//!
//! Kinds map directly onto the ones clients are expected to branch on; the
//! `Display` text is safe to hand back verbatim (no stack traces, no internal
//! paths). Full detail goes to `tracing::error!` at the call site instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("external call timed out: {0}")]
    ExternalTimeout(String),

    #[error("dangerous output detected: {0}")]
    DangerousOutput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Short machine-stable tag, used in metrics labels and diagnostic payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ExternalTimeout(_) => "external_timeout",
            Self::DangerousOutput(_) => "dangerous_output",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
