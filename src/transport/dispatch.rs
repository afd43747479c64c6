//! Request-lifecycle steps shared by every tool call: in-flight
//! accounting, authentication, rate limiting, validation, and metrics.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{Clock, MetricsSink};
use crate::errors::OrchestratorError;
use crate::services::auth::{AuthContext, Authenticator};
use crate::services::rate_limit::{RateLimitDecision, RateLimiter};
use crate::services::validator::{ToolSchema, Validator};

pub struct RequestLifecycle {
    pub authenticator: Authenticator,
    pub rate_limiter: RateLimiter,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
    in_flight: Arc<AtomicUsize>,
    shutting_down: Arc<AtomicBool>,
}

/// Decrements the in-flight counter on drop, covering early returns.
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
    metrics: Arc<dyn MetricsSink>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.set_gauge("in_flight_requests", &[], remaining as f64);
    }
}

impl RequestLifecycle {
    pub fn new(authenticator: Authenticator, rate_limiter: RateLimiter, metrics: Arc<dyn MetricsSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            authenticator,
            rate_limiter,
            metrics,
            clock,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Step 1: increment the in-flight counter; the returned guard
    /// decrements it on every exit path.
    pub fn begin_request(&self) -> Result<InFlightGuard, OrchestratorError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Forbidden("server is shutting down".to_string()));
        }
        let count = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_gauge("in_flight_requests", &[], count as f64);
        Ok(InFlightGuard { counter: self.in_flight.clone(), metrics: self.metrics.clone() })
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Step 2: authenticate. Reject unauthenticated requests for protected
    /// tools with a distinct `Unauthorized` failure.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext, OrchestratorError> {
        self.authenticator
            .authenticate(authorization)
            .map_err(|e| OrchestratorError::Unauthorized(e.to_string()))
    }

    /// Step 3: derive a rate-limit identifier (authenticated user id →
    /// hash of the authorization credential → client ip) and consume a token.
    pub fn check_rate_limit(&self, auth: &AuthContext, authorization: Option<&str>, client_ip: &str) -> Result<(), OrchestratorError> {
        let identifier = if auth.authenticated && auth.user_id != "anonymous" {
            auth.user_id.clone()
        } else if let Some(header) = authorization {
            format!("hdr:{:x}", md5_like_digest(header))
        } else {
            client_ip.to_string()
        };

        match self.rate_limiter.consume(&identifier, "http", self.clock.now_ms()) {
            RateLimitDecision::Allowed { .. } => Ok(()),
            RateLimitDecision::Denied { retry_after_seconds } => {
                Err(OrchestratorError::RateLimited { retry_after_seconds })
            }
        }
    }

    /// Step 4: validate `arguments` against the tool's schema.
    pub fn validate(&self, schema: &ToolSchema, arguments: &Value) -> Result<Value, OrchestratorError> {
        let outcome = Validator::validate(schema, arguments);
        if !outcome.valid {
            return Err(OrchestratorError::Validation(outcome.errors.join("; ")));
        }
        Ok(outcome.sanitized)
    }

    /// Step 6: record per-tool success/error metrics and duration.
    pub fn record(&self, tool_name: &str, outcome: &str, duration_ms: f64) {
        self.metrics.incr_counter("tool_calls_total", &[("tool", tool_name), ("outcome", outcome)]);
        self.metrics.observe_duration_ms("tool_call_duration_ms", &[("tool", tool_name)], duration_ms);
    }

    /// Graceful shutdown: refuse new work, spin-wait up to 30s for the
    /// in-flight counter to drain, logging every second. Idempotent.
    pub async fn shutdown(&self) {
        let already_shutting_down = self.shutting_down.swap(true, Ordering::SeqCst);
        if already_shutting_down {
            tracing::debug!("shutdown already in progress");
        }

        for elapsed_seconds in 0..30 {
            let remaining = self.in_flight_count();
            if remaining == 0 {
                break;
            }
            tracing::info!(remaining, elapsed_seconds, "waiting for in-flight requests to drain");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Cheap non-cryptographic digest used only to bucket rate-limit identifiers
/// derived from an opaque authorization header; not a security boundary.
fn md5_like_digest(input: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SystemClock;
    use crate::services::rate_limit::RateLimitConfig;

    fn lifecycle() -> RequestLifecycle {
        RequestLifecycle::new(
            Authenticator::disabled(),
            RateLimiter::new(RateLimitConfig::default()),
            Arc::new(crate::metrics::MetricsRegistry::new()),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn begin_request_tracks_in_flight_count() {
        let lifecycle = lifecycle();
        let guard = lifecycle.begin_request().unwrap();
        assert_eq!(lifecycle.in_flight_count(), 1);
        drop(guard);
        assert_eq!(lifecycle.in_flight_count(), 0);
    }

    #[test]
    fn disabled_auth_accepts_requests() {
        let lifecycle = lifecycle();
        assert!(lifecycle.authenticate(None).is_ok());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let lifecycle = lifecycle();
        lifecycle.shutdown().await;
        assert!(lifecycle.is_shutting_down());
        lifecycle.shutdown().await;
        assert!(lifecycle.is_shutting_down());
    }

    #[test]
    fn begin_request_rejected_once_shutting_down() {
        let lifecycle = lifecycle();
        lifecycle.shutting_down.store(true, Ordering::SeqCst);
        assert!(lifecycle.begin_request().is_err());
    }
}
