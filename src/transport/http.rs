//! Metrics/health HTTP surface, run as a second listener alongside the
//! tool-call transport. `/metrics` is public; `/health` and `/ready` are
//! authenticated and backed by the shared `RequestLifecycle`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::MetricsRegistry;
use crate::services::cache::Cache;
use crate::store::SessionStore;
use crate::transport::dispatch::RequestLifecycle;

#[derive(Clone)]
pub struct HttpState {
    pub metrics: Arc<MetricsRegistry>,
    pub lifecycle: Arc<RequestLifecycle>,
    pub store: Arc<dyn SessionStore>,
    pub health_cache: Arc<Cache>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.render())
}

fn bearer_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn health_handler(State(state): State<HttpState>, headers: HeaderMap) -> impl IntoResponse {
    let authorization = bearer_from(&headers);
    let auth = match state.lifecycle.authenticate(authorization.as_deref()) {
        Ok(auth) => auth,
        Err(_) => return (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
    };
    if state
        .lifecycle
        .check_rate_limit(&auth, authorization.as_deref(), "http")
        .is_err()
    {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string());
    }

    let now = state.lifecycle.clock.now_ms();
    let in_flight = state.lifecycle.in_flight_count();
    let body = state
        .health_cache
        .get_or_set("health", Duration::from_secs(30), now, || async move {
            format!("{{\"status\":\"ok\",\"in_flight_requests\":{in_flight}}}")
        })
        .await;
    (StatusCode::OK, body)
}

async fn ready_handler(State(state): State<HttpState>, headers: HeaderMap) -> impl IntoResponse {
    let authorization = bearer_from(&headers);
    let auth = match state.lifecycle.authenticate(authorization.as_deref()) {
        Ok(auth) => auth,
        Err(_) => return (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
    };
    if state
        .lifecycle
        .check_rate_limit(&auth, authorization.as_deref(), "http")
        .is_err()
    {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string());
    }

    if state.lifecycle.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down".to_string());
    }

    match state.store.list(1, 0).await {
        Ok(_) => (StatusCode::OK, "{\"status\":\"ready\"}".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("{{\"status\":\"not_ready\",\"reason\":\"{e}\"}}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SystemClock;
    use crate::services::auth::Authenticator;
    use crate::services::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::store::InMemorySessionStore;

    fn state() -> HttpState {
        let metrics = Arc::new(MetricsRegistry::new());
        HttpState {
            metrics: metrics.clone(),
            lifecycle: Arc::new(RequestLifecycle::new(
                Authenticator::disabled(),
                RateLimiter::new(RateLimitConfig::default()),
                metrics,
                Arc::new(SystemClock),
            )),
            store: Arc::new(InMemorySessionStore::new()),
            health_cache: Arc::new(Cache::new(10)),
        }
    }

    #[tokio::test]
    async fn health_handler_reports_ok_when_auth_disabled() {
        let (status, body) = health_handler(State(state()), HeaderMap::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn ready_handler_reports_ready_against_an_empty_store() {
        let (status, body) = ready_handler(State(state()), HeaderMap::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ready\""));
    }
}
