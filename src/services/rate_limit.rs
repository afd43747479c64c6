//! Token-bucket rate limiter, per identifier per namespace.
//!
//! Grounded in the pack's multi-tier limiter shape (`tundra`'s
//! `MultiKeyRateLimiter`), simplified to the single identifier/namespace
//! granularity the contract calls for.

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 900_000,
            max_requests: 100,
        }
    }
}

struct Bucket {
    window_start_ms: i64,
    count: u32,
}

pub enum RateLimitDecision {
    Allowed { remaining: u32, reset_ms: i64 },
    Denied { retry_after_seconds: u64 },
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<(String, String), Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Consume one token for `identifier` in `namespace`.
    pub fn consume(&self, identifier: &str, namespace: &str, now_ms: i64) -> RateLimitDecision {
        let key = (identifier.to_string(), namespace.to_string());
        let mut entry = self.buckets.entry(key).or_insert_with(|| Bucket {
            window_start_ms: now_ms,
            count: 0,
        });

        if now_ms - entry.window_start_ms >= self.config.window_ms {
            entry.window_start_ms = now_ms;
            entry.count = 0;
        }

        let reset_ms = entry.window_start_ms + self.config.window_ms;

        if entry.count >= self.config.max_requests {
            let retry_after_seconds = ((reset_ms - now_ms).max(1_000) / 1_000) as u64;
            return RateLimitDecision::Denied { retry_after_seconds };
        }

        entry.count += 1;
        let remaining = self.config.max_requests.saturating_sub(entry.count);
        RateLimitDecision::Allowed { remaining, reset_ms }
    }

    /// Sweep entries whose window has fully elapsed plus a grace period;
    /// intended to run every 60 seconds on a background task.
    pub fn sweep(&self, now_ms: i64) {
        self.buckets
            .retain(|_, bucket| now_ms - bucket.window_start_ms < self.config.window_ms * 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_max() {
        let limiter = RateLimiter::new(RateLimitConfig { window_ms: 60_000, max_requests: 2 });
        assert!(matches!(limiter.consume("user-1", "http", 0), RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.consume("user-1", "http", 0), RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.consume("user-1", "http", 0), RateLimitDecision::Denied { .. }));
    }

    #[test]
    fn denied_decision_has_positive_retry_after() {
        let limiter = RateLimiter::new(RateLimitConfig { window_ms: 60_000, max_requests: 1 });
        limiter.consume("user-1", "http", 0);
        match limiter.consume("user-1", "http", 0) {
            RateLimitDecision::Denied { retry_after_seconds } => assert!(retry_after_seconds > 0),
            _ => panic!("expected denial"),
        }
    }

    #[test]
    fn window_reset_restores_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig { window_ms: 1_000, max_requests: 1 });
        limiter.consume("user-1", "http", 0);
        assert!(matches!(limiter.consume("user-1", "http", 2_000), RateLimitDecision::Allowed { .. }));
    }

    #[test]
    fn namespaces_are_isolated() {
        let limiter = RateLimiter::new(RateLimitConfig { window_ms: 60_000, max_requests: 1 });
        limiter.consume("user-1", "http", 0);
        assert!(matches!(limiter.consume("user-1", "tool", 0), RateLimitDecision::Allowed { .. }));
    }
}
