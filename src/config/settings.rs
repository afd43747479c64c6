//! Layered configuration: YAML file, then `CODELOOP_*` environment overrides.
//!
//! Grounded in the teacher's `CliConfig::load_with_env`/`apply_env_overrides`
//! idiom, retargeted to this domain's settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub policy_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub shared_key: Option<String>,
    #[serde(default)]
    pub jwt_signing_key: Option<String>,
    #[serde(default = "default_jwt_expiry_seconds")]
    pub jwt_expiry_seconds: u64,
}

fn default_jwt_expiry_seconds() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: i64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,
}

fn default_rate_limit_window_ms() -> i64 {
    900_000
}

fn default_rate_limit_max_requests() -> u32 {
    100
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: default_rate_limit_window_ms(),
            max_requests: default_rate_limit_max_requests(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_ttl_seconds() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    1_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
            capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationSettings {
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    #[serde(default = "default_task_timeout_minutes")]
    pub default_task_timeout_minutes: u32,
    #[serde(default = "default_model_timeout_seconds")]
    pub model_timeout_seconds: u64,
    #[serde(default = "default_test_timeout_seconds")]
    pub test_timeout_seconds: u64,
    #[serde(default = "default_static_analysis_timeout_seconds")]
    pub static_analysis_timeout_seconds: u64,
}

fn default_quality_threshold() -> f32 {
    85.0
}

fn default_max_iterations() -> u32 {
    5
}

fn default_task_timeout_minutes() -> u32 {
    60
}

fn default_model_timeout_seconds() -> u64 {
    600
}

fn default_test_timeout_seconds() -> u64 {
    300
}

fn default_static_analysis_timeout_seconds() -> u64 {
    60
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            default_max_iterations: default_max_iterations(),
            default_task_timeout_minutes: default_task_timeout_minutes(),
            model_timeout_seconds: default_model_timeout_seconds(),
            test_timeout_seconds: default_test_timeout_seconds(),
            static_analysis_timeout_seconds: default_static_analysis_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "file://.codeloop/sessions".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            rate_limit: RateLimitSettings::default(),
            cache: CacheSettings::default(),
            orchestration: OrchestrationSettings::default(),
            transport: TransportSettings::default(),
            storage: StorageSettings::default(),
            policy_file: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Apply `CODELOOP_*` environment variable overrides.
    ///
    /// Supported variables: `CODELOOP_AUTH_ENABLED`, `CODELOOP_SHARED_KEY`,
    /// `CODELOOP_JWT_SIGNING_KEY`, `CODELOOP_JWT_EXPIRY_SECONDS`,
    /// `CODELOOP_ALLOWED_ORIGINS` (comma-separated), `CODELOOP_METRICS_PORT`,
    /// `CODELOOP_RATE_LIMIT_WINDOW_MS`, `CODELOOP_RATE_LIMIT_MAX_REQUESTS`,
    /// `CODELOOP_CACHE_TTL_SECONDS`, `CODELOOP_CACHE_CAPACITY`,
    /// `CODELOOP_DATABASE_URL`, `CODELOOP_QUALITY_THRESHOLD`,
    /// `CODELOOP_MAX_ITERATIONS`, `CODELOOP_TASK_TIMEOUT_MINUTES`,
    /// `CODELOOP_MODEL_TIMEOUT_SECONDS`, `CODELOOP_TEST_TIMEOUT_SECONDS`,
    /// `CODELOOP_STATIC_ANALYSIS_TIMEOUT_SECONDS`, `CODELOOP_POLICY_FILE`.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("CODELOOP_AUTH_ENABLED") {
            self.auth.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(val) = std::env::var("CODELOOP_SHARED_KEY") {
            self.auth.shared_key = Some(val);
        }
        if let Ok(val) = std::env::var("CODELOOP_JWT_SIGNING_KEY") {
            self.auth.jwt_signing_key = Some(val);
        }
        if let Ok(val) = std::env::var("CODELOOP_JWT_EXPIRY_SECONDS")
            && let Ok(seconds) = val.parse()
        {
            self.auth.jwt_expiry_seconds = seconds;
        }
        if let Ok(val) = std::env::var("CODELOOP_ALLOWED_ORIGINS") {
            self.transport.allowed_origins = val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = std::env::var("CODELOOP_METRICS_PORT")
            && let Ok(port) = val.parse()
        {
            self.transport.metrics_port = port;
        }
        if let Ok(val) = std::env::var("CODELOOP_RATE_LIMIT_WINDOW_MS")
            && let Ok(ms) = val.parse()
        {
            self.rate_limit.window_ms = ms;
        }
        if let Ok(val) = std::env::var("CODELOOP_RATE_LIMIT_MAX_REQUESTS")
            && let Ok(max) = val.parse()
        {
            self.rate_limit.max_requests = max;
        }
        if let Ok(val) = std::env::var("CODELOOP_CACHE_TTL_SECONDS")
            && let Ok(seconds) = val.parse()
        {
            self.cache.ttl_seconds = seconds;
        }
        if let Ok(val) = std::env::var("CODELOOP_CACHE_CAPACITY")
            && let Ok(cap) = val.parse()
        {
            self.cache.capacity = cap;
        }
        if let Ok(val) = std::env::var("CODELOOP_DATABASE_URL") {
            self.storage.database_url = val;
        }
        if let Ok(val) = std::env::var("CODELOOP_QUALITY_THRESHOLD")
            && let Ok(threshold) = val.parse::<f32>()
        {
            self.orchestration.quality_threshold = threshold.clamp(0.0, 100.0);
        }
        if let Ok(val) = std::env::var("CODELOOP_MAX_ITERATIONS")
            && let Ok(max) = val.parse()
        {
            self.orchestration.default_max_iterations = max;
        }
        if let Ok(val) = std::env::var("CODELOOP_TASK_TIMEOUT_MINUTES")
            && let Ok(minutes) = val.parse()
        {
            self.orchestration.default_task_timeout_minutes = minutes;
        }
        if let Ok(val) = std::env::var("CODELOOP_MODEL_TIMEOUT_SECONDS")
            && let Ok(seconds) = val.parse()
        {
            self.orchestration.model_timeout_seconds = seconds;
        }
        if let Ok(val) = std::env::var("CODELOOP_TEST_TIMEOUT_SECONDS")
            && let Ok(seconds) = val.parse()
        {
            self.orchestration.test_timeout_seconds = seconds;
        }
        if let Ok(val) = std::env::var("CODELOOP_STATIC_ANALYSIS_TIMEOUT_SECONDS")
            && let Ok(seconds) = val.parse()
        {
            self.orchestration.static_analysis_timeout_seconds = seconds;
        }
        if let Ok(val) = std::env::var("CODELOOP_POLICY_FILE") {
            self.policy_file = Some(PathBuf::from(val));
        }

        self
    }

    /// Priority: env vars > config file > defaults.
    pub fn load_with_env(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        Self::load_or_default(path).map(|c| c.apply_env_overrides())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = Config::default();
        assert!(!config.auth.enabled);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.orchestration.quality_threshold, 85.0);
    }

    #[test]
    fn env_override_parses_quality_threshold() {
        // SAFETY: test-local env var, not read concurrently elsewhere in this process.
        unsafe {
            std::env::set_var("CODELOOP_QUALITY_THRESHOLD", "92.5");
        }
        let config = Config::default().apply_env_overrides();
        assert_eq!(config.orchestration.quality_threshold, 92.5);
        unsafe {
            std::env::remove_var("CODELOOP_QUALITY_THRESHOLD");
        }
    }
}
