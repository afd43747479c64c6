pub mod auth;
pub mod cache;
pub mod rate_limit;
pub mod validator;

pub use auth::{AuthContext, Authenticator};
pub use cache::Cache;
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use validator::{Validator, ValidationOutcome};
