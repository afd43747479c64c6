pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{Artifact, SessionState};

/// Durable mapping from session-id to `SessionState`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session_id: &str, session: SessionState) -> Result<()>;
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;
    async fn persist(&self, session: &SessionState) -> Result<()>;
    async fn append_artifact(&self, session_id: &str, artifact: Artifact) -> Result<()>;
    async fn list(&self, page_limit: usize, page_offset: usize) -> Result<Vec<SessionState>>;
    async fn evict_older_than(&self, cutoff_ms: i64) -> Result<usize>;
}

pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;
