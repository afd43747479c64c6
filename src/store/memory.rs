//! In-memory Session Store, for tests and ephemeral deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::{OrchestratorError, Result};
use crate::models::{Artifact, SessionState};

use super::SessionStore;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session_id: &str, session: SessionState) -> Result<()> {
        if self.sessions.contains_key(session_id) {
            return Err(OrchestratorError::Validation(format!(
                "session '{session_id}' already exists"
            )));
        }
        self.sessions.insert(session_id.to_string(), session);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions.get(session_id).map(|s| s.clone()))
    }

    async fn persist(&self, session: &SessionState) -> Result<()> {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn append_artifact(&self, session_id: &str, artifact: Artifact) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("session '{session_id}'")))?;
        entry.artifacts.push(artifact);
        entry.artifacts.sort_by_key(|a| a.timestamp_ms);
        Ok(())
    }

    async fn list(&self, page_limit: usize, page_offset: usize) -> Result<Vec<SessionState>> {
        let mut all: Vec<SessionState> = self.sessions.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| std::cmp::Reverse(s.start_time_ms));
        Ok(all.into_iter().skip(page_offset).take(page_limit).collect())
    }

    async fn evict_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        use crate::models::SessionStatus::{Converged, Escalated, Failed};
        let to_remove: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| {
                matches!(e.value().state, Converged | Escalated | Failed)
                    && e.value().start_time_ms < cutoff_ms
            })
            .map(|e| e.key().clone())
            .collect();
        let count = to_remove.len();
        for key in to_remove {
            self.sessions.remove(&key);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let store = InMemorySessionStore::new();
        let session = SessionState::new("session-abc123defg", 5, 85.0, 30, 0);
        store.create("session-abc123defg", session.clone()).await.unwrap();

        let loaded = store.load("session-abc123defg").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, session.session_id);
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let store = InMemorySessionStore::new();
        let session = SessionState::new("session-abc123defg", 5, 85.0, 30, 0);
        store.create("session-abc123defg", session.clone()).await.unwrap();
        assert!(store.create("session-abc123defg", session).await.is_err());
    }
}
