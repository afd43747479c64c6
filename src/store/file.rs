//! File-backed Session Store: one JSON snapshot per session under a root
//! directory, written atomically (write `.tmp`, then rename) in the manner
//! the teacher's `orchestration_state.rs::save` uses for its own state file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::errors::{OrchestratorError, Result};
use crate::models::{Artifact, SessionState, SCHEMA_VERSION};

use super::SessionStore;

pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }

    async fn write_atomic(&self, session: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))?;

        let path = self.path_for(&session.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        with_retry(|| async {
            fs::write(&tmp_path, &json)
                .await
                .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))?;
            fs::rename(&tmp_path, &path)
                .await
                .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))
        })
        .await
    }

    async fn read_one(path: &Path) -> Result<SessionState> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))?;
        let mut raw: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        migrate(&mut raw);
        serde_json::from_value(raw).map_err(|e| OrchestratorError::Internal(e.to_string()))
    }
}

/// Bring an on-disk snapshot up to `SCHEMA_VERSION`. There is currently only
/// one schema version, so this is a no-op placeholder for future migrations.
fn migrate(raw: &mut serde_json::Value) {
    if let Some(obj) = raw.as_object_mut() {
        let version = obj.get("schema_version").and_then(|v| v.as_u64()).unwrap_or(0);
        if version < SCHEMA_VERSION as u64 {
            obj.insert("schema_version".to_string(), SCHEMA_VERSION.into());
        }
    }
}

/// Exponential backoff retry for persistence transient errors:
/// initial 1s, cap 10s, max 3 attempts.
async fn with_retry<F, Fut>(mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut delay = Duration::from_secs(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < 3 => {
                tracing::warn!(attempt, error = %e, "persistence write failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session_id: &str, session: SessionState) -> Result<()> {
        if self.path_for(session_id).exists() {
            return Err(OrchestratorError::Validation(format!(
                "session '{session_id}' already exists"
            )));
        }
        self.write_atomic(&session).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_one(&path).await?))
    }

    async fn persist(&self, session: &SessionState) -> Result<()> {
        self.write_atomic(session).await
    }

    async fn append_artifact(&self, session_id: &str, artifact: Artifact) -> Result<()> {
        let mut session = self
            .load(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("session '{session_id}'")))?;
        session.artifacts.push(artifact);
        session.artifacts.sort_by_key(|a| a.timestamp_ms);
        self.write_atomic(&session).await
    }

    async fn list(&self, page_limit: usize, page_offset: usize) -> Result<Vec<SessionState>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))?;
        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                sessions.push(Self::read_one(&path).await?);
            }
        }
        sessions.sort_by_key(|s| std::cmp::Reverse(s.start_time_ms));
        Ok(sessions.into_iter().skip(page_offset).take(page_limit).collect())
    }

    async fn evict_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        use crate::models::SessionStatus::{Converged, Escalated, Failed};
        let all = self.list(usize::MAX, 0).await?;
        let mut count = 0;
        for session in all {
            if matches!(session.state, Converged | Escalated | Failed)
                && session.start_time_ms < cutoff_ms
            {
                let path = self.path_for(&session.session_id);
                fs::remove_file(&path)
                    .await
                    .map_err(|e| OrchestratorError::StorageUnavailable(e.to_string()))?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        let session = SessionState::new("session-abc123defg", 5, 85.0, 30, 0);
        store.create("session-abc123defg", session.clone()).await.unwrap();

        let loaded = store.load("session-abc123defg").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.max_iterations, session.max_iterations);
    }

    #[tokio::test]
    async fn load_missing_session_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.load("session-does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evict_removes_only_terminal_sessions_past_cutoff() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());

        let mut old_done = SessionState::new("session-old-done-0001", 5, 85.0, 30, 0);
        old_done.state = crate::models::SessionStatus::Converged;
        store.create("session-old-done-0001", old_done).await.unwrap();

        let active = SessionState::new("session-active-0000001", 5, 85.0, 30, 0);
        store.create("session-active-0000001", active).await.unwrap();

        let evicted = store.evict_older_than(1000).await.unwrap();
        assert_eq!(evicted, 1);
        assert!(store.load("session-active-0000001").await.unwrap().is_some());
    }
}
