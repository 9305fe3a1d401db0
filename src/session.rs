//! Session store: the durable sink for workflow state, keyed by session id.
//!
//! Every write replaces the whole entry. `put` creates, `update` only
//! overwrites a session that still exists, so a deletion is never undone by a
//! late write. The in-memory implementation keeps sessions for the lifetime
//! of the process only.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::workflow::{Status, WorkflowState};

/// Length of the query preview in session listings
const QUERY_PREVIEW_CHARS: usize = 50;

/// One row of the session listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: Status,
    pub query: String,
}

impl SessionSummary {
    fn from_state(state: &WorkflowState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            status: state.status,
            query: state.original_query.chars().take(QUERY_PREVIEW_CHARS).collect(),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the full state under its session id.
    async fn put(&self, state: &WorkflowState) -> Result<(), StoreError>;

    /// Replace the state of an existing session. Returns `false` and writes
    /// nothing when the session has been deleted.
    async fn update(&self, state: &WorkflowState) -> Result<bool, StoreError>;

    async fn get(&self, session_id: &str) -> Result<Option<WorkflowState>, StoreError>;

    /// Returns `false` when the session did not exist.
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, WorkflowState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, state: &WorkflowState) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(state.session_id.clone(), state.clone());
        debug!(session_id = %state.session_id, status = ?state.status, "Session persisted");
        Ok(())
    }

    async fn update(&self, state: &WorkflowState) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&state.session_id) {
            Some(slot) => {
                *slot = state.clone();
                debug!(session_id = %state.session_id, status = ?state.status, "Session updated");
                Ok(true)
            }
            None => {
                debug!(session_id = %state.session_id, "Session gone, update dropped");
                Ok(false)
            }
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Deleted session");
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> =
            sessions.values().map(SessionSummary::from_state).collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_replaces_whole_entry() {
        let store = InMemorySessionStore::new();
        let mut state = WorkflowState::new("s1", "graph neural networks");
        store.put(&state).await.unwrap();

        state.plan = vec!["What is a GNN?".to_string()];
        state.status = Status::Researching;
        store.put(&state).await.unwrap();

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.plan, state.plan);
        assert_eq!(loaded.status, Status::Researching);
    }

    #[tokio::test]
    async fn test_get_missing_session() {
        let store = InMemorySessionStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemorySessionStore::new();
        store.put(&WorkflowState::new("s1", "q")).await.unwrap();

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_does_not_recreate_deleted_session() {
        let store = InMemorySessionStore::new();
        let mut state = WorkflowState::new("s1", "q");
        store.put(&state).await.unwrap();

        state.status = Status::Researching;
        assert!(store.update(&state).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap().unwrap().status, Status::Researching);

        store.delete("s1").await.unwrap();
        state.status = Status::Writing;
        assert!(!store.update(&state).await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_truncates_query() {
        let store = InMemorySessionStore::new();
        let long_query = "x".repeat(80);
        store.put(&WorkflowState::new("b", &long_query)).await.unwrap();
        store.put(&WorkflowState::new("a", "short")).await.unwrap();

        let listing = store.list().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].session_id, "a");
        assert_eq!(listing[0].status, Status::Planning);
        assert_eq!(listing[1].query.len(), 50);
    }
}
