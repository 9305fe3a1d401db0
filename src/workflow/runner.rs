//! # Run Loop
//!
//! Drives route → execute → merge → persist → notify, either one step per
//! request ([`WorkflowRunner::start`], [`WorkflowRunner::advance`]) or until
//! the router ends the session ([`WorkflowRunner::run_streaming`]).
//!
//! The loop has two output ports. The session store must accept every write
//! or the loop aborts with [`WorkflowError::Persist`]. The push channel is
//! best effort: the first failed send marks the client as gone and later
//! events are dropped while the steps keep running.
//!
//! Steps of one session never overlap: each driver holds the session's lock
//! from read to write. After the first write a session is only updated in
//! place, so a session deleted mid-run stays deleted and the run stops.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::session::SessionStore;

use super::progress::{ProgressEvent, ProgressNotifier, PushChannel};
use super::router::{route, Node, Route};
use super::state::{StateUpdate, Status, WorkflowState};
use super::{Workflow, WorkflowSettings};

pub struct WorkflowRunner {
    workflow: Arc<Workflow>,
    store: Arc<dyn SessionStore>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowRunner {
    pub fn new(workflow: Arc<Workflow>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            workflow,
            store,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn settings(&self) -> &WorkflowSettings {
        self.workflow.settings()
    }

    /// Create a session and run its first step (planning).
    pub async fn start(&self, query: &str) -> Result<WorkflowState, WorkflowError> {
        let mut state = WorkflowState::new(Uuid::new_v4().to_string(), query);
        info!(session_id = %state.session_id, query = %query, "Starting research session");
        let _guard = self.lock_session(&state.session_id).await;

        self.step(&mut state, None).await;
        self.create(&state).await?;
        Ok(state)
    }

    /// Run the next step of a stored session. Terminal sessions come back
    /// unchanged; unknown sessions, and sessions deleted while the step
    /// ran, yield `None`.
    pub async fn advance(&self, session_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        let _guard = self.lock_session(session_id).await;

        let Some(mut state) = self.store.get(session_id).await? else {
            self.session_locks.lock().await.remove(session_id);
            return Ok(None);
        };

        if state.is_terminal() {
            return Ok(Some(state));
        }

        self.step(&mut state, None).await;
        if !self.save(&state).await? {
            info!(session_id = %session_id, "Session deleted during step, result dropped");
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Delete a session. A run in progress on it stops at its next write.
    pub async fn delete(&self, session_id: &str) -> Result<bool, WorkflowError> {
        let removed = self.store.delete(session_id).await?;
        self.session_locks.lock().await.remove(session_id);
        Ok(removed)
    }

    /// Run a new session to the end, pushing progress as it goes.
    ///
    /// Emits `started`, one `progress` per step (research steps add their
    /// own finer events), then `completed` or `error`. The returned state is
    /// also in the store.
    pub async fn run_streaming(
        &self,
        query: &str,
        channel: Arc<dyn PushChannel>,
    ) -> Result<WorkflowState, WorkflowError> {
        let mut state = WorkflowState::new(Uuid::new_v4().to_string(), query);
        let notifier = ProgressNotifier::new(state.session_id.clone(), channel);
        info!(session_id = %state.session_id, query = %query, "Starting streaming research session");
        let _guard = self.lock_session(&state.session_id).await;

        notifier
            .send(&ProgressEvent::Started {
                session_id: state.session_id.clone(),
                message: "Research session started".to_string(),
            })
            .await;

        let result = self.drive(&mut state, &notifier).await;

        let final_event = match &result {
            Err(e) => ProgressEvent::error(e.to_string()),
            Ok(()) if state.status == Status::Error => ProgressEvent::error(
                state
                    .error
                    .clone()
                    .unwrap_or_else(|| "Research failed".to_string()),
            ),
            Ok(()) => ProgressEvent::completed(&state),
        };
        notifier.send(&final_event).await;

        result.map(|()| state)
    }

    async fn drive(
        &self,
        state: &mut WorkflowState,
        notifier: &ProgressNotifier,
    ) -> Result<(), WorkflowError> {
        self.create(state).await?;

        while let Some(node) = self.step(state, Some(notifier)).await {
            self.save_or_stop(state).await?;
            notifier
                .send(&ProgressEvent::progress(node, state.steps_taken, state))
                .await;
            tokio::time::sleep(self.settings().progress_delay).await;
        }

        // Covers the step-limit failure, which runs no node
        self.save_or_stop(state).await?;
        info!(
            session_id = %state.session_id,
            status = %state.status,
            steps = state.steps_taken,
            "Research session finished"
        );
        Ok(())
    }

    /// Route and run one node, folding its update into `state`. Returns the
    /// node that ran, or `None` if the session is over.
    async fn step(
        &self,
        state: &mut WorkflowState,
        progress: Option<&ProgressNotifier>,
    ) -> Option<Node> {
        let Route::Next(node) = route(state) else {
            return None;
        };

        let max_steps = self.settings().max_steps;
        if state.steps_taken >= max_steps {
            let message = format!("step limit of {} exceeded", max_steps);
            warn!(session_id = %state.session_id, max_steps, "Step limit reached");
            state.apply_update(StateUpdate::failed(message.clone(), message));
            return None;
        }

        info!(session_id = %state.session_id, node = %node, step = state.steps_taken + 1, "Running step");

        let outcome = AssertUnwindSafe(self.workflow.execute_with_progress(node, state, progress))
            .catch_unwind()
            .await;
        let update = match outcome {
            Ok(update) => update,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(session_id = %state.session_id, node = %node, reason = %reason, "Step panicked");
                StateUpdate::failed(
                    format!("{} step failed: {}", node, reason),
                    format!("{} step failed: {}", node, reason),
                )
            }
        };

        if update.is_empty() {
            warn!(session_id = %state.session_id, node = %node, "Step produced no changes");
        } else {
            debug!(session_id = %state.session_id, node = %node, fields = ?update.fields(), "Merging update");
        }
        state.apply_update(update);
        state.steps_taken += 1;
        Some(node)
    }

    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .session_locks
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// First write of a new session.
    async fn create(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        self.store
            .put(state)
            .await
            .map_err(|source| WorkflowError::Persist {
                session_id: state.session_id.clone(),
                source,
            })
    }

    /// Write an existing session back. `false` if it has been deleted.
    async fn save(&self, state: &WorkflowState) -> Result<bool, WorkflowError> {
        self.store
            .update(state)
            .await
            .map_err(|source| WorkflowError::Persist {
                session_id: state.session_id.clone(),
                source,
            })
    }

    async fn save_or_stop(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        if self.save(state).await? {
            Ok(())
        } else {
            warn!(session_id = %state.session_id, "Session deleted, stopping run");
            Err(WorkflowError::SessionDeleted {
                session_id: state.session_id.clone(),
            })
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
