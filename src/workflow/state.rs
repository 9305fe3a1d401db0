//! Workflow state and the partial updates produced by each step
//!
//! Steps never mutate [`WorkflowState`] directly. They return a
//! [`StateUpdate`] which the run loop folds into the running copy with
//! [`WorkflowState::apply_update`]. How each field folds is fixed by
//! [`StateField::merge_rule`].

use serde::{Deserialize, Serialize};

/// User-facing phase indicator. Routing does not read it, except for `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Planning,
    Researching,
    Writing,
    Completed,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Researching => "researching",
            Self::Writing => "writing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processed paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: String,
    pub summary: String,
    pub pdf_url: String,
    pub arxiv_id: String,
    #[serde(default)]
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The record threaded through every step of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Assigned at creation, never changes
    pub session_id: String,
    /// The research goal, never changes
    pub original_query: String,
    /// Ordered sub-questions; empty until planning has run
    pub plan: Vec<String>,
    /// Cursor into `plan`, advanced once per research step
    pub current_task_index: usize,
    /// Processed papers, concatenated across research steps
    pub documents: Vec<DocumentInfo>,
    pub status: Status,
    /// Terminal once true
    pub is_complete: bool,
    pub error: Option<String>,
    /// Append-only audit trail
    pub logs: Vec<String>,
    /// The research goal as a user message, then the final report as an
    /// assistant message
    pub messages: Vec<ChatMessage>,
    /// Steps executed so far, checked against the per-session cap
    #[serde(default)]
    pub steps_taken: usize,
}

impl WorkflowState {
    /// Fresh state for a new session.
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            session_id: session_id.into(),
            messages: vec![ChatMessage::user(query.clone())],
            original_query: query,
            plan: Vec::new(),
            current_task_index: 0,
            documents: Vec::new(),
            status: Status::Planning,
            is_complete: false,
            error: None,
            logs: Vec::new(),
            steps_taken: 0,
        }
    }

    /// Fold a step's partial update into this state.
    pub fn apply_update(&mut self, update: StateUpdate) {
        if let Some(plan) = update.plan {
            merge_seq(StateField::Plan, &mut self.plan, plan);
        }
        if let Some(index) = update.current_task_index {
            self.current_task_index = index;
        }
        merge_seq(StateField::Documents, &mut self.documents, update.documents);
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(is_complete) = update.is_complete {
            self.is_complete = is_complete;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        merge_seq(StateField::Logs, &mut self.logs, update.logs);
        merge_seq(StateField::Messages, &mut self.messages, update.messages);
    }

    /// The final report, once the session is complete.
    pub fn report(&self) -> Option<&str> {
        if !self.is_complete {
            return None;
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// The most recent `n` log lines, oldest first.
    pub fn recent_logs(&self, n: usize) -> &[String] {
        let start = self.logs.len().saturating_sub(n);
        &self.logs[start..]
    }

    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.status == Status::Error
    }
}

// =============================================================================
// PARTIAL UPDATES
// =============================================================================

/// Fields a step may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    Plan,
    CurrentTaskIndex,
    Documents,
    Status,
    IsComplete,
    Error,
    Logs,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Incoming value overwrites the current one
    Replace,
    /// Incoming items are appended after the current ones
    Concatenate,
}

impl StateField {
    pub const ALL: [StateField; 8] = [
        StateField::Plan,
        StateField::CurrentTaskIndex,
        StateField::Documents,
        StateField::Status,
        StateField::IsComplete,
        StateField::Error,
        StateField::Logs,
        StateField::Messages,
    ];

    pub fn merge_rule(self) -> MergeRule {
        match self {
            StateField::Documents | StateField::Logs | StateField::Messages => {
                MergeRule::Concatenate
            }
            StateField::Plan
            | StateField::CurrentTaskIndex
            | StateField::Status
            | StateField::IsComplete
            | StateField::Error => MergeRule::Replace,
        }
    }
}

fn merge_seq<T>(field: StateField, current: &mut Vec<T>, incoming: Vec<T>) {
    match field.merge_rule() {
        MergeRule::Concatenate => current.extend(incoming),
        MergeRule::Replace => *current = incoming,
    }
}

/// Partial update returned by a step. Unset scalar fields leave the state
/// untouched; list fields merge per [`StateField::merge_rule`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,
}

impl StateUpdate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Terminal failure: `status = error` with the message recorded.
    pub fn failed(error: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Error),
            error: Some(error.into()),
            logs: vec![log.into()],
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    /// Fields this update sets.
    pub fn fields(&self) -> Vec<StateField> {
        StateField::ALL
            .into_iter()
            .filter(|field| match field {
                StateField::Plan => self.plan.is_some(),
                StateField::CurrentTaskIndex => self.current_task_index.is_some(),
                StateField::Documents => !self.documents.is_empty(),
                StateField::Status => self.status.is_some(),
                StateField::IsComplete => self.is_complete.is_some(),
                StateField::Error => self.error.is_some(),
                StateField::Logs => !self.logs.is_empty(),
                StateField::Messages => !self.messages.is_empty(),
            })
            .collect()
    }
}
