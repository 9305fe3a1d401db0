//! Progress events and the best-effort channel that carries them.
//!
//! The run loop sends one `progress` event per step. The research step adds
//! finer events while it works through a sub-question: `researching`, a
//! stream of `activity` events, `paper_complete` per processed paper and
//! `question_complete` at the end.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::error::ChannelError;
use crate::tools::truncate_chars;

use super::router::Node;
use super::state::{DocumentInfo, Status, WorkflowState};

/// Log lines carried by each progress event
pub(crate) const PROGRESS_LOG_TAIL: usize = 5;

/// Summary characters carried by completion and paper events
const DIGEST_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub title: String,
    pub arxiv_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDigest {
    pub title: String,
    pub arxiv_id: String,
    pub pdf_url: String,
    pub summary: String,
}

impl From<&DocumentInfo> for DocumentRef {
    fn from(doc: &DocumentInfo) -> Self {
        Self {
            title: doc.title.clone(),
            arxiv_id: doc.arxiv_id.clone(),
        }
    }
}

impl From<&DocumentInfo> for DocumentDigest {
    fn from(doc: &DocumentInfo) -> Self {
        Self {
            title: doc.title.clone(),
            arxiv_id: doc.arxiv_id.clone(),
            pdf_url: doc.pdf_url.clone(),
            summary: truncate_chars(&doc.summary, DIGEST_SUMMARY_CHARS).to_string(),
        }
    }
}

/// What the research step is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchActivity {
    Searching,
    FoundPapers,
    NoPapers,
    Downloading,
    Reading,
    Summarizing,
    Storing,
    Error,
}

/// Events pushed to a streaming client, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        session_id: String,
        message: String,
    },
    Progress {
        node: Node,
        step: usize,
        status: Status,
        plan: Vec<String>,
        current_task_index: usize,
        documents: Vec<DocumentRef>,
        logs: Vec<String>,
    },
    Researching {
        question_index: usize,
        question: String,
        total_questions: usize,
    },
    Activity {
        action: ResearchActivity,
        message: String,
        /// The question or paper title the activity refers to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        papers: Vec<DocumentRef>,
    },
    PaperComplete {
        title: String,
        arxiv_id: String,
        summary: String,
    },
    QuestionComplete {
        question_index: usize,
        next_index: usize,
        is_complete: bool,
        documents_found: usize,
    },
    Completed {
        session_id: String,
        report: Option<String>,
        documents: Vec<DocumentDigest>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn progress(node: Node, step: usize, state: &WorkflowState) -> Self {
        ProgressEvent::Progress {
            node,
            step,
            status: state.status,
            plan: state.plan.clone(),
            current_task_index: state.current_task_index,
            documents: state.documents.iter().map(DocumentRef::from).collect(),
            logs: state.recent_logs(PROGRESS_LOG_TAIL).to_vec(),
        }
    }

    pub fn activity(
        action: ResearchActivity,
        message: impl Into<String>,
        detail: Option<&str>,
    ) -> Self {
        ProgressEvent::Activity {
            action,
            message: message.into(),
            detail: detail.map(|d| truncate_chars(d, 60).to_string()),
            papers: Vec::new(),
        }
    }

    pub fn paper_complete(doc: &DocumentInfo) -> Self {
        let digest = DocumentDigest::from(doc);
        ProgressEvent::PaperComplete {
            title: digest.title,
            arxiv_id: digest.arxiv_id,
            summary: digest.summary,
        }
    }

    pub fn completed(state: &WorkflowState) -> Self {
        ProgressEvent::Completed {
            session_id: state.session_id.clone(),
            report: state.report().map(str::to_string),
            documents: state.documents.iter().map(DocumentDigest::from).collect(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }
}

/// Transport for progress events (a WebSocket, stdout, a test buffer).
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(&self, event: &ProgressEvent) -> Result<(), ChannelError>;
}

/// Best-effort sender bound to one session.
pub struct ProgressNotifier {
    session_id: String,
    channel: Arc<dyn PushChannel>,
    alive: AtomicBool,
}

impl ProgressNotifier {
    pub fn new(session_id: impl Into<String>, channel: Arc<dyn PushChannel>) -> Self {
        Self {
            session_id: session_id.into(),
            channel,
            alive: AtomicBool::new(true),
        }
    }

    /// Deliver an event. Never fails: returns `false` if the event was not
    /// delivered. After the first failure no further sends are attempted.
    pub async fn send(&self, event: &ProgressEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.channel.send(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "client disconnected");
                self.alive.store(false, Ordering::Release);
                false
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
