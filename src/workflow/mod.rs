//! # Research Workflow
//!
//! A plan-and-execute state machine:
//!
//! ```text
//! planner ──► researcher ──► researcher ... ──► writer ──► end
//!    │            │                               │
//!    └── error ───┴──────────── end ◄─────────────┘
//! ```
//!
//! [`route`] picks the next [`Node`] from the state, [`Workflow::execute`]
//! runs it and returns a [`StateUpdate`], and the [`WorkflowRunner`] folds
//! the update into the state, persists it, and reports progress.

use std::sync::Arc;
use std::time::Duration;

use crate::llm::CompletionService;
use crate::tools::{PaperSearch, PdfPipeline};
use crate::vector::VectorIndex;

pub mod planner;
pub mod progress;
pub mod prompts;
pub mod researcher;
pub mod router;
pub mod runner;
pub mod state;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use router::{route, Node, Route};
pub use progress::{
    DocumentDigest, DocumentRef, ProgressEvent, ProgressNotifier, PushChannel, ResearchActivity,
};
pub use runner::WorkflowRunner;
pub use state::{ChatMessage, DocumentInfo, Role, StateUpdate, Status, WorkflowState};

/// Tunables for the steps and the run loop.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Search results requested per sub-question
    pub search_limit: usize,
    /// Papers processed per sub-question, taken from the top of the results
    pub papers_per_question: usize,
    /// Chunks retrieved for the writer
    pub context_top_k: usize,
    /// Character budget for summary input and writer context
    pub max_context_chars: usize,
    /// Steps allowed per session before it is failed
    pub max_steps: usize,
    /// Pause after each progress event
    pub progress_delay: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            search_limit: 3,
            papers_per_question: 2,
            context_top_k: 10,
            max_context_chars: 8000,
            max_steps: 50,
            progress_delay: Duration::from_millis(50),
        }
    }
}

/// The step handlers and the collaborators they call.
///
/// The vector index is optional: without one, papers are not chunked or
/// indexed and the writer works from summaries alone.
pub struct Workflow {
    llm: Arc<dyn CompletionService>,
    search: Arc<dyn PaperSearch>,
    pdf: Arc<dyn PdfPipeline>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    settings: WorkflowSettings,
}

impl Workflow {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        search: Arc<dyn PaperSearch>,
        pdf: Arc<dyn PdfPipeline>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            llm,
            search,
            pdf,
            vector_index: None,
            settings,
        }
    }

    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn vector_enabled(&self) -> bool {
        self.vector_index.is_some()
    }

    /// Run one node against the state and return its partial update.
    pub async fn execute(&self, node: Node, state: &WorkflowState) -> StateUpdate {
        self.execute_with_progress(node, state, None).await
    }

    /// Like [`Workflow::execute`], pushing research events to `progress`.
    pub async fn execute_with_progress(
        &self,
        node: Node,
        state: &WorkflowState,
        progress: Option<&ProgressNotifier>,
    ) -> StateUpdate {
        match node {
            Node::Planner => self.plan(state).await,
            Node::Researcher => self.research(state, progress).await,
            Node::Writer => self.write(state).await,
        }
    }
}
