//! # ScholarFlow
//!
//! A plan-and-execute research agent. A research question is broken into
//! sub-questions, each sub-question is answered from arXiv papers (searched,
//! downloaded, summarized and optionally indexed), and the findings are
//! synthesized into a report with citations.
//!
//! The [`workflow`] module is the state machine. Everything it calls sits
//! behind a trait so it can be swapped or stubbed:
//!
//! | Trait | Production implementation |
//! |---|---|
//! | [`llm::CompletionService`] | [`llm::OpenRouterClient`] (Rig) |
//! | [`tools::PaperSearch`] | [`tools::ArxivSearcher`] |
//! | [`tools::PdfPipeline`] | [`tools::PdfParser`] |
//! | [`vector::VectorIndex`] | [`vector::InMemoryVectorIndex`] |
//! | [`session::SessionStore`] | [`session::InMemorySessionStore`] |
//! | [`workflow::PushChannel`] | [`server::WebSocketChannel`] |

pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;
pub mod tools;
pub mod vector;
pub mod workflow;

pub use config::Config;
pub use error::{
    ChannelError, CompletionError, PaperError, PdfError, SearchError, StoreError,
    VectorIndexError, WorkflowError,
};
pub use llm::{CompletionService, ModelTier, OpenRouterClient};
pub use session::{InMemorySessionStore, SessionStore, SessionSummary};
pub use vector::{InMemoryVectorIndex, VectorIndex};
pub use workflow::{
    route, Node, ProgressEvent, ProgressNotifier, PushChannel, ResearchActivity, Route,
    StateUpdate, Status, Workflow, WorkflowRunner, WorkflowSettings, WorkflowState,
};
