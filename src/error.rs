//! # Error Types
//!
//! One `thiserror` enum per collaborator boundary. None of these ever reach a
//! client directly: the workflow turns them into log lines or into the
//! session's `error` field.

use thiserror::Error;

/// Failures from the text-completion service.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("OPENROUTER_API_KEY not set. Please set it in your .env file.")]
    MissingApiKey,

    #[error("Completion request failed: {0}")]
    Request(String),

    #[error("Completion returned an empty response")]
    EmptyResponse,
}

/// Failures from the paper search service.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse search response: {0}")]
    ParseError(String),
}

impl SearchError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout
                | SearchError::Connection(_)
                | SearchError::RateLimited
                | SearchError::ServerError(_, _)
        )
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else if e.is_connect() {
            SearchError::Connection(e.to_string())
        } else {
            SearchError::Network(e.to_string())
        }
    }
}

/// Failures while downloading or reading a paper.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Download failed with HTTP {0}")]
    Status(u16),

    #[error("PDF too large ({size_mb:.1}MB), skipping to save server resources")]
    TooLarge { size_mb: f64 },

    #[error("Text extraction failed: {0}")]
    Extraction(String),
}

/// Failure processing a single paper. The paper is skipped, the rest of the
/// sub-question carries on.
#[derive(Error, Debug)]
pub enum PaperError {
    #[error("{0}")]
    Pdf(#[from] PdfError),

    #[error("Summarization failed: {0}")]
    Summary(#[from] CompletionError),
}

/// Failures from the vector index.
#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// Failures from the session store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Failures delivering a progress event to a client.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Client disconnected")]
    Closed,

    #[error("Failed to send progress event: {0}")]
    Send(String),
}

/// Failures that abort a run loop.
///
/// Only persistence can do this; everything else degrades into the state.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Failed to persist session {session_id}: {source}")]
    Persist {
        session_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Session {session_id} was deleted")]
    SessionDeleted { session_id: String },

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}
