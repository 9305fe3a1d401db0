//! Deterministic collaborators for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ChannelError, CompletionError, PdfError, SearchError};
use crate::llm::{CompletionService, ModelTier};
use crate::tools::{Paper, PaperSearch, ParsedPaper, PdfPipeline};

use super::progress::{ProgressEvent, PushChannel};
use super::prompts::ResearchPrompts;
use super::{Workflow, WorkflowSettings};

/// Answers by role: planner and writer calls are told apart by their system
/// prompt, summaries come in on the fast tier. `None` makes that role fail.
pub struct MockLLM {
    pub plan: Option<String>,
    pub report: Option<String>,
    /// Summary calls whose prompt contains this text fail
    pub fail_summary_containing: Option<String>,
    pub calls: Mutex<Vec<(ModelTier, String)>>,
}

impl MockLLM {
    pub fn new(plan: &str, report: &str) -> Self {
        Self {
            plan: Some(plan.to_string()),
            report: Some(report.to_string()),
            fail_summary_containing: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts_for(&self, tier: ModelTier) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == tier)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionService for MockLLM {
    async fn complete(
        &self,
        prompt: &str,
        tier: ModelTier,
        system_prompt: Option<&str>,
    ) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push((tier, prompt.to_string()));

        let fail = || CompletionError::Request("mock failure".to_string());
        match (tier, system_prompt) {
            (ModelTier::Smart, Some(system)) if system == ResearchPrompts::planner_system() => {
                self.plan.clone().ok_or_else(fail)
            }
            (ModelTier::Smart, _) => self.report.clone().ok_or_else(fail),
            (ModelTier::Fast, _) => match &self.fail_summary_containing {
                Some(needle) if prompt.contains(needle.as_str()) => Err(fail()),
                _ => Ok("A concise mock summary.".to_string()),
            },
        }
    }
}

pub fn paper(id: &str) -> Paper {
    Paper {
        title: format!("Paper {}", id),
        abstract_text: format!("Abstract of {}", id),
        authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
        pdf_url: format!("https://arxiv.org/pdf/{}", id),
        published: Some("2024-01-01T00:00:00Z".to_string()),
        arxiv_id: id.to_string(),
        categories: vec!["cs.AI".to_string()],
        primary_category: Some("cs.AI".to_string()),
    }
}

/// Results keyed by exact query; unknown queries return nothing.
#[derive(Default)]
pub struct MockSearch {
    pub results: HashMap<String, Vec<Paper>>,
    pub unreachable: bool,
    pub calls: AtomicUsize,
}

impl MockSearch {
    pub fn with(mut self, query: &str, ids: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), ids.iter().map(|id| paper(id)).collect());
        self
    }
}

#[async_trait]
impl PaperSearch for MockSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(SearchError::Connection("mock search offline".to_string()));
        }
        let mut papers = self.results.get(query).cloned().unwrap_or_default();
        papers.truncate(limit);
        Ok(papers)
    }
}

/// Text is `"Full text of <url>"`; URLs in `failing` error out.
#[derive(Default)]
pub struct MockPdf {
    pub failing: HashSet<String>,
    pub skipped_chunking: AtomicUsize,
}

impl MockPdf {
    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| format!("https://arxiv.org/pdf/{}", id)).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PdfPipeline for MockPdf {
    async fn fetch_and_extract(&self, url: &str, skip_chunks: bool) -> Result<ParsedPaper, PdfError> {
        if self.failing.contains(url) {
            return Err(PdfError::Status(404));
        }
        let text = format!("Full text of {}", url);
        let chunks = if skip_chunks {
            self.skipped_chunking.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        } else {
            vec![text.clone(), format!("Second chunk of {}", url)]
        };
        Ok(ParsedPaper {
            char_count: text.len(),
            text,
            chunks,
        })
    }
}

pub fn settings() -> WorkflowSettings {
    WorkflowSettings {
        progress_delay: Duration::ZERO,
        ..WorkflowSettings::default()
    }
}

pub fn workflow(llm: Arc<MockLLM>, search: Arc<MockSearch>, pdf: Arc<MockPdf>) -> Workflow {
    Workflow::new(llm, search, pdf, settings())
}

/// Buffers every event it is sent.
#[derive(Default)]
pub struct EventLog {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl EventLog {
    /// The `type` tag of each event, in order.
    pub fn kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }
}

#[async_trait]
impl PushChannel for EventLog {
    async fn send(&self, event: &ProgressEvent) -> Result<(), ChannelError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
