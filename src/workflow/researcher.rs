//! Research step: one sub-question per invocation.
//!
//! search → for each of the top papers, sequentially: download → extract →
//! summarize → index. A paper that fails is skipped; a search that fails
//! skips the whole sub-question. Either way the cursor advances by one and
//! `question_complete` closes the sub-question for streaming clients.

use tracing::{error, info, warn};

use crate::error::PaperError;
use crate::llm::ModelTier;
use crate::tools::{truncate_chars, Paper};
use crate::vector::DocumentMetadata;

use super::progress::{DocumentRef, ProgressEvent, ProgressNotifier, ResearchActivity};
use super::prompts::ResearchPrompts;
use super::state::{DocumentInfo, StateUpdate, Status, WorkflowState};
use super::Workflow;

impl Workflow {
    /// Research the sub-question under the cursor. With a notifier, the
    /// fine-grained research events are pushed as the work happens.
    pub async fn research(
        &self,
        state: &WorkflowState,
        progress: Option<&ProgressNotifier>,
    ) -> StateUpdate {
        let index = state.current_task_index;
        let Some(question) = state.plan.get(index) else {
            warn!(session_id = %state.session_id, index, "No research questions left");
            return StateUpdate::empty()
                .with_status(Status::Writing)
                .with_log("All research questions completed, preparing final report");
        };

        info!(
            session_id = %state.session_id,
            question = index + 1,
            total = state.plan.len(),
            "Researching: {}", question
        );
        notify(
            progress,
            ProgressEvent::Researching {
                question_index: index,
                question: question.clone(),
                total_questions: state.plan.len(),
            },
        )
        .await;

        let next_index = index + 1;
        let next_status = if next_index < state.plan.len() {
            Status::Researching
        } else {
            Status::Writing
        };

        let mut logs = vec![format!("Researching: {}", question)];
        let mut documents = Vec::new();

        notify(
            progress,
            ProgressEvent::activity(
                ResearchActivity::Searching,
                "Searching ArXiv for papers...",
                Some(question.as_str()),
            ),
        )
        .await;

        match self.search.search(question, self.settings.search_limit).await {
            Ok(papers) => {
                logs.push(format!("Found {} papers on arXiv", papers.len()));
                notify(
                    progress,
                    ProgressEvent::Activity {
                        action: ResearchActivity::FoundPapers,
                        message: format!("Found {} papers", papers.len()),
                        detail: None,
                        papers: papers
                            .iter()
                            .map(|p| DocumentRef {
                                title: truncate_chars(&p.title, 80).to_string(),
                                arxiv_id: p.arxiv_id.clone(),
                            })
                            .collect(),
                    },
                )
                .await;

                if papers.is_empty() {
                    logs.push("No papers found, moving to next question".to_string());
                    notify(
                        progress,
                        ProgressEvent::activity(
                            ResearchActivity::NoPapers,
                            "No papers found, moving to next question",
                            None,
                        ),
                    )
                    .await;
                }

                let selected = &papers[..papers.len().min(self.settings.papers_per_question)];
                for (position, paper) in selected.iter().enumerate() {
                    logs.push(format!("Processing: {}", preview(&paper.title, 50)));
                    notify(
                        progress,
                        ProgressEvent::activity(
                            ResearchActivity::Downloading,
                            format!("Downloading PDF ({}/{})", position + 1, selected.len()),
                            Some(paper.title.as_str()),
                        ),
                    )
                    .await;

                    match self.process_paper(paper, progress).await {
                        Ok(doc) => {
                            logs.push(format!("Processed: {}", preview(&doc.title, 40)));
                            notify(progress, ProgressEvent::paper_complete(&doc)).await;
                            documents.push(doc);
                        }
                        Err(e) => {
                            warn!(arxiv_id = %paper.arxiv_id, error = %e, "Failed to process paper");
                            let reason = preview(&e.to_string(), 50);
                            notify(
                                progress,
                                ProgressEvent::activity(
                                    ResearchActivity::Error,
                                    format!("Failed to process: {}", reason),
                                    Some(paper.title.as_str()),
                                ),
                            )
                            .await;
                            logs.push(format!("Failed to process paper: {}", reason));
                        }
                    }
                }
            }
            Err(e) => {
                error!(session_id = %state.session_id, error = %e, "Search failed");
                notify(
                    progress,
                    ProgressEvent::activity(
                        ResearchActivity::Error,
                        format!("Search failed: {}", e),
                        Some(question.as_str()),
                    ),
                )
                .await;
                logs.push(format!(
                    "Error researching question {}: {}. Skipping to next.",
                    index + 1,
                    e
                ));
            }
        }

        info!(
            session_id = %state.session_id,
            documents = documents.len(),
            next_index,
            "Research step finished"
        );
        notify(
            progress,
            ProgressEvent::QuestionComplete {
                question_index: index,
                next_index,
                is_complete: next_status == Status::Writing,
                documents_found: documents.len(),
            },
        )
        .await;

        StateUpdate {
            documents,
            current_task_index: Some(next_index),
            status: Some(next_status),
            logs,
            ..StateUpdate::default()
        }
    }

    async fn process_paper(
        &self,
        paper: &Paper,
        progress: Option<&ProgressNotifier>,
    ) -> Result<DocumentInfo, PaperError> {
        let parsed = self
            .pdf
            .fetch_and_extract(&paper.pdf_url, !self.vector_enabled())
            .await?;
        info!(arxiv_id = %paper.arxiv_id, chars = parsed.char_count, "Read paper");
        notify(
            progress,
            ProgressEvent::activity(
                ResearchActivity::Reading,
                format!("Reading {} characters", parsed.char_count),
                Some(paper.title.as_str()),
            ),
        )
        .await;

        notify(
            progress,
            ProgressEvent::activity(
                ResearchActivity::Summarizing,
                "Generating AI summary...",
                Some(paper.title.as_str()),
            ),
        )
        .await;
        let prompt = ResearchPrompts::summary(&parsed.text, self.settings.max_context_chars);
        let summary = self.llm.complete(&prompt, ModelTier::Fast, None).await?;

        if let Some(index) = &self.vector_index {
            notify(
                progress,
                ProgressEvent::activity(
                    ResearchActivity::Storing,
                    "Storing in vector database",
                    Some(paper.title.as_str()),
                ),
            )
            .await;
            let metadata = DocumentMetadata {
                source_url: paper.pdf_url.clone(),
                title: paper.title.clone(),
            };
            // Indexing only feeds writer context; the summary stands without it
            if let Err(e) = index.upsert(&parsed.chunks, &metadata, &paper.arxiv_id).await {
                warn!(arxiv_id = %paper.arxiv_id, error = %e, "Failed to index paper chunks");
            }
        }

        Ok(DocumentInfo {
            title: paper.title.clone(),
            summary,
            pdf_url: paper.pdf_url.clone(),
            arxiv_id: paper.arxiv_id.clone(),
            authors: paper.authors.clone(),
        })
    }
}

async fn notify(progress: Option<&ProgressNotifier>, event: ProgressEvent) {
    if let Some(notifier) = progress {
        notifier.send(&event).await;
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}
