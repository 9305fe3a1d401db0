//! Write step: synthesize the cited report.

use tracing::{error, info, warn};

use crate::llm::ModelTier;

use super::prompts::{
    fallback_report, format_context, format_plan, format_summaries, ResearchPrompts,
    NO_VECTOR_CONTEXT,
};
use super::state::{ChatMessage, StateUpdate, Status, WorkflowState};
use super::Workflow;

impl Workflow {
    /// Build the report from retrieved context and paper summaries.
    ///
    /// When synthesis fails the session still completes if any paper was
    /// gathered, with a report assembled from the summaries and `error` set.
    /// With no papers it ends in `status = error`.
    pub async fn write(&self, state: &WorkflowState) -> StateUpdate {
        let query = &state.original_query;
        info!(
            session_id = %state.session_id,
            documents = state.documents.len(),
            "Writing report"
        );

        let mut logs = vec!["Synthesizing research report...".to_string()];

        let context = match &self.vector_index {
            Some(index) => {
                let hits = index.query(query, self.settings.context_top_k).await;
                logs.push(format!(
                    "Retrieved {} relevant chunks from vector index",
                    hits.len()
                ));
                format_context(&hits, self.settings.max_context_chars)
            }
            None => {
                logs.push("Vector index disabled, using paper summaries for context".to_string());
                NO_VECTOR_CONTEXT.to_string()
            }
        };

        let prompt = ResearchPrompts::writer_user(
            query,
            &format_plan(&state.plan),
            &format_summaries(&state.documents),
            &context,
        );

        match self
            .llm
            .complete(&prompt, ModelTier::Smart, Some(ResearchPrompts::writer_system()))
            .await
        {
            Ok(report) => {
                info!(session_id = %state.session_id, chars = report.len(), "Report completed");
                logs.push("Research report completed".to_string());
                StateUpdate {
                    messages: vec![ChatMessage::assistant(report)],
                    is_complete: Some(true),
                    status: Some(Status::Completed),
                    logs,
                    ..StateUpdate::default()
                }
            }
            Err(e) if !state.documents.is_empty() => {
                warn!(session_id = %state.session_id, error = %e, "Synthesis failed, using fallback report");
                logs.push(format!("Used fallback report due to error: {}", e));
                StateUpdate {
                    messages: vec![ChatMessage::assistant(fallback_report(
                        query,
                        &state.documents,
                    ))],
                    is_complete: Some(true),
                    status: Some(Status::Completed),
                    error: Some(format!("Failed to generate report: {}", e)),
                    logs,
                    ..StateUpdate::default()
                }
            }
            Err(e) => {
                error!(session_id = %state.session_id, error = %e, "Synthesis failed with no documents");
                logs.push(format!("Report generation failed: {}", e));
                StateUpdate {
                    is_complete: Some(true),
                    status: Some(Status::Error),
                    error: Some(format!("Failed to generate report: {}", e)),
                    logs,
                    ..StateUpdate::default()
                }
            }
        }
    }
}
