//! Plan step: research goal → ordered sub-questions.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::llm::ModelTier;

use super::prompts::{format_plan, ResearchPrompts};
use super::state::{StateUpdate, Status, WorkflowState};
use super::Workflow;

impl Workflow {
    /// Ask the smart tier for a plan. A reply that is not a usable JSON array
    /// degrades to a single question: the original query. A failed call sets
    /// `status = error`.
    pub async fn plan(&self, state: &WorkflowState) -> StateUpdate {
        let query = &state.original_query;
        info!(session_id = %state.session_id, query = %query, "Planning research");

        let response = match self
            .llm
            .complete(
                &ResearchPrompts::planner_user(query),
                ModelTier::Smart,
                Some(ResearchPrompts::planner_system()),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(session_id = %state.session_id, error = %e, "Planner call failed");
                return StateUpdate::failed(e.to_string(), format!("Planning failed: {}", e));
            }
        };

        let (plan, log) = match parse_plan(&response) {
            Some(plan) => {
                info!(questions = plan.len(), "Generated research plan");
                let log = format!(
                    "Created research plan with {} questions:\n{}",
                    plan.len(),
                    indent(&format_plan(&plan))
                );
                (plan, log)
            }
            None => {
                warn!(response = %response, "Planner reply was not a JSON array, using the query as the plan");
                (
                    vec![query.clone()],
                    format!("Could not parse plan, using original query: {}", query),
                )
            }
        };

        StateUpdate {
            plan: Some(plan),
            current_task_index: Some(0),
            status: Some(Status::Researching),
            logs: vec![log],
            ..StateUpdate::default()
        }
    }
}

/// Parse a planner reply. Code-fence lines are dropped first; non-string
/// items are kept in their JSON form. Returns `None` for anything other than
/// a non-empty array.
pub fn parse_plan(response: &str) -> Option<Vec<String>> {
    let cleaned = response
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let items = match serde_json::from_str::<Value>(cleaned.trim()).ok()? {
        Value::Array(items) if !items.is_empty() => items,
        _ => return None,
    };

    Some(
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
