//! Next-step selection.

use serde::{Deserialize, Serialize};

use super::state::{Status, WorkflowState};

/// An executable step of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Planner,
    Researcher,
    Writer,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Planner => "planner",
            Node::Researcher => "researcher",
            Node::Writer => "writer",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Next(Node),
    End,
}

/// Decide what runs next. First match wins:
///
/// 1. complete → end
/// 2. error status → end
/// 3. no plan → planner
/// 4. unanswered sub-questions → researcher
/// 5. otherwise → writer
pub fn route(state: &WorkflowState) -> Route {
    if state.is_complete {
        return Route::End;
    }
    if state.status == Status::Error {
        return Route::End;
    }
    if state.plan.is_empty() {
        return Route::Next(Node::Planner);
    }
    if state.current_task_index < state.plan.len() {
        return Route::Next(Node::Researcher);
    }
    Route::Next(Node::Writer)
}
