//! HTTP and WebSocket transport for the research workflow.
//!
//! - `GET  /` and `GET /health`
//! - `/api/v1/...` request/response endpoints, one workflow step per call
//! - `GET  /ws/research` streaming endpoint, the whole run over one socket

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::workflow::WorkflowRunner;

mod api;
mod websocket;

pub use websocket::WebSocketChannel;

/// Static facts reported by `/` and `/health`.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub smart_model: String,
    pub fast_model: String,
    pub api_configured: bool,
}

impl ServiceInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            smart_model: config.smart_model.clone(),
            fast_model: config.fast_model.clone(),
            api_configured: config.api_configured(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<WorkflowRunner>,
    pub info: Arc<ServiceInfo>,
}

pub fn make_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/research/start", post(api::start_research))
        .route("/research/next-step", post(api::next_step))
        .route(
            "/session/{session_id}",
            get(api::get_session).delete(api::delete_session),
        )
        .route("/sessions", get(api::list_sessions));

    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health))
        .route("/ws/research", get(websocket::ws_handler))
        .nest("/api/v1", api_routes)
        .with_state(state)
}

pub async fn run_server(state: AppState, host: &str, port: u16) -> Result<()> {
    info!(
        smart_model = %state.info.smart_model,
        fast_model = %state.info.fast_model,
        "ScholarFlow API starting"
    );
    if !state.info.api_configured {
        warn!("OPENROUTER_API_KEY not set, completion calls will fail");
    }

    let app = make_app(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app).await?;
    info!("ScholarFlow API shutting down");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::workflow::testing::{workflow, MockLLM, MockPdf, MockSearch};

    pub const PLAN: &str = r#"["What is QEC?", "What are surface codes?"]"#;

    pub fn app_state() -> AppState {
        let search = MockSearch::default()
            .with("What is QEC?", &["2301.00001"])
            .with("What are surface codes?", &["2301.00002"]);
        let workflow = workflow(
            Arc::new(MockLLM::new(PLAN, "# QEC Report")),
            Arc::new(search),
            Arc::new(MockPdf::default()),
        );
        AppState {
            runner: Arc::new(WorkflowRunner::new(
                Arc::new(workflow),
                Arc::new(InMemorySessionStore::new()),
            )),
            info: Arc::new(ServiceInfo {
                smart_model: "smart-model".to_string(),
                fast_model: "fast-model".to_string(),
                api_configured: false,
            }),
        }
    }
}
