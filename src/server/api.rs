//! Request/response endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::error::{StoreError, WorkflowError};
use crate::session::SessionSummary;
use crate::workflow::{DocumentInfo, DocumentRef, Status, WorkflowState};

use super::AppState;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::SessionDeleted { .. } => ApiError::NotFound,
            e => {
                error!(error = %e, "Workflow failure");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "Session store failure");
        ApiError::Internal(e.to_string())
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct NextStepRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub status: Status,
    pub initial_plan: Vec<String>,
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentData {
    pub plan: Vec<String>,
    pub current_task_index: usize,
    pub documents: Vec<DocumentRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentLink {
    pub title: String,
    pub arxiv_id: String,
    pub pdf_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextStepResponse {
    pub session_id: String,
    pub status: Status,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_data: Option<CurrentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Only set when the session was already complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<DocumentLink>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: Status,
    pub plan: Vec<String>,
    pub current_task_index: usize,
    pub documents: Vec<DocumentInfo>,
    pub logs: Vec<String>,
    pub report: Option<String>,
    pub error: Option<String>,
}

impl From<WorkflowState> for SessionResponse {
    fn from(state: WorkflowState) -> Self {
        let report = state.report().map(str::to_string);
        Self {
            session_id: state.session_id,
            status: state.status,
            plan: state.plan,
            current_task_index: state.current_task_index,
            documents: state.documents,
            logs: state.logs,
            report,
            error: state.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

// =============================================================================
// HANDLERS
// =============================================================================

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": "ScholarFlow API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Agentic research over arXiv papers",
        "models": {
            "smart": state.info.smart_model,
            "fast": state.info.fast_model,
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "api_configured": state.info.api_configured,
    }))
}

/// POST /api/v1/research/start - create a session and run the planner
pub async fn start_research(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let session = state.runner.start(query).await?;
    info!(
        session_id = %session.session_id,
        questions = session.plan.len(),
        "Session planned"
    );

    Ok(Json(StartResponse {
        session_id: session.session_id,
        status: session.status,
        initial_plan: session.plan,
        logs: session.logs,
    }))
}

/// POST /api/v1/research/next-step - run one more step
pub async fn next_step(
    State(state): State<AppState>,
    Json(request): Json<NextStepRequest>,
) -> Result<Json<NextStepResponse>, ApiError> {
    let session_id = request.session_id;
    let existing = state
        .runner
        .store()
        .get(&session_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if existing.is_complete {
        return Ok(Json(NextStepResponse {
            session_id,
            status: Status::Completed,
            report: existing.report().map(str::to_string),
            documents: Some(
                existing
                    .documents
                    .iter()
                    .map(|d| DocumentLink {
                        title: d.title.clone(),
                        arxiv_id: d.arxiv_id.clone(),
                        pdf_url: d.pdf_url.clone(),
                    })
                    .collect(),
            ),
            logs: existing.logs,
            current_data: None,
        }));
    }

    let session = state
        .runner
        .advance(&session_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(NextStepResponse {
        report: session.report().map(str::to_string),
        current_data: Some(CurrentData {
            plan: session.plan.clone(),
            current_task_index: session.current_task_index,
            documents: session.documents.iter().map(DocumentRef::from).collect(),
        }),
        session_id: session.session_id,
        status: session.status,
        logs: session.logs,
        documents: None,
    }))
}

/// GET /api/v1/session/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .runner
        .store()
        .get(&session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(session.into()))
}

/// DELETE /api/v1/session/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.runner.delete(&session_id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({
        "message": "Session deleted",
        "session_id": session_id,
    })))
}

/// GET /api/v1/sessions - debug listing
pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionList>, ApiError> {
    let sessions = state.runner.store().list().await?;
    Ok(Json(SessionList {
        count: sessions.len(),
        sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::make_app;
    use crate::server::test_support::app_state;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = make_app(app_state());

        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"]["smart"], "smart-model");

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["api_configured"], false);
    }

    #[tokio::test]
    async fn test_step_through_session() {
        let app = make_app(app_state());

        let (status, start) = send(
            &app,
            "POST",
            "/api/v1/research/start",
            Some(json!({ "query": "quantum error correction" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(start["status"], "researching");
        assert_eq!(start["initial_plan"].as_array().unwrap().len(), 2);
        let session_id = start["session_id"].as_str().unwrap().to_string();

        let next = json!({ "session_id": session_id });
        let (_, first) = send(&app, "POST", "/api/v1/research/next-step", Some(next.clone())).await;
        assert_eq!(first["current_data"]["current_task_index"], 1);
        assert_eq!(first["current_data"]["documents"][0]["arxiv_id"], "2301.00001");
        assert!(first.get("report").is_none());

        let (_, second) = send(&app, "POST", "/api/v1/research/next-step", Some(next.clone())).await;
        assert_eq!(second["status"], "writing");

        let (_, done) = send(&app, "POST", "/api/v1/research/next-step", Some(next.clone())).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["report"], "# QEC Report");

        // Completed sessions answer with the final shape
        let (_, again) = send(&app, "POST", "/api/v1/research/next-step", Some(next)).await;
        assert_eq!(again["status"], "completed");
        assert_eq!(again["documents"].as_array().unwrap().len(), 2);
        assert_eq!(again["documents"][1]["pdf_url"], "https://arxiv.org/pdf/2301.00002");

        let (status, session) = send(&app, "GET", &format!("/api/v1/session/{}", session_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["report"], "# QEC Report");
        assert_eq!(session["documents"][0]["summary"], "A concise mock summary.");
        assert!(session["error"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = make_app(app_state());

        let (status, body) = send(&app, "GET", "/api/v1/session/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Session not found");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/research/next-step",
            Some(json!({ "session_id": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", "/api/v1/session/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let app = make_app(app_state());
        let (_, start) = send(
            &app,
            "POST",
            "/api/v1/research/start",
            Some(json!({ "query": "a".repeat(70) })),
        )
        .await;
        let session_id = start["session_id"].as_str().unwrap().to_string();

        let (_, listing) = send(&app, "GET", "/api/v1/sessions", None).await;
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["sessions"][0]["query"].as_str().unwrap().len(), 50);

        let (status, body) = send(&app, "DELETE", &format!("/api/v1/session/{}", session_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Session deleted");

        let (_, listing) = send(&app, "GET", "/api/v1/sessions", None).await;
        assert_eq!(listing["count"], 0);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let app = make_app(app_state());
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/research/start",
            Some(json!({ "query": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
