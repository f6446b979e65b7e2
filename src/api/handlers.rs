//! HTTP request handlers

use super::stream::reply_body;
use super::types::{
    ErrorResponse, GenerateRequest, ModelsResponse, SessionResponse, SuccessResponse, VoteRequest,
};
use super::AppState;
use crate::runtime::{OrchestratorError, TurnReply};
use crate::state_machine::TransitionError;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Turns
        .route("/generate", post(generate))
        .route("/generate_stream", post(generate_stream))
        // Session bootstrap
        .route("/models", get(list_models))
        .route("/sessions/new", post(new_session))
        // Feedback
        .route("/vote", post(vote))
        // Version
        .route("/version", get(get_version))
        .fallback(not_found)
        .with_state(state)
}

/// Caller address for exchange records; absent when served without
/// connection info (tests)
fn client_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info.map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

// ============================================================
// Turns
// ============================================================

async fn generate(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<TurnReply>, AppError> {
    let reply = state
        .chat
        .generate(req.into(), &client_ip(connect_info))
        .await?;
    Ok(Json(reply))
}

async fn generate_stream(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    let replies = state
        .chat
        .clone()
        .generate_stream(req.into(), client_ip(connect_info))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        reply_body(replies),
    )
        .into_response())
}

// ============================================================
// Session bootstrap
// ============================================================

async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>, AppError> {
    let models = state.chat.list_models().await?;
    Ok(Json(ModelsResponse { models }))
}

async fn new_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        session: state.chat.new_session(),
    })
}

// ============================================================
// Feedback
// ============================================================

async fn vote(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .chat
        .record_vote(
            req.kind,
            &req.model,
            req.comments,
            &req.session,
            &client_ip(connect_info),
        )
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("chat-relay ", env!("CARGO_PKG_VERSION"))
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {uri}"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidRequest(_) | OrchestratorError::InvalidSession(_) => {
                AppError::BadRequest(err.to_string())
            }
            OrchestratorError::SessionBusy(_)
            | OrchestratorError::Transition(TransitionError::GenerationInFlight) => {
                AppError::Conflict(err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "Request failed");
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
