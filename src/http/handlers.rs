use super::state::AppState;
use crate::session::{SessionStats, StartError, TranscriptSegment};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub is_running: bool,
    pub session: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.start().await {
        Ok(session_id) => {
            info!("Session started over HTTP: {}", session_id);
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    session_id,
                    status: "running".to_string(),
                }),
            )
                .into_response()
        }
        Err(StartError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, "Already running")
        }
        Err(e) => {
            error!("Failed to start session: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start, check logs",
            )
        }
    }
}

/// POST /session/stop
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.stop().await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No active session"),
    }
}

/// GET /session/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.manager.stats().await;
    Json(StatusResponse {
        is_running: session.as_ref().is_some_and(|s| s.is_running),
        session,
    })
}

/// GET /session/transcript
/// Transcript accumulated so far, across sessions
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    Json(TranscriptResponse {
        text: state.transcripts.text(),
        segments: state.transcripts.segments(),
    })
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
