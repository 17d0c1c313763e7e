use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use xcrit_core::error::ApiError;
use xcrit_runtime::{AnalysisRequest, SessionId, SessionSnapshot, SessionState};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions", post(submit_session))
        .route(
            "/v1/sessions/current",
            get(get_current_session).delete(reset_session),
        )
        .route("/v1/sessions/current/hybrid", post(start_hybrid))
}

/// Returned when a stage has been accepted and runs in the background.
#[derive(Serialize, utoipa::ToSchema)]
pub struct StageAccepted {
    pub session_id: SessionId,
    pub state: String,
    /// Where to poll for progress.
    pub poll: String,
}

impl StageAccepted {
    fn new(session_id: SessionId, state: SessionState) -> Self {
        Self {
            session_id,
            state: state.name().to_string(),
            poll: "/v1/sessions/current".to_string(),
        }
    }
}

/// Submit a title for analysis
///
/// Starts a new session, abandoning any previous one. The local stage and
/// the trivia lookup run in the background; poll the current session.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    request_body = AnalysisRequest,
    responses(
        (status = 202, description = "Local stage started", body = StageAccepted),
        (status = 400, description = "Invalid request", body = ApiError)
    ),
    tag = "sessions"
)]
pub async fn submit_session(
    State(state): State<AppState>,
    AppJson(request): AppJson<AnalysisRequest>,
) -> Result<(StatusCode, Json<StageAccepted>), AppError> {
    let id = state.orchestrator.begin(request)?;

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_local(id).await {
            tracing::debug!(session_id = %id.id, error = %err, "local stage ended without a result");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StageAccepted::new(id, SessionState::LocalPending)),
    ))
}

/// Snapshot of the current session
///
/// Includes the state, the latest result, trivia and the exact hybrid prompt
/// once the hybrid stage has been requested.
#[utoipa::path(
    get,
    path = "/v1/sessions/current",
    responses(
        (status = 200, description = "Current session (state `idle` when none)", body = SessionSnapshot)
    ),
    tag = "sessions"
)]
pub async fn get_current_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.orchestrator.snapshot())
}

/// Start the search-grounded hybrid stage
///
/// Allowed once the local stage is ready, or to retry a failed hybrid stage.
#[utoipa::path(
    post,
    path = "/v1/sessions/current/hybrid",
    responses(
        (status = 202, description = "Hybrid stage started", body = StageAccepted),
        (status = 404, description = "No session", body = ApiError),
        (status = 409, description = "Local result not ready", body = ApiError)
    ),
    tag = "sessions"
)]
pub async fn start_hybrid(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StageAccepted>), AppError> {
    let id = state.orchestrator.begin_hybrid()?;

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_hybrid(id).await {
            tracing::debug!(session_id = %id.id, error = %err, "hybrid stage ended without a result");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StageAccepted::new(id, SessionState::HybridPending)),
    ))
}

/// Abandon the current session
#[utoipa::path(
    delete,
    path = "/v1/sessions/current",
    responses(
        (status = 204, description = "Session reset to idle")
    ),
    tag = "sessions"
)]
pub async fn reset_session(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.reset();
    StatusCode::NO_CONTENT
}
