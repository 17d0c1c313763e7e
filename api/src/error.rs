use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use xcrit_core::EngineError;
use xcrit_core::error::{self, ApiError};
use xcrit_runtime::OrchestratorError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// No session to act on (404)
    NotFound { resource: String },
    /// Session is in the wrong state for the request (409)
    Conflict {
        message: String,
        docs_hint: Option<String>,
    },
    /// Engine precondition violated by the supplied inputs (422)
    Engine(EngineError),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    request_id,
                    docs_hint: Some("Submit a title with POST /v1/sessions first.".to_string()),
                },
            ),
            AppError::Conflict { message, docs_hint } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message,
                    field: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Engine(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError {
                    error: error::codes::ENGINE_ERROR.to_string(),
                    field: engine_field(&err).map(str::to_string),
                    message: err.to_string(),
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

fn engine_field(err: &EngineError) -> Option<&'static str> {
    match err {
        EngineError::MissingLocalBaseline => Some("local"),
        EngineError::ControversyOutOfRange(_) => Some("moral_controversy_factor"),
        EngineError::AgeFactorNotFinite(_) => Some("age_factor"),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidRequest(message) => AppError::Validation {
                message,
                field: Some("title".to_string()),
                docs_hint: None,
            },
            OrchestratorError::NoSession => AppError::NotFound {
                resource: "Current session".to_string(),
            },
            OrchestratorError::InvalidState { .. } => AppError::Conflict {
                message: err.to_string(),
                docs_hint: Some(
                    "The hybrid stage needs a finished local analysis. Poll GET /v1/sessions/current."
                        .to_string(),
                ),
            },
            OrchestratorError::Superseded(_) => AppError::Conflict {
                message: err.to_string(),
                docs_hint: None,
            },
            OrchestratorError::Local(_) | OrchestratorError::Hybrid(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
