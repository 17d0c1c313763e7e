use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::scores::Dimension;

/// Structured error response for API and CLI callers.
/// Every error carries enough information to tell what went wrong
/// and what to do next.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "stage_failed")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const ENGINE_ERROR: &str = "engine_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A score value that cannot live on the 0–5 scale.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("score {dimension} = {value} is not a finite number")]
    NotFinite { dimension: Dimension, value: f64 },
    #[error("score {dimension} = {value} is outside [0, 5]")]
    OutOfRange { dimension: Dimension, value: f64 },
    #[error("omega {dimension} = {value} is outside [0.1, 0.9]")]
    OmegaOutOfRange { dimension: Dimension, value: f64 },
}

/// Precondition failures of the blending engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("cannot blend without a local score vector")]
    MissingLocalBaseline,
    #[error("moral_controversy_factor = {0} is outside [0, 1]")]
    ControversyOutOfRange(f64),
    #[error("age_factor = {0} is not a finite number")]
    AgeFactorNotFinite(f64),
}

/// Lenient extraction of a JSON object from free-text provider output failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("provider response is empty")]
    Empty,
    #[error("no JSON object found in provider response")]
    NoObject,
    #[error("embedded JSON object is malformed: {0}")]
    Malformed(String),
}

/// Strict decoding of a provider payload into an `AnalysisResult` failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("provider response is not JSON: {0}")]
    NotJson(String),
    #[error("provider payload does not match the result schema: {0}")]
    Schema(String),
    #[error("{field} = {value} is outside [0, 1]")]
    UnitIntervalViolation { field: &'static str, value: f64 },
    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },
}
