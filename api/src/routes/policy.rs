use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use xcrit_core::OmegaPolicy;
use xcrit_core::policy::{WeightEntry, policy_document, weight_table};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/policy", get(get_policy))
}

/// Response for GET /v1/policy
#[derive(Serialize, utoipa::ToSchema)]
pub struct PolicyResponse {
    /// The review protocol sent to the provider as its system instruction.
    pub document: String,
    pub weights: Vec<WeightEntry>,
    pub omega: OmegaPolicy,
}

/// Published review policy
///
/// Rendered from the same constants the engine evaluates with.
#[utoipa::path(
    get,
    path = "/v1/policy",
    responses(
        (status = 200, description = "Policy document, weight table and omega tunables", body = PolicyResponse)
    ),
    tag = "abbf"
)]
pub async fn get_policy(State(state): State<AppState>) -> Json<PolicyResponse> {
    let omega = state.omega_policy();
    Json(PolicyResponse {
        document: policy_document(&omega),
        weights: weight_table(),
        omega,
    })
}
