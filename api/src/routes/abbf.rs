use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use xcrit_core::error::ApiError;
use xcrit_core::{AbbfInputs, AbbfReport, reconcile};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/abbf/reconcile", post(reconcile_scores))
}

/// Run the ABBF engine on literal inputs
///
/// Pure computation with the server's omega tunables: consensus, bandwagon
/// detection, omega resolution, blending and threshold evaluation. Without
/// `online` the local vector is returned unchanged.
#[utoipa::path(
    post,
    path = "/v1/abbf/reconcile",
    request_body = AbbfInputs,
    responses(
        (status = 200, description = "Reconciled scores with per-dimension audit", body = AbbfReport),
        (status = 400, description = "Malformed inputs or scores outside [0, 5]", body = ApiError),
        (status = 422, description = "Engine precondition violated", body = ApiError)
    ),
    tag = "abbf"
)]
pub async fn reconcile_scores(
    State(state): State<AppState>,
    AppJson(inputs): AppJson<AbbfInputs>,
) -> Result<Json<AbbfReport>, AppError> {
    let report = reconcile(&inputs, &state.omega_policy())?;
    tracing::debug!(
        s_adj = report.s_adj,
        verdict = %report.threshold.verdict,
        bandwagon = report.controversy.as_ref().is_some_and(|c| c.is_bandwagon),
        "abbf reconcile"
    );
    Ok(Json(report))
}
