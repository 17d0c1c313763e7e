use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use xcrit_runtime::{GeminiProvider, Orchestrator, OrchestratorSettings, RuntimeConfig};

mod error;
mod extract;
mod middleware;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "X-Critical API",
        version = "0.1.0",
        description = "Two-stage media critique sessions and the ABBF score-reconciliation engine."
    ),
    paths(
        routes::health::health_check,
        routes::sessions::submit_session,
        routes::sessions::get_current_session,
        routes::sessions::start_hybrid,
        routes::sessions::reset_session,
        routes::abbf::reconcile_scores,
        routes::policy::get_policy,
    ),
    components(schemas(
        HealthResponse,
        routes::sessions::StageAccepted,
        routes::policy::PolicyResponse,
        xcrit_core::error::ApiError,
        xcrit_core::AbbfInputs,
        xcrit_core::AbbfReport,
        xcrit_core::AnalysisResult,
        xcrit_core::policy::WeightEntry,
        xcrit_runtime::AnalysisRequest,
        xcrit_runtime::SessionSnapshot,
        xcrit_runtime::SessionState,
        xcrit_runtime::TriviaSlot,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub(crate) fn build_router(app_state: state::AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::sessions::router())
        .merge(routes::abbf::router())
        .merge(routes::policy::router())
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "xcrit_api=debug,xcrit_runtime=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = RuntimeConfig::from_env().expect("Invalid runtime configuration");
    if config.gemini.api_key.is_none() {
        tracing::warn!("No provider API key configured; analysis stages will fail");
    }
    tracing::info!(
        model = %config.gemini.model,
        stage_timeout_secs = config.stage_timeout.as_secs(),
        max_retries = config.retry.max_retries,
        "runtime configured"
    );

    let orchestrator = Orchestrator::new(
        Arc::new(GeminiProvider::new(config.gemini.clone())),
        OrchestratorSettings::from(&config),
    );
    let app_state = state::AppState::new(orchestrator);

    let app = build_router(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::cors::build_cors_layer()),
    );

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("X-Critical API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .await
        .expect("Server error");
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use crate::routes::test_support::{StubProvider, app, send};

    #[tokio::test]
    async fn health_reports_version() {
        let app = app(StubProvider::healthy());
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn openapi_document_lists_session_routes() {
        let app = app(StubProvider::healthy());
        let (status, body) = send(&app, Method::GET, "/api-doc/openapi.json", None).await;
        assert_eq!(status, 200);
        assert!(body["paths"]["/v1/sessions"].is_object());
        assert!(body["paths"]["/v1/abbf/reconcile"].is_object());
    }
}
