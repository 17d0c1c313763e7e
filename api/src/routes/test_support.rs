use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use xcrit_core::OmegaPolicy;
use xcrit_runtime::{
    AnalysisProvider, Orchestrator, OrchestratorSettings, ProviderError, ProviderFuture,
    ProviderRequest, ProviderResponse, RetryPolicy,
};

use crate::state::AppState;

/// Provider with one fixed reply per request kind.
pub struct StubProvider {
    local: Result<String, ProviderError>,
    hybrid: Result<String, ProviderError>,
}

impl StubProvider {
    pub fn healthy() -> Self {
        Self {
            local: Ok(local_payload().to_string()),
            hybrid: Ok(format!("Verified:\n```json\n{}\n```", hybrid_payload())),
        }
    }

    pub fn failing_local(message: &str) -> Self {
        Self {
            local: Err(ProviderError::Http {
                status: 400,
                message: message.to_string(),
            }),
            ..Self::healthy()
        }
    }
}

impl AnalysisProvider for StubProvider {
    fn generate(&self, request: ProviderRequest) -> ProviderFuture<'_> {
        let reply = if request.search_grounding {
            self.hybrid.clone()
        } else if request.system_instruction.is_none() {
            Err(ProviderError::EmptyResponse)
        } else {
            self.local.clone()
        };
        Box::pin(async move {
            reply.map(|text| ProviderResponse {
                text,
                citations: Vec::new(),
            })
        })
    }
}

pub fn app(provider: StubProvider) -> Router {
    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        OrchestratorSettings {
            stage_timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            omega: OmegaPolicy::default(),
        },
    );
    crate::build_router(AppState::new(orchestrator))
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, value)
}

/// Poll the current session until it reaches `state`.
pub async fn wait_for_state(app: &Router, state: &str) -> Value {
    for _ in 0..200 {
        let (_, body) = send(app, Method::GET, "/v1/sessions/current", None).await;
        if body["state"] == state {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached state {state}");
}

pub fn local_payload() -> Value {
    json!({
        "verdict": "IN",
        "verdict_basis": "A",
        "title_localized": {"zh": "Ever17", "en": "Ever17", "ja": "Ever17"},
        "scores": {"E": 4.5, "A": 4.5, "C": 4.0, "O": 4.0, "U": 4.5, "R": 4.5},
        "scores_online": null,
        "indices": {"S": 4.3},
        "source_analysis": {
            "local_confidence": 0.9,
            "online_confidence": 0.0,
            "blending_coefficient": 0.0
        }
    })
}

pub fn hybrid_payload() -> Value {
    json!({
        "verdict": "IN",
        "title_localized": {"zh": "Ever17", "en": "Ever17", "ja": "Ever17"},
        "scores": {"E": 4.5, "A": 4.0, "C": 4.0, "O": 4.0, "U": 4.0, "R": 4.0},
        "scores_online": {"E": 4.0, "A": 3.5, "C": 4.0, "O": 4.0, "U": 4.0, "R": 3.5},
        "indices": {"S": 4.1},
        "source_analysis": {
            "local_confidence": 0.8,
            "online_confidence": 0.8,
            "blending_coefficient": 0.6,
            "consensus_reliability": "Medium"
        }
    })
}
