//! Google Generative Language REST client (`models/{model}:generateContent`).

use serde::Deserialize;
use serde_json::{Value, json};
use xcrit_core::GroundingCitation;

use crate::provider::{
    AnalysisProvider, ProviderError, ProviderFuture, ProviderRequest, ProviderResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Title used for grounding chunks the provider leaves untitled.
const FALLBACK_CITATION_TITLE: &str = "Reference";

const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct GeminiProvider {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured(
                    "set XCRIT_GEMINI_API_KEY or GEMINI_API_KEY".to_string(),
                )
            })?;

        tracing::debug!(
            model = %self.config.model,
            search_grounding = request.search_grounding,
            json_mode = request.json_mode,
            "calling analysis provider"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&request_body(&request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.without_url().to_string()))?;
        parse_response(body)
    }
}

impl AnalysisProvider for GeminiProvider {
    fn generate(&self, request: ProviderRequest) -> ProviderFuture<'_> {
        Box::pin(self.send(request))
    }
}

/// Wire body for one request. Search grounding and JSON mode cannot be
/// combined; grounding wins.
pub fn request_body(request: &ProviderRequest) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.user_message }]
        }]
    });
    if let Some(system) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    if request.search_grounding {
        body["tools"] = json!([{ "google_search": {} }]);
    } else if request.json_mode {
        body["generationConfig"] = json!({ "responseMimeType": "application/json" });
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Text of the first candidate plus its web grounding chunks.
pub fn parse_response(body: Value) -> Result<ProviderResponse, ProviderError> {
    let parsed: GenerateContentResponse = serde_json::from_value(body)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::InvalidResponse(format!(
                "prompt blocked: {reason}"
            )));
        }
        return Err(ProviderError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP") {
            return Err(ProviderError::InvalidResponse(format!(
                "generation stopped: {reason}"
            )));
        }
        return Err(ProviderError::EmptyResponse);
    }

    let citations = candidate
        .grounding_metadata
        .map(|meta| {
            meta.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter_map(citation)
                .collect()
        })
        .unwrap_or_default();

    Ok(ProviderResponse { text, citations })
}

fn citation(web: WebSource) -> Option<GroundingCitation> {
    let uri = web.uri.filter(|u| !u.trim().is_empty())?;
    let title = web
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_CITATION_TITLE.to_string());
    Some(GroundingCitation { title, uri })
}

/// `error.message` from a Google error envelope, else the truncated body.
fn error_message(body: &str) -> String {
    let from_envelope = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    from_envelope.unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect())
}
