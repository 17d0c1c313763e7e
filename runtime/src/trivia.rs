//! Best-effort production trivia shown while the local analysis runs.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::orchestrator::Stage;
use crate::prompts::{AnalysisRequest, trivia_prompt};
use crate::provider::{AnalysisProvider, ProviderRequest};
use crate::retry::{RetryPolicy, call_with_retry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TriviaData {
    pub studio: String,
    pub studio_status: String,
    /// Providers sometimes answer with a list of names.
    #[serde(deserialize_with = "string_or_list")]
    pub key_staff: String,
    pub production_trivia: String,
}

impl TriviaData {
    /// Returned whenever the lookup fails for any reason.
    pub fn placeholder() -> Self {
        Self {
            studio: "Unknown".to_string(),
            studio_status: "Analyzing".to_string(),
            key_staff: "Processing...".to_string(),
            production_trivia: "Data unavailable.".to_string(),
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(s) => s,
        Raw::Many(list) => list.join(", "),
    })
}

/// Look up trivia for `request`. Never fails: errors are logged and mapped
/// to [`TriviaData::placeholder`].
pub async fn fetch_trivia(
    provider: &dyn AnalysisProvider,
    request: &AnalysisRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> TriviaData {
    let call = ProviderRequest::json(None, trivia_prompt(request));
    let response = match call_with_retry(
        provider,
        &call,
        &RetryPolicy::none(),
        timeout,
        cancel,
        Stage::Trivia,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(title = %request.title, error = %err, "trivia lookup failed");
            return TriviaData::placeholder();
        }
    };

    match serde_json::from_str::<TriviaData>(response.text.trim()) {
        Ok(trivia) => trivia,
        Err(err) => {
            tracing::warn!(title = %request.title, error = %err, "trivia response was not valid JSON");
            TriviaData::placeholder()
        }
    }
}
