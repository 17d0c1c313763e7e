use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use xcrit_core::GroundingCitation;

/// One call to the analysis provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub system_instruction: Option<String>,
    pub user_message: String,
    /// Let the provider run web searches and report citations.
    pub search_grounding: bool,
    /// Ask for a bare JSON document. Ignored when search grounding is on.
    pub json_mode: bool,
}

impl ProviderRequest {
    pub fn json(system_instruction: Option<String>, user_message: String) -> Self {
        Self {
            system_instruction,
            user_message,
            search_grounding: false,
            json_mode: true,
        }
    }

    pub fn grounded(system_instruction: Option<String>, user_message: String) -> Self {
        Self {
            system_instruction,
            user_message,
            search_grounding: true,
            json_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub citations: Vec<GroundingCitation>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider is not configured: {0}")]
    NotConfigured(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("provider returned no text")]
    EmptyResponse,
    #[error("request was cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Worth another attempt: transport faults, timeouts, throttling and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type ProviderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>>;

/// The external LLM service. Implementations own transport and wire format;
/// callers own retries, timeouts and cancellation.
pub trait AnalysisProvider: Send + Sync {
    fn generate(&self, request: ProviderRequest) -> ProviderFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(
            ProviderError::Http {
                status: 429,
                message: "quota".into()
            }
            .is_transient()
        );
        assert!(
            ProviderError::Http {
                status: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::Http {
                status: 400,
                message: "bad key".into()
            }
            .is_transient()
        );
        assert!(!ProviderError::EmptyResponse.is_transient());
        assert!(!ProviderError::Cancelled.is_transient());
    }

    #[test]
    fn request_constructors_set_mode_flags() {
        let local = ProviderRequest::json(None, "task".into());
        assert!(local.json_mode && !local.search_grounding);
        let hybrid = ProviderRequest::grounded(Some("policy".into()), "task".into());
        assert!(hybrid.search_grounding && !hybrid.json_mode);
    }
}
