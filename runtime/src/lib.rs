pub mod config;
pub mod gemini;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod trivia;

pub use config::{ConfigError, RuntimeConfig};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorSettings, SessionId, SessionSnapshot,
    SessionState, Stage, StageError, TriviaSlot,
};
pub use prompts::AnalysisRequest;
pub use provider::{AnalysisProvider, ProviderError, ProviderFuture, ProviderRequest, ProviderResponse};
pub use retry::RetryPolicy;
pub use trivia::TriviaData;
