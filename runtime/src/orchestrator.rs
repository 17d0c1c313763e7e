//! Two-stage analysis session: a local-knowledge pass, then an optional
//! search-grounded hybrid pass reconciled by the ABBF engine.
//!
//! A single session is current at a time. Every provider response is applied
//! only if the session it was issued for is still current (same generation
//! and id); anything else is dropped as superseded. The session lock is never
//! held across an await.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;
use xcrit_core::extract::extract_json_object;
use xcrit_core::policy::policy_document;
use xcrit_core::{
    AnalysisResult, DecodeError, EngineError, ExtractError, OmegaPolicy, reconcile,
};

use crate::config::RuntimeConfig;
use crate::prompts::{AnalysisRequest, hybrid_prompt, local_prompt};
use crate::provider::{AnalysisProvider, ProviderError, ProviderRequest};
use crate::retry::{RetryPolicy, call_with_retry};
use crate::trivia::{TriviaData, fetch_trivia};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Local,
    Hybrid,
    Trivia,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Local => "local",
            Stage::Hybrid => "hybrid",
            Stage::Trivia => "trivia",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one submission. `generation` increases on every submit and
/// reset, so a stale id never matches the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionId {
    pub generation: u64,
    pub id: Uuid,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    LocalPending,
    LocalReady,
    HybridPending,
    HybridReady,
    Errored { stage: Stage, message: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::LocalPending => "local_pending",
            SessionState::LocalReady => "local_ready",
            SessionState::HybridPending => "hybrid_pending",
            SessionState::HybridReady => "hybrid_ready",
            SessionState::Errored { .. } => "errored",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SessionState::LocalPending | SessionState::HybridPending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriviaSlot {
    Pending,
    Arrived { trivia: TriviaData },
}

/// Read-only view of the current session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub request: Option<AnalysisRequest>,
    pub result: Option<AnalysisResult>,
    pub trivia: Option<TriviaSlot>,
    pub trivia_ready: bool,
    /// Exact hybrid message sent (or about to be sent) to the provider.
    pub hybrid_prompt: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Why a stage produced no usable result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("hybrid response carries no online scores")]
    MissingOnlineScores,
    #[error("could not serialize the local result: {0}")]
    Prompt(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no active session")]
    NoSession,
    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        actual: &'static str,
        expected: &'static str,
    },
    #[error("Local analysis failed: {0}")]
    Local(StageError),
    #[error("Hybrid analysis failed: {0}")]
    Hybrid(StageError),
    #[error("session {0} was superseded")]
    Superseded(SessionId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub stage_timeout: Duration,
    pub retry: RetryPolicy,
    pub omega: OmegaPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for OrchestratorSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            stage_timeout: config.stage_timeout,
            retry: config.retry,
            omega: config.omega,
        }
    }
}

struct Session {
    id: SessionId,
    request: AnalysisRequest,
    state: SessionState,
    result: Option<AnalysisResult>,
    trivia: TriviaSlot,
    hybrid_prompt: Option<String>,
    cancel: CancellationToken,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Shared {
    generation: u64,
    session: Option<Session>,
}

impl Shared {
    fn current(&mut self, id: SessionId) -> Result<&mut Session, OrchestratorError> {
        let generation = self.generation;
        match self.session.as_mut() {
            Some(session) if session.id == id && generation == id.generation => Ok(session),
            _ => Err(OrchestratorError::Superseded(id)),
        }
    }

    fn abandon(&mut self) -> Option<SessionId> {
        self.generation += 1;
        let session = self.session.take()?;
        session.cancel.cancel();
        Some(session.id)
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn AnalysisProvider>,
    settings: Arc<OrchestratorSettings>,
    shared: Arc<Mutex<Shared>>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn AnalysisProvider>, settings: OrchestratorSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit and run the local stage to completion.
    pub async fn submit(&self, request: AnalysisRequest) -> Result<AnalysisResult, OrchestratorError> {
        let id = self.begin(request)?;
        self.run_local(id).await
    }

    /// Start a new session in `LocalPending`, abandoning any previous one,
    /// and spawn the trivia lookup. Must be called inside a Tokio runtime.
    pub fn begin(&self, request: AnalysisRequest) -> Result<SessionId, OrchestratorError> {
        request.validate().map_err(OrchestratorError::InvalidRequest)?;

        let cancel = CancellationToken::new();
        let id = {
            let mut shared = self.lock();
            if let Some(previous) = shared.abandon() {
                tracing::info!(session_id = %previous.id, generation = previous.generation, "session superseded");
            }
            let id = SessionId {
                generation: shared.generation,
                id: Uuid::now_v7(),
            };
            let now = Utc::now();
            shared.session = Some(Session {
                id,
                request: request.clone(),
                state: SessionState::LocalPending,
                result: None,
                trivia: TriviaSlot::Pending,
                hybrid_prompt: None,
                cancel: cancel.clone(),
                submitted_at: now,
                updated_at: now,
            });
            id
        };

        tracing::info!(
            session_id = %id.id,
            generation = id.generation,
            title = %request.title,
            medium = %request.medium,
            language = ?request.language,
            "analysis session started"
        );
        self.spawn_trivia(id, request, cancel);
        Ok(id)
    }

    fn spawn_trivia(&self, id: SessionId, request: AnalysisRequest, cancel: CancellationToken) {
        let this = self.clone();
        tokio::spawn(async move {
            let trivia = fetch_trivia(
                this.provider.as_ref(),
                &request,
                this.settings.stage_timeout,
                &cancel,
            )
            .await;
            let applied = this.apply(id, |session| {
                session.trivia = TriviaSlot::Arrived { trivia };
            });
            if applied.is_err() {
                tracing::debug!(session_id = %id.id, generation = id.generation, "dropping trivia for superseded session");
            }
        });
    }

    /// Run the local stage for `id`, which must be in `LocalPending`.
    pub async fn run_local(&self, id: SessionId) -> Result<AnalysisResult, OrchestratorError> {
        let (request, cancel) = self.read(id, |session| match session.state {
            SessionState::LocalPending => Ok((session.request.clone(), session.cancel.clone())),
            ref other => Err(OrchestratorError::InvalidState {
                actual: other.name(),
                expected: "local_pending",
            }),
        })??;

        let outcome = self.local_stage(&request, &cancel).await;

        self.apply(id, |session| match outcome {
            Ok(result) => {
                tracing::info!(
                    session_id = %id.id,
                    stage = %Stage::Local,
                    verdict = %result.verdict,
                    s_adj = result.indices.s_adj,
                    "stage completed"
                );
                session.state = SessionState::LocalReady;
                session.result = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                let err = OrchestratorError::Local(err);
                tracing::warn!(session_id = %id.id, stage = %Stage::Local, error = %err, "stage failed");
                session.state = SessionState::Errored {
                    stage: Stage::Local,
                    message: err.to_string(),
                };
                session.result = None;
                Err(err)
            }
        })?
    }

    async fn local_stage(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, StageError> {
        let call = ProviderRequest::json(
            Some(policy_document(&self.settings.omega)),
            local_prompt(request),
        );
        let response = call_with_retry(
            self.provider.as_ref(),
            &call,
            &self.settings.retry,
            self.settings.stage_timeout,
            cancel,
            Stage::Local,
        )
        .await?;

        let decoded = AnalysisResult::decode_str(&response.text)?.into_local_stage();
        let report = reconcile(&decoded.abbf_inputs(), &self.settings.omega)?;
        Ok(decoded.with_reconciliation(report))
    }

    /// Submit the hybrid stage for the current session and run it.
    pub async fn proceed_to_hybrid(&self) -> Result<AnalysisResult, OrchestratorError> {
        let id = self.begin_hybrid()?;
        self.run_hybrid(id).await
    }

    /// Move a `LocalReady` session (or one whose hybrid pass failed) to
    /// `HybridPending` and store the hybrid prompt.
    pub fn begin_hybrid(&self) -> Result<SessionId, OrchestratorError> {
        let mut shared = self.lock();
        let session = shared.session.as_mut().ok_or(OrchestratorError::NoSession)?;

        let ready = matches!(
            session.state,
            SessionState::LocalReady
                | SessionState::Errored {
                    stage: Stage::Hybrid,
                    ..
                }
        );
        let Some(local) = session.result.as_ref().filter(|_| ready) else {
            return Err(OrchestratorError::InvalidState {
                actual: session.state.name(),
                expected: "local_ready",
            });
        };

        let prompt = hybrid_prompt(&session.request, local)
            .map_err(|e| OrchestratorError::Hybrid(StageError::Prompt(e.to_string())))?;
        session.hybrid_prompt = Some(prompt);
        session.state = SessionState::HybridPending;
        session.updated_at = Utc::now();

        tracing::info!(session_id = %session.id.id, generation = session.id.generation, "hybrid stage started");
        Ok(session.id)
    }

    /// Run the hybrid stage for `id`, which must be in `HybridPending`.
    /// On failure the local result stays in place.
    pub async fn run_hybrid(&self, id: SessionId) -> Result<AnalysisResult, OrchestratorError> {
        let (prompt, prior, cancel) = self.read(id, |session| {
            match (&session.state, &session.hybrid_prompt, &session.result) {
                (SessionState::HybridPending, Some(prompt), Some(prior)) => {
                    Ok((prompt.clone(), prior.clone(), session.cancel.clone()))
                }
                (state, _, _) => Err(OrchestratorError::InvalidState {
                    actual: state.name(),
                    expected: "hybrid_pending",
                }),
            }
        })??;

        let outcome = self.hybrid_stage(prompt, &prior, &cancel).await;

        self.apply(id, |session| match outcome {
            Ok(result) => {
                tracing::info!(
                    session_id = %id.id,
                    stage = %Stage::Hybrid,
                    verdict = %result.verdict,
                    s_adj = result.indices.s_adj,
                    bandwagon = result.source_analysis.bandwagon_penalty_detected,
                    citations = result.grounding_urls.len(),
                    "stage completed"
                );
                session.state = SessionState::HybridReady;
                session.result = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                let err = OrchestratorError::Hybrid(err);
                tracing::warn!(session_id = %id.id, stage = %Stage::Hybrid, error = %err, "stage failed");
                session.state = SessionState::Errored {
                    stage: Stage::Hybrid,
                    message: err.to_string(),
                };
                Err(err)
            }
        })?
    }

    async fn hybrid_stage(
        &self,
        prompt: String,
        prior: &AnalysisResult,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, StageError> {
        let call = ProviderRequest::grounded(Some(policy_document(&self.settings.omega)), prompt);
        let response = call_with_retry(
            self.provider.as_ref(),
            &call,
            &self.settings.retry,
            self.settings.stage_timeout,
            cancel,
            Stage::Hybrid,
        )
        .await?;

        let value = extract_json_object(&response.text)?;
        let decoded = AnalysisResult::decode(value)?.into_hybrid_stage(prior, response.citations);
        if !decoded.is_hybrid() {
            return Err(StageError::MissingOnlineScores);
        }
        let report = reconcile(&decoded.abbf_inputs(), &self.settings.omega)?;
        Ok(decoded.with_reconciliation(report))
    }

    /// Abandon the current session, cancelling anything in flight.
    pub fn reset(&self) {
        if let Some(previous) = self.lock().abandon() {
            tracing::info!(session_id = %previous.id, generation = previous.generation, "session reset");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let shared = self.lock();
        match shared.session.as_ref() {
            None => SessionSnapshot {
                state: SessionState::Idle,
                session_id: None,
                request: None,
                result: None,
                trivia: None,
                trivia_ready: false,
                hybrid_prompt: None,
                submitted_at: None,
                updated_at: None,
            },
            Some(session) => SessionSnapshot {
                state: session.state.clone(),
                session_id: Some(session.id),
                request: Some(session.request.clone()),
                result: session.result.clone(),
                trivia_ready: matches!(session.trivia, TriviaSlot::Arrived { .. }),
                trivia: Some(session.trivia.clone()),
                hybrid_prompt: session.hybrid_prompt.clone(),
                submitted_at: Some(session.submitted_at),
                updated_at: Some(session.updated_at),
            },
        }
    }

    fn read<T>(&self, id: SessionId, f: impl FnOnce(&Session) -> T) -> Result<T, OrchestratorError> {
        let mut shared = self.lock();
        let session = shared.current(id)?;
        Ok(f(session))
    }

    fn apply<T>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> T) -> Result<T, OrchestratorError> {
        let mut shared = self.lock();
        let session = shared.current(id)?;
        let out = f(session);
        session.updated_at = Utc::now();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::{Value, json};
    use xcrit_core::policy::PENDING_VERIFICATION_NOTE;
    use xcrit_core::{Dimension, GroundingCitation, Language, Medium, Verdict, VerdictBasis};

    use super::*;
    use crate::provider::{ProviderFuture, ProviderResponse};

    struct Step {
        delay: Duration,
        reply: Result<ProviderResponse, ProviderError>,
    }

    /// Replies routed by request kind so the concurrent trivia call never
    /// steals a local or hybrid reply.
    #[derive(Default)]
    struct Scripted {
        local: Mutex<VecDeque<Step>>,
        hybrid: Mutex<VecDeque<Step>>,
        trivia: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<ProviderRequest>>,
    }

    impl Scripted {
        fn push(queue: &Mutex<VecDeque<Step>>, delay: Duration, reply: Result<ProviderResponse, ProviderError>) {
            queue.lock().unwrap().push_back(Step { delay, reply });
        }

        fn local(&self, reply: Result<ProviderResponse, ProviderError>) {
            Self::push(&self.local, Duration::ZERO, reply);
        }

        fn local_after(&self, delay: Duration, reply: Result<ProviderResponse, ProviderError>) {
            Self::push(&self.local, delay, reply);
        }

        fn hybrid(&self, reply: Result<ProviderResponse, ProviderError>) {
            Self::push(&self.hybrid, Duration::ZERO, reply);
        }

        fn hybrid_after(&self, delay: Duration, reply: Result<ProviderResponse, ProviderError>) {
            Self::push(&self.hybrid, delay, reply);
        }

        fn trivia(&self, reply: Result<ProviderResponse, ProviderError>) {
            Self::push(&self.trivia, Duration::ZERO, reply);
        }

        fn calls(&self) -> Vec<ProviderRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AnalysisProvider for Scripted {
        fn generate(&self, request: ProviderRequest) -> ProviderFuture<'_> {
            let queue = if request.search_grounding {
                &self.hybrid
            } else if request.system_instruction.is_none() {
                &self.trivia
            } else {
                &self.local
            };
            let step = queue.lock().unwrap().pop_front();
            self.calls.lock().unwrap().push(request);
            Box::pin(async move {
                match step {
                    Some(step) => {
                        tokio::time::sleep(step.delay).await;
                        step.reply
                    }
                    None => Err(ProviderError::InvalidResponse("script exhausted".into())),
                }
            })
        }
    }

    fn text(body: impl Into<String>) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            text: body.into(),
            citations: Vec::new(),
        })
    }

    fn local_json(title: &str) -> Value {
        json!({
            "verdict": "OUT",
            "verdict_basis": null,
            "one_line_reason": "Cold logic, warm payoff.",
            "title_localized": {"zh": title, "en": title, "ja": title},
            "scores": {"E": 4.5, "A": 4.5, "C": 4.0, "O": 4.0, "U": 4.5, "R": 4.5},
            "scores_online": null,
            "indices": {"P": 4.1, "D": 3.8, "OI": 4.0, "CI": 4.0, "RI": 4.2, "S": 4.3, "S_adj": 0},
            "highlights": [{"tag": "Logos", "point": "Every clue is fair."}],
            "risks": [],
            "source_analysis": {
                "local_confidence": 0.85,
                "online_confidence": 0.0,
                "blending_coefficient": 0.3,
                "conflict_notes": "none"
            }
        })
    }

    fn hybrid_json() -> Value {
        json!({
            "verdict": "OUT",
            "title_localized": {"zh": "t", "en": "t", "ja": "t"},
            "scores": {"E": 4.0, "A": 3.0, "C": 4.0, "O": 4.0, "U": 4.0, "R": 3.5},
            "scores_online": {"E": 2.5, "A": 2.0, "C": 4.0, "O": 4.0, "U": 4.0, "R": 3.0},
            "indices": {"S": 3.6},
            "source_analysis": {
                "local_confidence": 0.8,
                "online_confidence": 0.7,
                "blending_coefficient": 0.5,
                "conflict_notes": "Reception split over the themes.",
                "consensus_reliability": "High",
                "bandwagon_penalty_detected": false,
                "moral_controversy_factor": 0.8,
                "sensitive_themes": true,
                "age_factor": 0.0
            }
        })
    }

    fn request(title: &str) -> AnalysisRequest {
        AnalysisRequest::new(title, Medium::VisualNovel, Language::En)
    }

    fn orchestrator(provider: Arc<Scripted>) -> Orchestrator {
        Orchestrator::new(
            provider,
            OrchestratorSettings {
                stage_timeout: Duration::from_secs(30),
                retry: RetryPolicy::none(),
                omega: OmegaPolicy::default(),
            },
        )
    }

    async fn wait_for_trivia(orch: &Orchestrator) -> TriviaSlot {
        for _ in 0..100 {
            let snapshot = orch.snapshot();
            if snapshot.trivia_ready {
                if let Some(slot) = snapshot.trivia {
                    return slot;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("trivia never arrived");
    }

    #[tokio::test]
    async fn local_stage_normalizes_and_recomputes() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(local_json("Ever17").to_string()));
        let orch = orchestrator(provider.clone());

        let result = orch.submit(request("Ever17")).await.unwrap();

        assert_eq!(result.verdict, Verdict::In);
        assert_eq!(result.verdict_basis, Some(VerdictBasis::A));
        assert_eq!(result.scores_local, Some(result.scores));
        assert_eq!(result.scores_online, None);
        assert_eq!(result.source_analysis.blending_coefficient, 0.0);
        assert_eq!(result.source_analysis.conflict_notes, PENDING_VERIFICATION_NOTE);
        assert_eq!(result.indices.s_adj, result.scores.weighted_index());

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.state, SessionState::LocalReady);
        assert_eq!(snapshot.result, Some(result));

        let local_call = provider
            .calls()
            .into_iter()
            .find(|c| c.system_instruction.is_some())
            .unwrap();
        assert!(local_call.json_mode);
        assert!(!local_call.search_grounding);
        assert!(local_call.user_message.contains("Subject: Ever17"));
    }

    #[tokio::test]
    async fn local_failure_discards_result_and_allows_resubmit() {
        let provider = Arc::new(Scripted::default());
        provider.local(Err(ProviderError::Http {
            status: 400,
            message: "API key not valid.".into(),
        }));
        let orch = orchestrator(provider.clone());

        let err = orch.submit(request("Ever17")).await.expect_err("provider rejected the call");
        let message = "Local analysis failed: provider returned HTTP 400: API key not valid.";
        assert_eq!(err.to_string(), message);

        let snapshot = orch.snapshot();
        assert_eq!(
            snapshot.state,
            SessionState::Errored {
                stage: Stage::Local,
                message: message.to_string()
            }
        );
        assert!(snapshot.result.is_none());
        assert!(matches!(
            orch.begin_hybrid(),
            Err(OrchestratorError::InvalidState { actual: "errored", .. })
        ));

        provider.local(text(local_json("Ever17").to_string()));
        orch.submit(request("Ever17")).await.unwrap();
        assert_eq!(orch.snapshot().state, SessionState::LocalReady);
    }

    #[tokio::test]
    async fn non_json_local_output_is_a_hard_failure() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(format!("Sure! {}", local_json("Ever17"))));
        let orch = orchestrator(provider);

        let err = orch.submit(request("Ever17")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Local(StageError::Decode(DecodeError::NotJson(_)))
        ));
    }

    #[tokio::test]
    async fn blank_title_is_rejected_before_any_call() {
        let provider = Arc::new(Scripted::default());
        let orch = orchestrator(provider.clone());
        let err = orch.submit(request("  ")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert_eq!(orch.snapshot().state, SessionState::Idle);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn hybrid_stage_blends_reattaches_and_cites() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(local_json("Saya no Uta").to_string()));
        provider.hybrid(Ok(ProviderResponse {
            text: format!(
                "Here is the verified analysis:\n```json\n{}\n```",
                hybrid_json()
            ),
            citations: vec![GroundingCitation {
                title: "Forum thread".into(),
                uri: "https://forum.example/thread".into(),
            }],
        }));
        let orch = orchestrator(provider.clone());

        let local = orch.submit(request("Saya no Uta")).await.unwrap();
        let hybrid = orch.proceed_to_hybrid().await.unwrap();

        assert_eq!(hybrid.scores_local, local.scores_local);
        assert!(hybrid.source_analysis.bandwagon_penalty_detected);
        let omega = hybrid.source_analysis.omega.unwrap();
        assert_eq!(omega.get(Dimension::A), 0.1);
        assert_eq!(omega.get(Dimension::E), 0.1);
        assert_eq!(omega.get(Dimension::R), 0.1);
        assert_eq!(hybrid.scores.get(Dimension::A), 4.5);
        assert_eq!(hybrid.scores.get(Dimension::U), 4.0);
        assert_eq!(hybrid.verdict, Verdict::In);
        assert_eq!(hybrid.grounding_urls.len(), 1);
        assert!(hybrid.abbf.is_some());

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.state, SessionState::HybridReady);
        let prompt = snapshot.hybrid_prompt.unwrap();
        assert!(prompt.contains("PREVIOUS LOCAL ANALYSIS (JSON)"));
        assert!(prompt.contains("Subject: Saya no Uta"));

        let hybrid_call = provider
            .calls()
            .into_iter()
            .find(|c| c.search_grounding)
            .unwrap();
        assert_eq!(hybrid_call.user_message, prompt);
    }

    #[tokio::test]
    async fn hybrid_failure_keeps_local_result_and_can_be_retried() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(local_json("Ever17").to_string()));
        provider.hybrid(text("I could not find reliable reviews for this title."));
        let orch = orchestrator(provider.clone());

        let local = orch.submit(request("Ever17")).await.unwrap();
        let err = orch.proceed_to_hybrid().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Hybrid(StageError::Extract(ExtractError::NoObject))
        ));
        assert!(err.to_string().starts_with("Hybrid analysis failed: "));

        let snapshot = orch.snapshot();
        assert!(matches!(
            snapshot.state,
            SessionState::Errored {
                stage: Stage::Hybrid,
                ..
            }
        ));
        assert_eq!(snapshot.result, Some(local));

        provider.hybrid(text(hybrid_json().to_string()));
        orch.proceed_to_hybrid().await.unwrap();
        assert_eq!(orch.snapshot().state, SessionState::HybridReady);
    }

    #[tokio::test]
    async fn hybrid_without_online_scores_fails() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(local_json("Ever17").to_string()));
        let mut payload = hybrid_json();
        payload["scores_online"] = Value::Null;
        provider.hybrid(text(payload.to_string()));
        let orch = orchestrator(provider);

        orch.submit(request("Ever17")).await.unwrap();
        let err = orch.proceed_to_hybrid().await.unwrap_err();
        assert_eq!(err, OrchestratorError::Hybrid(StageError::MissingOnlineScores));
    }

    #[tokio::test]
    async fn hybrid_requires_a_ready_local_result() {
        let provider = Arc::new(Scripted::default());
        let orch = orchestrator(provider);
        assert_eq!(orch.begin_hybrid(), Err(OrchestratorError::NoSession));

        orch.begin(request("Ever17")).unwrap();
        assert_eq!(
            orch.begin_hybrid(),
            Err(OrchestratorError::InvalidState {
                actual: "local_pending",
                expected: "local_ready"
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_local_response_never_overwrites_newer_session() {
        let provider = Arc::new(Scripted::default());
        provider.local_after(Duration::from_secs(20), text(local_json("First").to_string()));
        provider.local(text(local_json("Second").to_string()));
        let orch = orchestrator(provider);

        let first = orch.begin(request("First")).unwrap();
        let stale = tokio::spawn({
            let orch = orch.clone();
            async move { orch.run_local(first).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let second = orch.submit(request("Second")).await.unwrap();
        assert_eq!(second.title_localized.en, "Second");

        let err = stale.await.unwrap().unwrap_err();
        assert_eq!(err, OrchestratorError::Superseded(first));

        let snapshot = orch.snapshot();
        assert_ne!(snapshot.session_id, Some(first));
        assert_eq!(snapshot.state, SessionState::LocalReady);
        assert_eq!(snapshot.result.unwrap().title_localized.en, "Second");
    }

    #[tokio::test(start_paused = true)]
    async fn late_hybrid_from_previous_session_never_overwrites_new_session() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(local_json("First").to_string()));
        provider.hybrid_after(Duration::from_secs(20), text(hybrid_json().to_string()));
        provider.local(text(local_json("Second").to_string()));
        let orch = orchestrator(provider);

        orch.submit(request("First")).await.unwrap();
        let first = orch.begin_hybrid().unwrap();
        let pending = tokio::spawn({
            let orch = orch.clone();
            async move { orch.run_hybrid(first).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let second = orch.submit(request("Second")).await.unwrap();
        assert_eq!(second.title_localized.en, "Second");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            pending.await.unwrap(),
            Err(OrchestratorError::Superseded(first))
        );

        let snapshot = orch.snapshot();
        assert_ne!(snapshot.session_id, Some(first));
        assert_eq!(snapshot.state, SessionState::LocalReady);
        assert!(snapshot.hybrid_prompt.is_none());
        let result = snapshot.result.unwrap();
        assert_eq!(result.title_localized.en, "Second");
        assert_eq!(result.scores_online, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_abandons_in_flight_hybrid() {
        let provider = Arc::new(Scripted::default());
        provider.local(text(local_json("Ever17").to_string()));
        provider.hybrid_after(Duration::from_secs(20), text(hybrid_json().to_string()));
        let orch = orchestrator(provider);

        orch.submit(request("Ever17")).await.unwrap();
        let id = orch.begin_hybrid().unwrap();
        let pending = tokio::spawn({
            let orch = orch.clone();
            async move { orch.run_hybrid(id).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        orch.reset();
        assert_eq!(
            pending.await.unwrap(),
            Err(OrchestratorError::Superseded(id))
        );
        assert_eq!(orch.snapshot().state, SessionState::Idle);
        assert!(orch.run_local(id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stage_timeout_is_a_local_failure() {
        let provider = Arc::new(Scripted::default());
        provider.local_after(Duration::from_secs(120), text(local_json("Ever17").to_string()));
        let orch = Orchestrator::new(
            provider,
            OrchestratorSettings {
                stage_timeout: Duration::from_secs(5),
                retry: RetryPolicy::none(),
                omega: OmegaPolicy::default(),
            },
        );

        let err = orch.submit(request("Ever17")).await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Local(StageError::Provider(ProviderError::Timeout(
                Duration::from_secs(5)
            )))
        );
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn trivia_arrives_without_gating_the_local_stage() {
        let provider = Arc::new(Scripted::default());
        provider.trivia(text(
            r#"{"studio": "KID", "studio_status": "Defunct", "key_staff": "Kotaro Uchikoshi", "production_trivia": "Planned as a sequel."}"#,
        ));
        let orch = orchestrator(provider);

        orch.begin(request("Ever17")).unwrap();
        assert!(!orch.snapshot().trivia_ready);

        let slot = wait_for_trivia(&orch).await;
        let TriviaSlot::Arrived { trivia } = slot else {
            panic!("expected trivia");
        };
        assert_eq!(trivia.studio, "KID");
        assert_eq!(orch.snapshot().state, SessionState::LocalPending);
    }

    #[tokio::test(start_paused = true)]
    async fn trivia_failure_lands_as_placeholder() {
        let provider = Arc::new(Scripted::default());
        provider.trivia(Err(ProviderError::Transport("connection reset".into())));
        let orch = orchestrator(provider);

        orch.begin(request("Ever17")).unwrap();
        assert_eq!(
            wait_for_trivia(&orch).await,
            TriviaSlot::Arrived {
                trivia: TriviaData::placeholder()
            }
        );
    }

    #[test]
    fn idle_snapshot_serializes_flat_state() {
        let provider = Arc::new(Scripted::default());
        let orch = orchestrator(provider);
        let value = serde_json::to_value(orch.snapshot()).unwrap();
        assert_eq!(value["state"], "idle");
        assert_eq!(value["trivia_ready"], false);
        assert!(value["result"].is_null());
    }
}
