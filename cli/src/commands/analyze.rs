use std::sync::Arc;

use clap::Args;
use xcrit_core::AnalysisResult;
use xcrit_runtime::{
    GeminiProvider, Orchestrator, OrchestratorError, OrchestratorSettings, RuntimeConfig,
    TriviaSlot,
};

use crate::TitleArgs;
use crate::util::{
    EXIT_FAILURE, EXIT_USAGE, build_request, print_json, print_json_stderr, report_error,
    require_api_key,
};

#[derive(Args, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub target: TitleArgs,

    /// Free-form hints for the local pass (edition, route, arc)
    #[arg(long)]
    pub notes: Option<String>,

    /// Continue with the search-grounded hybrid stage after the local one
    #[arg(long)]
    pub hybrid: bool,
}

pub async fn run(config: &RuntimeConfig, args: AnalyzeArgs) -> i32 {
    if let Err(code) = require_api_key(config) {
        return code;
    }

    let orchestrator = Orchestrator::new(
        Arc::new(GeminiProvider::new(config.gemini.clone())),
        OrchestratorSettings::from(config),
    );

    tokio::select! {
        code = analyze(&orchestrator, args) => code,
        _ = tokio::signal::ctrl_c() => interrupted(&orchestrator),
    }
}

/// Abandon the in-flight session after Ctrl-C.
fn interrupted(orchestrator: &Orchestrator) -> i32 {
    orchestrator.reset();
    report_error("interrupted", "Analysis abandoned", None);
    EXIT_FAILURE
}

async fn analyze(orchestrator: &Orchestrator, args: AnalyzeArgs) -> i32 {
    let request = build_request(
        &args.target.title,
        args.target.medium,
        args.target.lang,
        args.notes.as_deref(),
    );

    let local = match orchestrator.submit(request).await {
        Ok(result) => result,
        Err(e) => return stage_failure(&e),
    };
    let mut trivia_shown = show_trivia(orchestrator);

    if !args.hybrid {
        return print_json(&local);
    }

    tracing::info!(
        verdict = %local.verdict,
        s = local.indices.s,
        "local stage complete, starting hybrid stage"
    );
    let result = orchestrator.proceed_to_hybrid().await;
    if !trivia_shown {
        trivia_shown = show_trivia(orchestrator);
    }
    if !trivia_shown {
        tracing::debug!("trivia did not arrive before the analysis finished");
    }

    match result {
        Ok(hybrid) => print_json(&hybrid),
        Err(e) => {
            let code = stage_failure(&e);
            print_surviving_local(&local);
            code
        }
    }
}

fn stage_failure(err: &OrchestratorError) -> i32 {
    match err {
        OrchestratorError::InvalidRequest(message) => {
            report_error("validation_failed", message, Some("Pass a non-empty --title."));
            EXIT_USAGE
        }
        other => {
            report_error("stage_failed", &other.to_string(), None);
            EXIT_FAILURE
        }
    }
}

/// The local result stays valid when the hybrid stage fails.
fn print_surviving_local(local: &AnalysisResult) {
    tracing::warn!("hybrid stage failed; printing the local result");
    let _ = print_json(local);
}

fn show_trivia(orchestrator: &Orchestrator) -> bool {
    match orchestrator.snapshot().trivia {
        Some(TriviaSlot::Arrived { trivia }) => {
            print_json_stderr(&trivia);
            true
        }
        _ => false,
    }
}
