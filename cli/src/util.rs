use serde::Serialize;
use serde_json::json;
use xcrit_core::{Language, Medium};
use xcrit_runtime::{AnalysisRequest, RuntimeConfig};

/// Stage, provider or engine failure.
pub const EXIT_FAILURE: i32 = 1;
/// Bad flags, unreadable input or invalid configuration.
pub const EXIT_USAGE: i32 = 4;

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    report_error("cli_error", message, docs_hint);
    std::process::exit(EXIT_USAGE);
}

/// Print a structured error to stderr.
pub fn report_error(error: &str, message: &str, docs_hint: Option<&str>) {
    let mut err = json!({
        "error": error,
        "message": message,
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
}

pub fn print_json(value: &impl Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            report_error("output_error", &format!("Failed to serialize output: {e}"), None);
            EXIT_FAILURE
        }
    }
}

pub fn print_json_stderr(value: &impl Serialize) {
    if let Ok(text) = serde_json::to_string_pretty(value) {
        eprintln!("{text}");
    }
}

/// Read JSON from a file path, or from stdin when `path` is `-`.
pub fn read_json_from_file(path: &str) -> Result<serde_json::Value, String> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}

pub fn build_request(title: &str, medium: Medium, language: Language, notes: Option<&str>) -> AnalysisRequest {
    let request = AnalysisRequest::new(title.trim(), medium, language);
    match notes {
        Some(notes) => request.with_notes(notes),
        None => request,
    }
}

/// Load runtime configuration, exiting with a usage error when invalid.
pub fn load_config() -> RuntimeConfig {
    match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => exit_error(
            &e.to_string(),
            Some("Check the XCRIT_* environment variables (or .env)."),
        ),
    }
}

/// Fail fast when a command needs the provider but no key is set.
pub fn require_api_key(config: &RuntimeConfig) -> Result<(), i32> {
    if config.gemini.api_key.is_some() {
        return Ok(());
    }
    report_error(
        "not_configured",
        "No provider API key configured",
        Some("Set XCRIT_GEMINI_API_KEY (or GEMINI_API_KEY)."),
    );
    Err(EXIT_USAGE)
}
