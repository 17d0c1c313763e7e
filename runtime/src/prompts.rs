//! User messages for the three provider calls. The policy document travels
//! separately as the system instruction.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use xcrit_core::policy::PENDING_VERIFICATION_NOTE;
use xcrit_core::{AnalysisResult, Language, Medium};

/// What the caller asked to have reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisRequest {
    pub title: String,
    pub medium: Medium,
    #[serde(default)]
    pub language: Language,
    /// Free-form hints for the local pass (edition, route, arc).
    #[serde(default)]
    pub notes: String,
}

impl AnalysisRequest {
    pub fn new(title: impl Into<String>, medium: Medium, language: Language) -> Self {
        Self {
            title: title.into(),
            medium,
            language,
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Rejects requests with nothing to review.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}

pub fn local_prompt(request: &AnalysisRequest) -> String {
    let lang = request.language.prompt_name();
    format!(
        "Subject: {title}\n\
         Medium: {medium}\n\
         Additional Notes: {notes}\n\
         Target Language: {lang}\n\
         \n\
         TASK: Perform a LOCAL PRELIMINARY ANALYSIS based on your internal knowledge ONLY.\n\
         \n\
         INSTRUCTIONS:\n\
         1. Skip the ABBF blending steps for now.\n\
         2. Treat \"scores_local\" as the absolute truth and copy it into \"scores\".\n\
         3. Set \"scores_online\" to null.\n\
         4. Set \"source_analysis.blending_coefficient\" to 0.0.\n\
         5. Fill \"source_analysis.conflict_notes\" with \"{PENDING_VERIFICATION_NOTE}\".\n\
         6. CRITICAL: All string fields in the JSON output MUST be in {lang}.\n\
         \n\
         Output ONLY the raw JSON object.\n",
        title = request.title.trim(),
        medium = request.medium,
        notes = request.notes.trim(),
    )
}

/// Hybrid-stage message embedding the full local result. The engine audit
/// block is left out; the provider recomputes nothing from it.
pub fn hybrid_prompt(
    request: &AnalysisRequest,
    local: &AnalysisResult,
) -> Result<String, serde_json::Error> {
    let mut context = local.clone();
    context.abbf = None;
    let local_json = serde_json::to_string_pretty(&context)?;
    let lang = request.language.prompt_name();

    Ok(format!(
        "Subject: {title}\n\
         Medium: {medium}\n\
         Target Language: {lang}\n\
         \n\
         PREVIOUS LOCAL ANALYSIS (JSON):\n\
         {local_json}\n\
         \n\
         TASK: Perform the FINAL HYBRID ANALYSIS using ABBF (Adaptive Bayesian-Bandwagon Filtering).\n\
         \n\
         INSTRUCTIONS:\n\
         1. Use Google Search to verify the work's reception.\n\
         2. CRITICAL: Analyze the DISTRIBUTION of online opinions and report \"consensus_reliability\".\n\
         3. CRITICAL: Check for review bombing or moral panic (taboo themes causing low scores despite high quality); \
         report \"sensitive_themes\" and \"moral_controversy_factor\".\n\
         4. Report \"scores_online\" from the search results and keep \"scores_local\" unchanged.\n\
         5. Fill every \"source_analysis\" field, including \"age_factor\".\n\
         6. CRITICAL: All string fields in the JSON output MUST be in {lang}.\n\
         \n\
         Output ONLY the raw JSON object.\n",
        title = request.title.trim(),
        medium = request.medium,
    ))
}

pub fn trivia_prompt(request: &AnalysisRequest) -> String {
    let lang = request.language.prompt_name();
    format!(
        "Identify the {medium} titled \"{title}\".\n\
         Provide a JSON object with the following fields:\n\
         - studio: Name of the production studio or main author.\n\
         - studio_status: Status of the studio (e.g., \"Active\", \"Defunct\").\n\
         - key_staff: Names of 1-2 key creators (Director, Writer).\n\
         - production_trivia: A single, interesting, obscure fact about its production (max 40 words).\n\
         \n\
         IMPORTANT: Translate all text values into {lang}.\n\
         Respond with valid JSON only.\n",
        medium = request.medium,
        title = request.title.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("  Saya no Uta ", Medium::VisualNovel, Language::En)
            .with_notes("original release")
    }

    #[test]
    fn local_prompt_carries_subject_language_and_sentinel() {
        let prompt = local_prompt(&request());
        assert!(prompt.contains("Subject: Saya no Uta\n"));
        assert!(prompt.contains("Medium: VN"));
        assert!(prompt.contains("Additional Notes: original release"));
        assert!(prompt.contains("MUST be in English"));
        assert!(prompt.contains(PENDING_VERIFICATION_NOTE));
    }

    #[test]
    fn trivia_prompt_targets_the_requested_language() {
        let mut req = request();
        req.language = Language::Ja;
        let prompt = trivia_prompt(&req);
        assert!(prompt.contains("Identify the VN titled \"Saya no Uta\""));
        assert!(prompt.contains("Japanese (日本語)"));
    }

    #[test]
    fn blank_titles_are_rejected() {
        let req = AnalysisRequest::new("   ", Medium::Anime, Language::Zh);
        assert!(req.validate().is_err());
        assert!(request().validate().is_ok());
    }
}
