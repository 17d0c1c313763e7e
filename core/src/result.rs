//! The critique payload exchanged with the analysis provider.
//!
//! `AnalysisResult` is only built through [`AnalysisResult::decode`] (or
//! [`AnalysisResult::decode_str`]), which rejects payloads with missing
//! required fields or out-of-domain numbers. Stage transitions consume the
//! value and return a new one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::blend::{AbbfInputs, AbbfReport};
use crate::consensus::{self, ConsensusReliability};
use crate::error::DecodeError;
use crate::omega::OmegaVector;
use crate::policy::PENDING_VERIFICATION_NOTE;
use crate::scores::ScoreVector;
use crate::threshold::{ThresholdSignals, Verdict, VerdictBasis};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    #[serde(default)]
    pub verdict_basis: Option<VerdictBasis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_line_reason: Option<String>,
    pub title_localized: LocalizedTitle,
    /// Final scores: local-only on the first pass, blended after the hybrid pass.
    pub scores: ScoreVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_local: Option<ScoreVector>,
    #[serde(default)]
    pub scores_online: Option<ScoreVector>,
    pub indices: Indices,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub media_advice: MediaAdvice,
    #[serde(default)]
    pub similar_recos: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<PkData>,
    #[serde(default, rename = "notes_needed_if_OUT")]
    pub notes_needed_if_out: Vec<String>,
    #[serde(default)]
    pub data_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_profile: Option<GenreProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coefficients: Option<Coefficients>,
    #[serde(default, flatten)]
    pub signals: ThresholdSignals,
    pub source_analysis: SourceAnalysis,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_urls: Vec<GroundingCitation>,
    /// Engine audit trail of the last reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbf: Option<AbbfReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocalizedTitle {
    pub zh: String,
    pub en: String,
    pub ja: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Indices {
    #[serde(rename = "P", default)]
    pub p: f64,
    #[serde(rename = "D", default)]
    pub d: f64,
    #[serde(rename = "OI", default)]
    pub oi: f64,
    #[serde(rename = "CI", default)]
    pub ci: f64,
    #[serde(rename = "RI", default)]
    pub ri: f64,
    /// Weighted sum as reported by the provider.
    #[serde(rename = "S")]
    pub s: f64,
    /// Headline score; always recomputed by the engine from the final vector.
    #[serde(rename = "S_adj", default)]
    pub s_adj: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Highlight {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub point: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct MediaAdvice {
    pub platform: String,
    pub version: String,
    pub prereq: String,
    pub season_mood: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Recommendation {
    pub title: String,
    pub medium: String,
    pub similarity: f64,
    pub priority: f64,
    pub reason: String,
}

/// Unvalidated per-dimension numbers (multipliers, comparator scores).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DimensionMap {
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "O")]
    pub o: f64,
    #[serde(rename = "U")]
    pub u: f64,
    #[serde(rename = "R")]
    pub r: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PkDiff {
    #[serde(rename = "dE")]
    pub d_e: f64,
    #[serde(rename = "dA")]
    pub d_a: f64,
    #[serde(rename = "dC")]
    pub d_c: f64,
    #[serde(rename = "dO")]
    pub d_o: f64,
    #[serde(rename = "dU")]
    pub d_u: f64,
    #[serde(rename = "dR")]
    pub d_r: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PkComparator {
    pub title: String,
    pub medium: String,
    pub similarity: f64,
    pub scores: DimensionMap,
    pub diff: PkDiff,
    pub adv_component: f64,
    pub weight: f64,
}

/// Cross-comparison against similar works.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PkData {
    pub comparators: Vec<PkComparator>,
    pub pk_raw: f64,
    pub pk_score: f64,
    pub lambda: f64,
    #[serde(rename = "S_before")]
    pub s_before: f64,
    #[serde(rename = "S_after")]
    pub s_after: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GenreProfile {
    pub detected: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Coefficients {
    pub gp_multipliers: DimensionMap,
    pub warm_rule: String,
    pub lambda: f64,
}

/// A search-grounding source returned out-of-band by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GroundingCitation {
    pub title: String,
    pub uri: String,
}

/// Hybrid weighting details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SourceAnalysis {
    pub local_confidence: f64,
    pub online_confidence: f64,
    /// Mean omega actually applied; 0.0 for local-only results.
    pub blending_coefficient: f64,
    /// Engine-owned; a provider echo is ignored on decode.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub omega: Option<OmegaVector>,
    #[serde(default)]
    pub conflict_notes: String,
    #[serde(default, deserialize_with = "consensus::deserialize_lenient")]
    pub consensus_reliability: Option<ConsensusReliability>,
    #[serde(default)]
    pub bandwagon_penalty_detected: bool,
    #[serde(default)]
    pub moral_controversy_factor: f64,
    /// Provider judgment: ethics, violence or politics themes present.
    #[serde(default)]
    pub sensitive_themes: bool,
    /// Provider-supplied shift toward online data for older works.
    #[serde(default)]
    pub age_factor: f64,
}

impl AnalysisResult {
    /// Strictly decode a provider payload.
    pub fn decode(value: Value) -> Result<Self, DecodeError> {
        if !value.is_object() {
            return Err(DecodeError::NotJson("expected a JSON object".to_string()));
        }
        let result: AnalysisResult =
            serde_json::from_value(value).map_err(|e| DecodeError::Schema(e.to_string()))?;
        result.validate()?;
        Ok(result)
    }

    /// Strictly decode a payload that must be pure JSON text.
    pub fn decode_str(text: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|e| DecodeError::NotJson(e.to_string()))?;
        Self::decode(value)
    }

    fn validate(&self) -> Result<(), DecodeError> {
        let sa = &self.source_analysis;
        unit_interval("source_analysis.local_confidence", sa.local_confidence)?;
        unit_interval("source_analysis.online_confidence", sa.online_confidence)?;
        unit_interval("source_analysis.moral_controversy_factor", sa.moral_controversy_factor)?;
        if !sa.blending_coefficient.is_finite() {
            return Err(DecodeError::NotFinite {
                field: "source_analysis.blending_coefficient",
            });
        }
        if !sa.age_factor.is_finite() {
            return Err(DecodeError::NotFinite {
                field: "source_analysis.age_factor",
            });
        }
        Ok(())
    }

    /// Normalize a freshly decoded local-stage payload: the reported scores
    /// become the local baseline, online data and omega are cleared.
    pub fn into_local_stage(mut self) -> Self {
        self.scores_local = Some(self.scores_local.unwrap_or(self.scores));
        self.scores_online = None;
        self.grounding_urls.clear();
        self.abbf = None;
        self.source_analysis.blending_coefficient = 0.0;
        self.source_analysis.omega = None;
        self.source_analysis.bandwagon_penalty_detected = false;
        self.source_analysis.conflict_notes = PENDING_VERIFICATION_NOTE.to_string();
        self
    }

    /// Normalize a freshly decoded hybrid-stage payload against the local
    /// result it was built from. The provider's echo of `scores_local` is
    /// not guaranteed, so the prior baseline is carried forward when missing.
    pub fn into_hybrid_stage(mut self, prior: &AnalysisResult, citations: Vec<GroundingCitation>) -> Self {
        if self.scores_local.is_none() {
            self.scores_local = prior.scores_local.or(Some(prior.scores));
        }
        if !citations.is_empty() {
            self.grounding_urls = citations;
        }
        self.abbf = None;
        self
    }

    /// Engine inputs taken from this payload.
    pub fn abbf_inputs(&self) -> AbbfInputs {
        let sa = &self.source_analysis;
        AbbfInputs {
            local: self.scores_local,
            online: self.scores_online,
            consensus_reliability: sa.consensus_reliability,
            sensitive_themes: sa.sensitive_themes,
            moral_controversy_factor: sa.moral_controversy_factor,
            age_factor: sa.age_factor,
            threshold: self.signals,
        }
    }

    /// Replace every engine-owned field with the reconciliation outcome.
    pub fn with_reconciliation(mut self, report: AbbfReport) -> Self {
        self.scores = report.scores;
        self.scores_local = Some(report.scores_local);
        self.scores_online = report.scores_online;
        self.indices.s_adj = report.s_adj;
        self.verdict = report.threshold.verdict;
        self.verdict_basis = report.threshold.verdict_basis;

        let sa = &mut self.source_analysis;
        sa.blending_coefficient = report.blending_coefficient;
        sa.omega = report.omega;
        if report.consensus_reliability.is_some() {
            sa.consensus_reliability = report.consensus_reliability;
        }
        if let Some(signal) = &report.controversy {
            sa.bandwagon_penalty_detected = signal.is_bandwagon;
            sa.moral_controversy_factor = signal.moral_controversy_factor;
        }

        self.abbf = Some(report);
        self
    }

    pub fn is_hybrid(&self) -> bool {
        self.scores_online.is_some()
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), DecodeError> {
    if !value.is_finite() {
        return Err(DecodeError::NotFinite { field });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(DecodeError::UnitIntervalViolation { field, value });
    }
    Ok(())
}
