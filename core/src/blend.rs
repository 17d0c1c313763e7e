//! ABBF (Adaptive Bayesian-Bandwagon Filtering) score reconciliation.
//!
//! `reconcile` runs the full pipeline: consensus → bandwagon detection →
//! omega resolution → blending → threshold evaluation, and returns the final
//! vector together with a per-dimension audit trail.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::bandwagon::{ControversySignal, detect_bandwagon};
use crate::consensus::{self, ConsensusReliability};
use crate::error::EngineError;
use crate::omega::{OmegaPolicy, OmegaSource, OmegaVector, ResolvedOmega};
use crate::scores::{Dimension, ScoreVector};
use crate::threshold::{self, ThresholdOutcome, ThresholdSignals};

/// How the final vector is produced.
#[derive(Debug, Clone, Copy)]
pub enum BlendMode<'a> {
    /// No online evidence: the local vector is the final vector.
    LocalOnly,
    Hybrid {
        online: &'a ScoreVector,
        omega: &'a OmegaVector,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendOutcome {
    pub scores: ScoreVector,
    /// `None` in local-only mode, where the effective omega is 0 everywhere.
    pub omega: Option<OmegaVector>,
    pub s_adj: f64,
}

/// `final[d] = local[d]·(1−ω[d]) + online[d]·ω[d]`, snapped to the 0.5 grid.
pub fn blend(local: Option<&ScoreVector>, mode: BlendMode<'_>) -> Result<BlendOutcome, EngineError> {
    let local = local.ok_or(EngineError::MissingLocalBaseline)?;

    let (scores, omega) = match mode {
        BlendMode::LocalOnly => (*local, None),
        BlendMode::Hybrid { online, omega } => {
            let blended = ScoreVector::from_fn_saturating(|d| blend_dimension(local, online, omega, d));
            (blended, Some(*omega))
        }
    };

    Ok(BlendOutcome {
        s_adj: scores.weighted_index(),
        scores,
        omega,
    })
}

fn raw_blend(local: f64, online: f64, omega: f64) -> f64 {
    local * (1.0 - omega) + online * omega
}

fn blend_dimension(local: &ScoreVector, online: &ScoreVector, omega: &OmegaVector, d: Dimension) -> f64 {
    raw_blend(local.get(d), online.get(d), omega.get(d))
}

/// Everything the engine needs for one reconciliation.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AbbfInputs {
    pub local: Option<ScoreVector>,
    #[serde(default)]
    pub online: Option<ScoreVector>,
    #[serde(default, deserialize_with = "consensus::deserialize_lenient")]
    pub consensus_reliability: Option<ConsensusReliability>,
    #[serde(default)]
    pub sensitive_themes: bool,
    #[serde(default)]
    pub moral_controversy_factor: f64,
    #[serde(default)]
    pub age_factor: f64,
    #[serde(default, flatten)]
    pub threshold: ThresholdSignals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DimensionAudit {
    pub dimension: Dimension,
    pub local: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<f64>,
    /// Effective omega; 0.0 in local-only mode.
    pub omega: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omega_source: Option<OmegaSource>,
    pub omega_clamped: bool,
    /// Blend before grid rounding.
    pub raw: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AbbfReport {
    pub scores: ScoreVector,
    pub scores_local: ScoreVector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores_online: Option<ScoreVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omega: Option<OmegaVector>,
    /// Mean omega; 0.0 in local-only mode.
    pub blending_coefficient: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_reliability: Option<ConsensusReliability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_omega: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controversy: Option<ControversySignal>,
    pub s_adj: f64,
    pub threshold: ThresholdOutcome,
    pub dimensions: Vec<DimensionAudit>,
}

/// Run the full ABBF pipeline.
pub fn reconcile(inputs: &AbbfInputs, policy: &OmegaPolicy) -> Result<AbbfReport, EngineError> {
    let local = inputs.local.as_ref().ok_or(EngineError::MissingLocalBaseline)?;
    if !inputs.age_factor.is_finite() {
        return Err(EngineError::AgeFactorNotFinite(inputs.age_factor));
    }
    let factor = inputs.moral_controversy_factor;
    if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
        return Err(EngineError::ControversyOutOfRange(factor));
    }

    let Some(online) = inputs.online.as_ref() else {
        let outcome = blend(Some(local), BlendMode::LocalOnly)?;
        let dimensions = local
            .iter()
            .map(|(dimension, value)| DimensionAudit {
                dimension,
                local: value,
                online: None,
                omega: 0.0,
                omega_source: None,
                omega_clamped: false,
                raw: value,
                final_score: value,
            })
            .collect();
        return Ok(AbbfReport {
            threshold: threshold::evaluate(&outcome.scores, inputs.threshold),
            scores: outcome.scores,
            scores_local: *local,
            scores_online: None,
            omega: None,
            blending_coefficient: 0.0,
            consensus_reliability: None,
            base_omega: None,
            controversy: None,
            s_adj: outcome.s_adj,
            dimensions,
        });
    };

    let base = consensus::base_omega(inputs.consensus_reliability);
    let signal = detect_bandwagon(local, online, inputs.sensitive_themes, factor);
    let (omega, resolved) = OmegaVector::resolve(base, inputs.age_factor, Some(&signal), policy);
    let outcome = blend(Some(local), BlendMode::Hybrid { online, omega: &omega })?;

    let dimensions = resolved
        .iter()
        .map(|r| audit_dimension(r, local, online, &outcome.scores))
        .collect();

    Ok(AbbfReport {
        threshold: threshold::evaluate(&outcome.scores, inputs.threshold),
        scores: outcome.scores,
        scores_local: *local,
        scores_online: Some(*online),
        blending_coefficient: omega.mean(),
        omega: Some(omega),
        consensus_reliability: inputs.consensus_reliability,
        base_omega: Some(base),
        controversy: Some(signal),
        s_adj: outcome.s_adj,
        dimensions,
    })
}

fn audit_dimension(
    resolved: &ResolvedOmega,
    local: &ScoreVector,
    online: &ScoreVector,
    blended: &ScoreVector,
) -> DimensionAudit {
    let d = resolved.dimension;
    DimensionAudit {
        dimension: d,
        local: local.get(d),
        online: Some(online.get(d)),
        omega: resolved.value,
        omega_source: Some(resolved.source),
        omega_clamped: resolved.clamped,
        raw: raw_blend(local.get(d), online.get(d), resolved.value),
        final_score: blended.get(d),
    }
}
