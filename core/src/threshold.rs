use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::scores::{Dimension, ScoreVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Verdict {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::In => "IN",
            Verdict::Out => "OUT",
        })
    }
}

/// Published verdict basis. The flavor channel is reported as `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum VerdictBasis {
    A,
    B,
    C,
}

impl fmt::Display for VerdictBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerdictBasis::A => "A",
            VerdictBasis::B => "B",
            VerdictBasis::C => "C",
        })
    }
}

/// The concrete rule that admitted a work, kept for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdRule {
    /// Basis A: E ≥ 4.5, U ≥ 4.0, O ≥ 4.0 or substantiated reinterpretation.
    RationalPeak,
    /// Basis B: A ≥ 4.5, U ≥ 4.0, O ≥ 4.0 or substantiated reinterpretation.
    EmotionalPeak,
    /// Basis B′: R ≥ 4.5, U ≥ 4.0, C ≥ 4.5 or A ≥ 4.0, O ≥ 3.5 or stable mechanism.
    FlavorChannel,
    /// Basis C: E ≥ 4.0, A ≥ 4.0, C ≥ 4.5, U ≥ 4.2.
    DualPeak,
}

impl ThresholdRule {
    /// Evaluation order; the first satisfied rule wins.
    pub const ORDER: [ThresholdRule; 4] = [
        ThresholdRule::RationalPeak,
        ThresholdRule::EmotionalPeak,
        ThresholdRule::FlavorChannel,
        ThresholdRule::DualPeak,
    ];

    pub fn basis(self) -> VerdictBasis {
        match self {
            ThresholdRule::RationalPeak => VerdictBasis::A,
            ThresholdRule::EmotionalPeak | ThresholdRule::FlavorChannel => VerdictBasis::B,
            ThresholdRule::DualPeak => VerdictBasis::C,
        }
    }

    fn matches(self, scores: &ScoreVector, signals: ThresholdSignals) -> bool {
        let s = |d| scores.get(d);
        let originality_or_reinterpretation =
            s(Dimension::O) >= 4.0 || signals.substantiated_reinterpretation;
        match self {
            ThresholdRule::RationalPeak => {
                s(Dimension::E) >= 4.5 && s(Dimension::U) >= 4.0 && originality_or_reinterpretation
            }
            ThresholdRule::EmotionalPeak => {
                s(Dimension::A) >= 4.5 && s(Dimension::U) >= 4.0 && originality_or_reinterpretation
            }
            ThresholdRule::FlavorChannel => {
                s(Dimension::R) >= 4.5
                    && s(Dimension::U) >= 4.0
                    && (s(Dimension::C) >= 4.5 || s(Dimension::A) >= 4.0)
                    && (s(Dimension::O) >= 3.5 || signals.stable_mechanism)
            }
            ThresholdRule::DualPeak => {
                s(Dimension::E) >= 4.0
                    && s(Dimension::A) >= 4.0
                    && s(Dimension::C) >= 4.5
                    && s(Dimension::U) >= 4.2
            }
        }
    }
}

/// Opaque boolean judgments supplied by the analysis provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ThresholdSignals {
    #[serde(default)]
    pub substantiated_reinterpretation: bool,
    #[serde(default)]
    pub stable_mechanism: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ThresholdOutcome {
    pub verdict: Verdict,
    pub verdict_basis: Option<VerdictBasis>,
    pub matched_rule: Option<ThresholdRule>,
}

/// Decide IN/OUT for a score vector. Pure; first matching rule wins.
pub fn evaluate(scores: &ScoreVector, signals: ThresholdSignals) -> ThresholdOutcome {
    match ThresholdRule::ORDER
        .into_iter()
        .find(|rule| rule.matches(scores, signals))
    {
        Some(rule) => ThresholdOutcome {
            verdict: Verdict::In,
            verdict_basis: Some(rule.basis()),
            matched_rule: Some(rule),
        },
        None => ThresholdOutcome {
            verdict: Verdict::Out,
            verdict_basis: None,
            matched_rule: None,
        },
    }
}
