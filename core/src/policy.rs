//! The policy document sent to the analysis provider as its system
//! instruction. Weights, thresholds and ABBF constants are rendered from the
//! same items the engine evaluates with, so the provider and the engine can
//! never disagree about the published rules.

use std::fmt::Write;

use serde::Serialize;
use utoipa::ToSchema;

use crate::bandwagon::{LOCAL_FLOOR, ONLINE_CEILING};
use crate::consensus::{HIGH_BASE_OMEGA, LOW_BASE_OMEGA, MEDIUM_BASE_OMEGA};
use crate::omega::{OMEGA_MAX, OMEGA_MIN, OmegaPolicy};
use crate::scores::Dimension;

/// Conflict note stored on a local-only result until the hybrid pass runs.
pub const PENDING_VERIFICATION_NOTE: &str = "Pending online verification...";

const OUTPUT_SHAPE: &str = r#"{
  "verdict": "IN" | "OUT",
  "verdict_basis": "A" | "B" | "C" | null,
  "one_line_reason": "String",
  "title_localized": { "zh": "String", "en": "String", "ja": "String" },
  "scores": { "E": number, "A": number, "C": number, "O": number, "U": number, "R": number },
  "scores_local": { "E": number, "A": number, "C": number, "O": number, "U": number, "R": number },
  "scores_online": { "E": number, "A": number, "C": number, "O": number, "U": number, "R": number } | null,
  "indices": { "P": number, "D": number, "OI": number, "CI": number, "RI": number, "S": number, "S_adj": number },
  "highlights": [ { "tag": "String", "point": "String" } ],
  "risks": [ "String" ],
  "media_advice": { "platform": "String", "version": "String", "prereq": "String", "season_mood": "String" },
  "similar_recos": [ { "title": "String", "medium": "String", "similarity": number, "priority": number, "reason": "String" } ],
  "pk": { "comparators": [ { "title": "String", "medium": "String", "similarity": number, "scores": { ... }, "diff": { "dE": number, "dA": number, "dC": number, "dO": number, "dU": number, "dR": number }, "adv_component": number, "weight": number } ], "pk_raw": number, "pk_score": number, "lambda": number, "S_before": number, "S_after": number },
  "notes_needed_if_OUT": [ "String" ],
  "data_warning": "limited_corpus_fallback" | null,
  "genre_profile": { "detected": "String", "confidence": number },
  "coefficients": { "gp_multipliers": { "E": number, "A": number, "C": number, "O": number, "U": number, "R": number }, "warm_rule": "String", "lambda": number },
  "substantiated_reinterpretation": boolean,
  "stable_mechanism": boolean,
  "source_analysis": {
    "local_confidence": number,
    "online_confidence": number,
    "blending_coefficient": number,
    "conflict_notes": "String",
    "consensus_reliability": "High" | "Medium" | "Low",
    "bandwagon_penalty_detected": boolean,
    "moral_controversy_factor": number,
    "sensitive_themes": boolean,
    "age_factor": number
  }
}"#;

/// Render the full policy document for the given omega tunables.
pub fn policy_document(policy: &OmegaPolicy) -> String {
    let mut doc = String::new();

    doc.push_str("# X-Critical review protocol\n\n");
    doc.push_str(
        "Goal: recommend only works across VN, novel, manga and anime that are worth deep \
         reading because they reach an extreme in at least one dimension. Reject lukewarm, \
         merely competent works.\n\n",
    );
    doc.push_str("Determinism locks:\n");
    doc.push_str("* Rule-driven; no hedged answers.\n");
    doc.push_str("* Every threshold is evaluated on the 0.5-step grid.\n");
    doc.push_str("* Local judgment and online reception are verified separately.\n\n");

    doc.push_str("## Dimensions (0-5, mandatory 0.5 steps)\n");
    for d in Dimension::ALL {
        let _ = writeln!(doc, "* {d}: {}", d.description());
    }

    doc.push_str("\n## Extremity thresholds (any one admits)\n");
    doc.push_str("* A (rational peak): E >= 4.5 and U >= 4.0 and (O >= 4.0 or substantiated reinterpretation)\n");
    doc.push_str("* B (emotional peak): A >= 4.5 and U >= 4.0 and (O >= 4.0 or substantiated reinterpretation)\n");
    doc.push_str("* B' (flavor channel, reported as B): R >= 4.5 and U >= 4.0 and (C >= 4.5 or A >= 4.0) and (O >= 3.5 or stable mechanism)\n");
    doc.push_str("* C (dual peak): E >= 4.0 and A >= 4.0 and C >= 4.5 and U >= 4.2\n");
    doc.push_str("Report substantiated_reinterpretation and stable_mechanism as booleans.\n");

    doc.push_str("\n## Base weights (S and S_adj)\n");
    for d in Dimension::ALL {
        let _ = writeln!(doc, "* {d}: {:.2}", d.base_weight());
    }

    doc.push_str("\n## ABBF: adaptive Bayesian-bandwagon filtering\n");
    doc.push_str("Step 1, consensus reliability, judged from the distribution of online opinions:\n");
    let _ = writeln!(doc, "* High: concentrated scores -> omega_base = {HIGH_BASE_OMEGA}");
    let _ = writeln!(doc, "* Medium: disagreement within reason -> omega_base = {MEDIUM_BASE_OMEGA}");
    let _ = writeln!(
        doc,
        "* Low: polarized 1-vs-10 clusters -> omega_base = {LOW_BASE_OMEGA} (fall back to local judgment)"
    );
    doc.push_str("Step 2, bandwagon / moral penalty:\n");
    let _ = writeln!(
        doc,
        "* If local A or E > {LOCAL_FLOOR} but online A or E < {ONLINE_CEILING}, and the work \
         contains sensitive themes (ethics, violence, politics), a taboo tax is present: \
         omega for E, A and R is forced to {}.",
        policy.override_value
    );
    doc.push_str("* Objective dimensions C and U keep their omega: visible production defects still count.\n");
    doc.push_str("* Report sensitive_themes, moral_controversy_factor (0-1) and age_factor (numeric shift toward online data for older works).\n");
    doc.push_str("Step 3, final omega per dimension:\n");
    let _ = writeln!(
        doc,
        "* omega_d = clamp(omega_base + age_factor - controversy_penalty, {OMEGA_MIN}, {OMEGA_MAX}); \
         C and U lean upward by {}, E/A/R lose up to {} x moral_controversy_factor.",
        policy.objective_tilt, policy.penalty_scale
    );
    doc.push_str("Step 4, final score:\n");
    doc.push_str("* final(d) = local(d) x (1 - omega_d) + online(d) x omega_d, rounded to the nearest 0.5.\n");

    doc.push_str("\n## Output JSON\n");
    doc.push_str(OUTPUT_SHAPE);
    doc.push_str(
        "\n\nAll text fields must be written in the language requested by the user. \
         Output only the raw JSON object.\n",
    );
    doc
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WeightEntry {
    pub dimension: Dimension,
    pub weight: f64,
    pub description: String,
}

/// The weight table as structured data.
pub fn weight_table() -> Vec<WeightEntry> {
    Dimension::ALL
        .into_iter()
        .map(|dimension| WeightEntry {
            dimension,
            weight: dimension.base_weight(),
            description: dimension.description().to_string(),
        })
        .collect()
}
