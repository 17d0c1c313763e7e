use clap::Args;
use serde::Serialize;
use xcrit_core::threshold::evaluate;
use xcrit_core::{ScoreVector, ThresholdOutcome, ThresholdSignals};

use crate::util::{EXIT_USAGE, print_json, report_error};

#[derive(Args, Clone)]
pub struct EvaluateArgs {
    /// Score vector as JSON, e.g. '{"E":4.5,"A":3,"C":4,"O":4,"U":4,"R":3}'
    #[arg(long)]
    pub scores: String,

    /// The provider substantiated a reinterpretation of the work
    #[arg(long)]
    pub reinterpretation: bool,

    /// The work has a stable core mechanism
    #[arg(long)]
    pub stable_mechanism: bool,
}

#[derive(Serialize)]
struct EvaluateOutput {
    scores: ScoreVector,
    /// Weighted index S over the snapped scores.
    weighted_index: f64,
    #[serde(flatten)]
    outcome: ThresholdOutcome,
}

pub fn run(args: EvaluateArgs) -> i32 {
    let scores = match parse_scores(&args.scores) {
        Ok(scores) => scores,
        Err(message) => {
            report_error(
                "validation_failed",
                &message,
                Some("Provide all six dimensions E, A, C, O, U, R on the 0-5 scale."),
            );
            return EXIT_USAGE;
        }
    };

    let signals = ThresholdSignals {
        substantiated_reinterpretation: args.reinterpretation,
        stable_mechanism: args.stable_mechanism,
    };
    print_json(&EvaluateOutput {
        scores,
        weighted_index: scores.weighted_index(),
        outcome: evaluate(&scores, signals),
    })
}

fn parse_scores(raw: &str) -> Result<ScoreVector, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid --scores: {e}"))
}
