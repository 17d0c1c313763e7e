//! Taboo-tax detection: online subjective scores dragged down by moral panic
//! or review bombing on works with sensitive themes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::scores::{Dimension, ScoreVector};

/// Local subjective score must exceed this for the divergence to count.
pub const LOCAL_FLOOR: f64 = 4.0;
/// Online subjective score must fall below this for the divergence to count.
pub const ONLINE_CEILING: f64 = 3.0;

/// Dimensions whose local/online divergence is inspected.
const PROBED: [Dimension; 2] = [Dimension::A, Dimension::E];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ControversySignal {
    pub is_bandwagon: bool,
    /// Provider-reported severity in [0, 1]; feeds the partial taboo tax.
    pub moral_controversy_factor: f64,
    /// Subjective dimensions that showed the local-high / online-low split.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diverging: Vec<Dimension>,
}

/// Flag a bandwagon penalty when A or E is rated high locally but low online
/// and the provider reported sensitive themes (ethics, violence, politics).
pub fn detect_bandwagon(
    local: &ScoreVector,
    online: &ScoreVector,
    sensitive_themes: bool,
    moral_controversy_factor: f64,
) -> ControversySignal {
    let diverging: Vec<Dimension> = PROBED
        .into_iter()
        .filter(|&d| local.get(d) > LOCAL_FLOOR && online.get(d) < ONLINE_CEILING)
        .collect();

    ControversySignal {
        is_bandwagon: sensitive_themes && !diverging.is_empty(),
        moral_controversy_factor: clamp_unit(moral_controversy_factor),
        diverging,
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
