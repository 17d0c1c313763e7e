use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// How trustworthy the online score distribution is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ConsensusReliability {
    /// Scores are concentrated; opinions agree.
    High,
    /// Disagreement exists but stays within a usable band.
    Medium,
    /// Polarized, bimodal ratings (1-vs-10 clusters).
    Low,
}

pub const HIGH_BASE_OMEGA: f64 = 0.8;
pub const MEDIUM_BASE_OMEGA: f64 = 0.6;
pub const LOW_BASE_OMEGA: f64 = 0.3;

impl ConsensusReliability {
    /// Parse the provider's free-text label. Accepts case variations and
    /// decorated forms such as `"Low (Polarizing)"`.
    pub fn parse_label(label: &str) -> Option<Self> {
        let head = label
            .trim()
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|part| !part.is_empty())?
            .to_ascii_lowercase();
        match head.as_str() {
            "high" => Some(Self::High),
            "medium" | "mid" | "moderate" => Some(Self::Medium),
            "low" | "polarizing" | "polarized" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn base_omega(self) -> f64 {
        match self {
            Self::High => HIGH_BASE_OMEGA,
            Self::Medium => MEDIUM_BASE_OMEGA,
            Self::Low => LOW_BASE_OMEGA,
        }
    }
}

/// Base omega for a (possibly missing) classification. Missing falls back to
/// the balanced Medium blend.
pub fn base_omega(reliability: Option<ConsensusReliability>) -> f64 {
    reliability
        .unwrap_or(ConsensusReliability::Medium)
        .base_omega()
}

/// Serde adapter: unknown labels and non-string values decode as `None`
/// instead of failing the whole payload.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<ConsensusReliability>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(ConsensusReliability::parse_label))
}
