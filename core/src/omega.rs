use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::bandwagon::ControversySignal;
use crate::error::ScoreError;
use crate::scores::{Dimension, DimensionClass};

pub const OMEGA_MIN: f64 = 0.1;
pub const OMEGA_MAX: f64 = 0.9;

/// Tunables of the omega resolver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OmegaPolicy {
    /// Added to the objective dimensions C and U.
    pub objective_tilt: f64,
    /// Partial taboo tax per unit of moral controversy on E, A, R.
    pub penalty_scale: f64,
    /// Forced omega for E, A, R when a bandwagon penalty is detected.
    pub override_value: f64,
}

impl Default for OmegaPolicy {
    fn default() -> Self {
        Self {
            objective_tilt: 0.05,
            penalty_scale: 0.3,
            override_value: OMEGA_MIN,
        }
    }
}

/// Where a dimension's omega came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OmegaSource {
    BandwagonOverride {
        value: f64,
    },
    Computed {
        base: f64,
        age_factor: f64,
        tilt: f64,
        penalty: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedOmega {
    pub dimension: Dimension,
    /// Value before clamping.
    pub raw: f64,
    pub value: f64,
    pub clamped: bool,
    pub source: OmegaSource,
}

/// Resolve the blending coefficient of one dimension.
///
/// `signal` is `None` when no controversy analysis is available; the
/// dimension then gets base + age + tilt only.
pub fn resolve_omega(
    dimension: Dimension,
    base_omega: f64,
    age_factor: f64,
    signal: Option<&ControversySignal>,
    policy: &OmegaPolicy,
) -> ResolvedOmega {
    let class = dimension.class();
    let overridden = class == DimensionClass::Subjective && signal.is_some_and(|s| s.is_bandwagon);

    let (raw, source) = if overridden {
        (
            policy.override_value,
            OmegaSource::BandwagonOverride {
                value: policy.override_value,
            },
        )
    } else {
        let tilt = if class == DimensionClass::Objective {
            policy.objective_tilt
        } else {
            0.0
        };
        let penalty = match (class, signal) {
            (DimensionClass::Subjective, Some(s)) => s.moral_controversy_factor * policy.penalty_scale,
            _ => 0.0,
        };
        (
            base_omega + age_factor + tilt - penalty,
            OmegaSource::Computed {
                base: base_omega,
                age_factor,
                tilt,
                penalty,
            },
        )
    };

    let value = clamp_omega(raw);
    ResolvedOmega {
        dimension,
        raw,
        value,
        clamped: value != raw,
        source,
    }
}

/// Clamp into [0.1, 0.9]. NaN lands on the lower bound, infinities on the
/// matching bound.
pub fn clamp_omega(raw: f64) -> f64 {
    if raw.is_nan() {
        OMEGA_MIN
    } else {
        raw.clamp(OMEGA_MIN, OMEGA_MAX)
    }
}

/// Per-dimension blending coefficients, each in [0.1, 0.9].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct OmegaVector {
    #[serde(rename = "E")]
    e: f64,
    #[serde(rename = "A")]
    a: f64,
    #[serde(rename = "C")]
    c: f64,
    #[serde(rename = "O")]
    o: f64,
    #[serde(rename = "U")]
    u: f64,
    #[serde(rename = "R")]
    r: f64,
}

impl OmegaVector {
    /// Resolve all six dimensions at once.
    pub fn resolve(
        base_omega: f64,
        age_factor: f64,
        signal: Option<&ControversySignal>,
        policy: &OmegaPolicy,
    ) -> (Self, Vec<ResolvedOmega>) {
        let resolved: Vec<ResolvedOmega> = Dimension::ALL
            .into_iter()
            .map(|d| resolve_omega(d, base_omega, age_factor, signal, policy))
            .collect();
        let vector = Self::from_fn(|d| {
            resolved
                .iter()
                .find(|r| r.dimension == d)
                .map_or(OMEGA_MIN, |r| r.value)
        });
        (vector, resolved)
    }

    /// Clamping constructor; always yields a valid vector.
    pub fn from_fn(mut value_of: impl FnMut(Dimension) -> f64) -> Self {
        let mut c = |d| clamp_omega(value_of(d));
        Self {
            e: c(Dimension::E),
            a: c(Dimension::A),
            c: c(Dimension::C),
            o: c(Dimension::O),
            u: c(Dimension::U),
            r: c(Dimension::R),
        }
    }

    /// Validating constructor for externally supplied coefficients.
    pub fn try_from_fn(mut value_of: impl FnMut(Dimension) -> f64) -> Result<Self, ScoreError> {
        let mut values = [0.0; 6];
        for (slot, dimension) in values.iter_mut().zip(Dimension::ALL) {
            let value = value_of(dimension);
            if !value.is_finite() || !(OMEGA_MIN..=OMEGA_MAX).contains(&value) {
                return Err(ScoreError::OmegaOutOfRange { dimension, value });
            }
            *slot = value;
        }
        let [e, a, c, o, u, r] = values;
        Ok(Self { e, a, c, o, u, r })
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::E => self.e,
            Dimension::A => self.a,
            Dimension::C => self.c,
            Dimension::O => self.o,
            Dimension::U => self.u,
            Dimension::R => self.r,
        }
    }

    /// Arithmetic mean, published as the single `blending_coefficient`.
    pub fn mean(&self) -> f64 {
        let sum: f64 = Dimension::ALL.iter().map(|&d| self.get(d)).sum();
        sum / Dimension::ALL.len() as f64
    }
}

#[derive(Deserialize)]
struct RawOmega {
    #[serde(rename = "E")]
    e: f64,
    #[serde(rename = "A")]
    a: f64,
    #[serde(rename = "C")]
    c: f64,
    #[serde(rename = "O")]
    o: f64,
    #[serde(rename = "U")]
    u: f64,
    #[serde(rename = "R")]
    r: f64,
}

impl<'de> Deserialize<'de> for OmegaVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawOmega::deserialize(deserializer)?;
        OmegaVector::try_from_fn(|d| match d {
            Dimension::E => raw.e,
            Dimension::A => raw.a,
            Dimension::C => raw.c,
            Dimension::O => raw.o,
            Dimension::U => raw.u,
            Dimension::R => raw.r,
        })
        .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(is_bandwagon: bool, factor: f64) -> ControversySignal {
        ControversySignal {
            is_bandwagon,
            moral_controversy_factor: factor,
            diverging: Vec::new(),
        }
    }

    #[test]
    fn policy_defaults_round_trip_through_json() {
        let policy = OmegaPolicy::default();
        assert_eq!(policy.objective_tilt, 0.05);
        assert_eq!(policy.penalty_scale, 0.3);
        assert_eq!(policy.override_value, OMEGA_MIN);

        let value = serde_json::to_value(policy).unwrap();
        assert_eq!(value["penalty_scale"], 0.3);
        let back: OmegaPolicy = serde_json::from_value(value).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn bandwagon_forces_subjective_dimensions_to_override() {
        let policy = OmegaPolicy::default();
        let (omega, resolved) = OmegaVector::resolve(0.8, 0.0, Some(&signal(true, 0.8)), &policy);

        for d in [Dimension::E, Dimension::A, Dimension::R] {
            assert_eq!(omega.get(d), 0.1, "{d}");
        }
        // objective dimensions keep the consensus-derived base plus tilt
        assert!((omega.get(Dimension::C) - 0.85).abs() < 1e-12);
        assert!((omega.get(Dimension::U) - 0.85).abs() < 1e-12);
        assert!((omega.get(Dimension::O) - 0.8).abs() < 1e-12);

        let a = resolved.iter().find(|r| r.dimension == Dimension::A).unwrap();
        assert_eq!(a.source, OmegaSource::BandwagonOverride { value: 0.1 });
    }

    #[test]
    fn partial_taboo_tax_scales_with_controversy() {
        let policy = OmegaPolicy::default();
        let resolved = resolve_omega(Dimension::E, 0.6, 0.0, Some(&signal(false, 0.5)), &policy);
        assert!((resolved.value - 0.45).abs() < 1e-12);
        assert!(!resolved.clamped);

        let objective = resolve_omega(Dimension::C, 0.6, 0.0, Some(&signal(false, 0.5)), &policy);
        assert!((objective.value - 0.65).abs() < 1e-12);
    }

    #[test]
    fn age_factor_shifts_every_computed_dimension() {
        let policy = OmegaPolicy::default();
        let (omega, _) = OmegaVector::resolve(0.6, 0.1, None, &policy);
        assert!((omega.get(Dimension::O) - 0.7).abs() < 1e-12);
        assert!((omega.get(Dimension::E) - 0.7).abs() < 1e-12);
        assert!((omega.get(Dimension::U) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn extreme_inputs_stay_inside_clamp_bounds() {
        let policy = OmegaPolicy::default();
        let extremes = [
            (0.8, 5.0, signal(false, 0.0)),
            (0.3, -5.0, signal(false, 1.0)),
            (0.3, f64::NAN, signal(false, 1.0)),
            (0.8, f64::INFINITY, signal(true, 1.0)),
            (0.3, f64::NEG_INFINITY, signal(false, 0.0)),
        ];
        for (base, age, s) in extremes {
            let (omega, resolved) = OmegaVector::resolve(base, age, Some(&s), &policy);
            for d in Dimension::ALL {
                let value = omega.get(d);
                assert!((OMEGA_MIN..=OMEGA_MAX).contains(&value), "{d} = {value}");
            }
            assert!(resolved.iter().all(|r| (OMEGA_MIN..=OMEGA_MAX).contains(&r.value)));
        }
    }

    #[test]
    fn clamping_is_reported() {
        let policy = OmegaPolicy::default();
        let resolved = resolve_omega(Dimension::U, 0.8, 0.2, None, &policy);
        assert_eq!(resolved.value, OMEGA_MAX);
        assert!(resolved.clamped);
    }

    #[test]
    fn external_omega_outside_range_is_rejected() {
        let ok = serde_json::from_str::<OmegaVector>(
            r#"{"E":0.1,"A":0.1,"C":0.85,"O":0.8,"U":0.85,"R":0.1}"#,
        );
        assert!(ok.is_ok());

        let bad = serde_json::from_str::<OmegaVector>(
            r#"{"E":0.0,"A":0.1,"C":0.85,"O":0.8,"U":0.85,"R":0.1}"#,
        );
        assert!(bad.unwrap_err().to_string().contains("outside [0.1, 0.9]"));
    }

    #[test]
    fn mean_is_the_published_blending_coefficient() {
        let omega = OmegaVector::from_fn(|d| if d == Dimension::E { 0.3 } else { 0.6 });
        assert!((omega.mean() - 0.55).abs() < 1e-12);
    }
}
