use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::error::ScoreError;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 5.0;
pub const SCORE_STEP: f64 = 0.5;

// Absorbs float drift so that e.g. 3.2499999999 still counts as a 3.25 tie.
const GRID_EPSILON: f64 = 1e-9;

/// One of the six critique dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Dimension {
    /// Logos: argument depth, structural rigor, self-consistency.
    E,
    /// Pathos: emotional density, character arcs.
    A,
    /// Techne: craft, pacing, medium-specific execution.
    C,
    /// Originality: novelty or substantiated reinterpretation.
    O,
    /// Unity: narrative coherence, closure of the ending.
    U,
    /// Resonance: memorability, after-effect, re-read value.
    R,
}

/// How crowds and the local model are trusted on a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionClass {
    /// Thematic judgment; exposed to moral-panic distortion (E, A, R).
    Subjective,
    /// Visible production quality; crowds detect defects reliably (C, U).
    Objective,
    /// Neither (O).
    Neutral,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::E,
        Dimension::A,
        Dimension::C,
        Dimension::O,
        Dimension::U,
        Dimension::R,
    ];

    pub fn class(self) -> DimensionClass {
        match self {
            Dimension::E | Dimension::A | Dimension::R => DimensionClass::Subjective,
            Dimension::C | Dimension::U => DimensionClass::Objective,
            Dimension::O => DimensionClass::Neutral,
        }
    }

    /// Base weight used for the headline index S_adj. The weights sum to 1.0.
    pub fn base_weight(self) -> f64 {
        match self {
            Dimension::E => 0.25,
            Dimension::A => 0.25,
            Dimension::C => 0.20,
            Dimension::O => 0.15,
            Dimension::U => 0.10,
            Dimension::R => 0.05,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Dimension::E => "E",
            Dimension::A => "A",
            Dimension::C => "C",
            Dimension::O => "O",
            Dimension::U => "U",
            Dimension::R => "R",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Dimension::E => "Logos: thematic depth, argument logic, structural precision, self-consistency",
            Dimension::A => "Pathos: emotional density, dimensional characters, character arcs, empathy threshold",
            Dimension::C => "Techne: prose/camera language, pacing, foreshadowing payoff, use of the medium",
            Dimension::O => "Originality: first-of-its-kind ideas, reinterpretation of old forms, genre crossing",
            Dimension::U => "Unity: narrative coherence, closure of the ending, multiple threads in sync",
            Dimension::R => "Resonance: memory anchors, urge to revisit, imagery, lasting after-effect",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Round to the nearest 0.5 grid point; exact ties go up.
pub fn round_to_step(value: f64) -> f64 {
    ((value / SCORE_STEP) + 0.5 + GRID_EPSILON).floor() * SCORE_STEP
}

/// Six dimension scores on the 0–5 scale in 0.5 steps.
///
/// A `ScoreVector` can only be obtained through [`ScoreVector::try_new`],
/// [`ScoreVector::uniform`] or deserialization, all of which reject values
/// outside [0, 5] and snap the rest onto the 0.5 grid. There are no setters:
/// every stage produces a fresh vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ScoreVector {
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

impl ScoreVector {
    pub fn try_new(e: f64, a: f64, c: f64, o: f64, u: f64, r: f64) -> Result<Self, ScoreError> {
        Self::try_from_fn(|d| match d {
            Dimension::E => e,
            Dimension::A => a,
            Dimension::C => c,
            Dimension::O => o,
            Dimension::U => u,
            Dimension::R => r,
        })
    }

    /// Build a vector by evaluating `value_of` once per dimension.
    pub fn try_from_fn(mut value_of: impl FnMut(Dimension) -> f64) -> Result<Self, ScoreError> {
        let mut values = [0.0; 6];
        for (slot, dimension) in values.iter_mut().zip(Dimension::ALL) {
            *slot = normalize_score(dimension, value_of(dimension))?;
        }
        let [e, a, c, o, u, r] = values;
        Ok(Self { e, a, c, o, u, r })
    }

    /// Snap and clamp arbitrary values; used for engine-computed blends whose
    /// inputs were already validated.
    pub(crate) fn from_fn_saturating(mut value_of: impl FnMut(Dimension) -> f64) -> Self {
        let mut snap = |d| {
            let value = value_of(d);
            if value.is_nan() {
                SCORE_MIN
            } else {
                round_to_step(value).clamp(SCORE_MIN, SCORE_MAX)
            }
        };
        Self {
            e: snap(Dimension::E),
            a: snap(Dimension::A),
            c: snap(Dimension::C),
            o: snap(Dimension::O),
            u: snap(Dimension::U),
            r: snap(Dimension::R),
        }
    }

    pub fn uniform(value: f64) -> Result<Self, ScoreError> {
        Self::try_from_fn(|_| value)
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

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    /// Base-weight dot product, rounded to two decimals.
    pub fn weighted_index(&self) -> f64 {
        let sum: f64 = self.iter().map(|(d, v)| d.base_weight() * v).sum();
        (sum * 100.0).round() / 100.0
    }
}

fn normalize_score(dimension: Dimension, value: f64) -> Result<f64, ScoreError> {
    if !value.is_finite() {
        return Err(ScoreError::NotFinite { dimension, value });
    }
    if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
        return Err(ScoreError::OutOfRange { dimension, value });
    }
    Ok(round_to_step(value).clamp(SCORE_MIN, SCORE_MAX))
}

#[derive(Deserialize)]
struct RawScores {
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

impl<'de> Deserialize<'de> for ScoreVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawScores::deserialize(deserializer)?;
        ScoreVector::try_new(raw.e, raw.a, raw.c, raw.o, raw.u, raw.r)
            .map_err(serde::de::Error::custom)
    }
}
