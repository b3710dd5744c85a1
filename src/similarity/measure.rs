//! Configured comparison measures and their sort direction.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::vector::{distance, similarity};
use crate::error::VectorError;

/// Whether lower or higher scores mean "closer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    /// Lower is closer; sorted ascending
    Distance,
    /// Higher is closer; sorted descending
    Similarity,
}

impl MeasureKind {
    /// Column name used for the score in ranked views.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureKind::Distance => "distance",
            MeasureKind::Similarity => "similarity",
        }
    }

    /// Order two scores so that the closest document sorts first.
    pub fn compare(&self, a: f32, b: f32) -> Ordering {
        match self {
            MeasureKind::Distance => a.total_cmp(&b),
            MeasureKind::Similarity => b.total_cmp(&a),
        }
    }
}

/// A scoring function paired with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    EuclideanDistance,
    #[default]
    CosineSimilarity,
}

impl Measure {
    pub fn kind(&self) -> MeasureKind {
        match self {
            Measure::EuclideanDistance => MeasureKind::Distance,
            Measure::CosineSimilarity => MeasureKind::Similarity,
        }
    }

    /// Score `a` against `b`.
    pub fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
        match self {
            Measure::EuclideanDistance => distance(a, b),
            Measure::CosineSimilarity => similarity(a, b),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::EuclideanDistance => write!(f, "euclidean_distance"),
            Measure::CosineSimilarity => write!(f, "cosine_similarity"),
        }
    }
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean_distance" | "euclidean" | "distance" => Ok(Measure::EuclideanDistance),
            "cosine_similarity" | "cosine" | "similarity" => Ok(Measure::CosineSimilarity),
            other => Err(format!(
                "unknown measure '{}' (expected 'distance' or 'similarity')",
                other
            )),
        }
    }
}
