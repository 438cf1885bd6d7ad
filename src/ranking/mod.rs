//! Ranking Engine
//!
//! Scores every candidate returned by a search against the wanted track and
//! orders them best-first. The total score is a weighted sum of independent
//! sub-scores (see [`factors`]); the named strategies only differ in the
//! weights they feed into that single combination.

pub mod factors;

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::protocol::{Candidate, TrackQuery};

/// Coefficients for each sub-score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub availability: f64,
    pub conditions: f64,
    pub quality: f64,
    pub musical: f64,
    pub metadata: f64,
    pub string_similarity: f64,
    /// Kept small so size only separates otherwise equal candidates
    pub tiebreaker: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        RankingStrategy::Balanced.weights()
    }
}

impl ScoringWeights {
    /// Reject negative or non-finite coefficients
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("availability", self.availability),
            ("conditions", self.conditions),
            ("quality", self.quality),
            ("musical", self.musical),
            ("metadata", self.metadata),
            ("string_similarity", self.string_similarity),
            ("tiebreaker", self.tiebreaker),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_input(
                    name,
                    format!("weight must be a finite non-negative number, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

/// Named weight presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    #[default]
    Balanced,
    QualityFirst,
    DjMode,
}

impl RankingStrategy {
    pub fn weights(self) -> ScoringWeights {
        match self {
            Self::Balanced => ScoringWeights {
                availability: 1.0,
                conditions: 1.0,
                quality: 1.0,
                musical: 0.5,
                metadata: 1.0,
                string_similarity: 1.5,
                tiebreaker: 0.01,
            },
            Self::QualityFirst => ScoringWeights {
                availability: 0.3,
                conditions: 0.3,
                quality: 3.0,
                musical: 0.5,
                metadata: 1.0,
                string_similarity: 1.5,
                tiebreaker: 0.01,
            },
            Self::DjMode => ScoringWeights {
                availability: 0.5,
                conditions: 0.5,
                quality: 1.0,
                musical: 3.0,
                metadata: 1.0,
                string_similarity: 1.5,
                tiebreaker: 0.01,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::QualityFirst => "quality_first",
            Self::DjMode => "dj_mode",
        }
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "balanced" => Ok(Self::Balanced),
            "quality_first" | "quality" => Ok(Self::QualityFirst),
            "dj_mode" | "dj" => Ok(Self::DjMode),
            other => Err(EngineError::invalid_input(
                "strategy",
                format!("unknown ranking strategy '{}'", other),
            )),
        }
    }
}

/// Raw sub-scores of one candidate, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub availability: f64,
    pub conditions: f64,
    pub quality: f64,
    pub musical: f64,
    pub metadata: f64,
    pub string_similarity: f64,
    pub tiebreaker: f64,
}

impl ScoreBreakdown {
    pub fn compute(wanted: &TrackQuery, candidate: &Candidate) -> Self {
        Self {
            availability: factors::availability(candidate),
            conditions: factors::conditions(candidate),
            quality: factors::quality(candidate),
            musical: factors::musical(wanted, candidate),
            metadata: factors::metadata(wanted, candidate),
            string_similarity: factors::string_similarity(wanted, candidate),
            tiebreaker: factors::tiebreak(candidate),
        }
    }

    /// Weighted sum
    pub fn total(&self, w: &ScoringWeights) -> f64 {
        w.availability * self.availability
            + w.conditions * self.conditions
            + w.quality * self.quality
            + w.musical * self.musical
            + w.metadata * self.metadata
            + w.string_similarity * self.string_similarity
            + w.tiebreaker * self.tiebreaker
    }
}

/// A candidate with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// Position in the input, used to order exact ties
    pub index: usize,
}

/// Score and sort candidates, best first.
///
/// Equal totals keep their input order, so the same input always produces
/// the same ranking.
pub fn rank(wanted: &TrackQuery, candidates: Vec<Candidate>, weights: &ScoringWeights) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| {
            let breakdown = ScoreBreakdown::compute(wanted, &candidate);
            ScoredCandidate {
                score: breakdown.total(weights),
                candidate,
                breakdown,
                index,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    scored
}

/// Ranker with weights that can be swapped while searches are running.
///
/// Every [`Ranker::rank`] call reads the weights exactly once, so a pass
/// never mixes two weightings.
#[derive(Debug, Default)]
pub struct Ranker {
    weights: RwLock<ScoringWeights>,
}

impl Ranker {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights: RwLock::new(weights),
        }
    }

    pub fn with_strategy(strategy: RankingStrategy) -> Self {
        Self::new(strategy.weights())
    }

    pub fn weights(&self) -> ScoringWeights {
        *self.weights.read()
    }

    pub fn set_weights(&self, weights: ScoringWeights) -> Result<()> {
        weights.validate()?;
        *self.weights.write() = weights;
        Ok(())
    }

    pub fn set_strategy(&self, strategy: RankingStrategy) {
        *self.weights.write() = strategy.weights();
    }

    pub fn rank(&self, wanted: &TrackQuery, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
        let weights = self.weights();
        rank(wanted, candidates, &weights)
    }
}
