//! Quality analysis engine
//!
//! Turns a `RatingSet` into a deterministic `QualityVerdict`: a 0-10 score,
//! a pass/fail decision against a threshold, a recommendation tier, and a
//! list of red flags. The verdict is a pure function of its inputs and is
//! recomputed on demand, never persisted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::RatingSet;

/// Default pass/fail threshold when the caller does not supply one.
pub const DEFAULT_THRESHOLD: f64 = 5.0;

/// Relative weights for present providers; renormalized over whichever
/// providers actually reported. The vote-backed numeric score is the most
/// reliable signal and carries the largest share.
const WEIGHT_NUMERIC: f64 = 0.40;
const WEIGHT_CRITIC: f64 = 0.20;
const WEIGHT_AUDIENCE: f64 = 0.20;
const WEIGHT_AGGREGATE: f64 = 0.20;

/// Vote counts below these erode confidence in the numeric score.
const VOTES_UNRELIABLE: i64 = 1_000;
const VOTES_LIMITED: i64 = 5_000;

/// Critic/audience divergence beyond this many points reads as divisive.
const CRITIC_AUDIENCE_GAP: f64 = 10.0;

/// Per-provider low-quality floors.
const CRITIC_VERY_POOR: f64 = 20.0;
const CRITIC_POOR: f64 = 40.0;
const AUDIENCE_VERY_POOR: f64 = 30.0;
const AUDIENCE_POOR: f64 = 50.0;
const NUMERIC_LOW: f64 = 5.0;
const AGGREGATE_VERY_POOR: f64 = 30.0;
const AGGREGATE_POOR: f64 = 50.0;

/// Qualitative tier derived from the overall score via fixed breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    HighlyRecommended,
    Recommended,
    Good,
    Mixed,
    NotRecommended,
}

impl Recommendation {
    /// Pure function of the score; no hidden state.
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            Recommendation::HighlyRecommended
        } else if score >= 7.0 {
            Recommendation::Recommended
        } else if score >= 6.0 {
            Recommendation::Good
        } else if score >= 5.0 {
            Recommendation::Mixed
        } else {
            Recommendation::NotRecommended
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::HighlyRecommended => write!(f, "highly recommended"),
            Recommendation::Recommended => write!(f, "recommended"),
            Recommendation::Good => write!(f, "good"),
            Recommendation::Mixed => write!(f, "mixed"),
            Recommendation::NotRecommended => write!(f, "not recommended"),
        }
    }
}

/// The derived quality assessment for one title.
///
/// `overall_score` is `None` when zero providers reported data; that verdict
/// explicitly signals insufficient data and always fails the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub overall_score: Option<f64>,
    pub threshold: f64,
    pub passed: bool,
    pub recommendation: Option<Recommendation>,
    pub red_flags: Vec<String>,
}

impl QualityVerdict {
    pub fn insufficient_data(&self) -> bool {
        self.overall_score.is_none()
    }

    /// One-line rendering for log lines and CLI output.
    pub fn summary(&self) -> String {
        match self.overall_score {
            Some(score) => format!(
                "{:.1}/10 ({}), {} red flag(s)",
                score,
                self.recommendation
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                self.red_flags.len()
            ),
            None => "insufficient data".to_string(),
        }
    }
}

/// The quality analysis engine. Threshold is fixed at construction and
/// threaded in from configuration; there is no other state.
#[derive(Debug, Clone)]
pub struct QualityAnalyzer {
    threshold: f64,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl QualityAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compute the verdict for one title's ratings.
    pub fn analyze(&self, ratings: &RatingSet) -> QualityVerdict {
        let overall_score = weighted_score(ratings);
        let red_flags = detect_red_flags(ratings);

        let verdict = QualityVerdict {
            overall_score,
            threshold: self.threshold,
            passed: overall_score.map(|s| s >= self.threshold).unwrap_or(false),
            recommendation: overall_score.map(Recommendation::from_score),
            red_flags,
        };

        debug!(
            score = ?verdict.overall_score,
            passed = verdict.passed,
            red_flags = verdict.red_flags.len(),
            "quality analysis complete"
        );

        verdict
    }
}

/// Weighted average of the present providers on a common 0-10 scale.
///
/// Absent providers are excluded and the remaining weights renormalized to
/// sum to 1. A low vote count reduces the numeric provider's weight rather
/// than its value. Returns `None` when no provider reported.
fn weighted_score(ratings: &RatingSet) -> Option<f64> {
    let mut terms: Vec<(f64, f64)> = Vec::with_capacity(4);

    if let Some(critic) = ratings.critic_percent {
        terms.push((critic / 10.0, WEIGHT_CRITIC));
    }
    if let Some(audience) = ratings.audience_percent {
        terms.push((audience / 10.0, WEIGHT_AUDIENCE));
    }
    if let Some(numeric) = ratings.numeric {
        let weight = if numeric.votes < VOTES_UNRELIABLE {
            WEIGHT_NUMERIC * 0.5
        } else if numeric.votes < VOTES_LIMITED {
            WEIGHT_NUMERIC * 0.75
        } else {
            WEIGHT_NUMERIC
        };
        terms.push((numeric.value, weight));
    }
    if let Some(aggregate) = ratings.aggregate {
        terms.push((aggregate / 10.0, WEIGHT_AGGREGATE));
    }

    if terms.is_empty() {
        return None;
    }

    let total_weight: f64 = terms.iter().map(|(_, w)| w).sum();
    let score: f64 = terms.iter().map(|(s, w)| s * w / total_weight).sum();

    Some((score.clamp(0.0, 10.0) * 10.0).round() / 10.0)
}

/// Fixed red-flag rule set. Each rule consults only its own provider(s), so
/// removing one provider's rating never changes the flags contributed by the
/// others.
fn detect_red_flags(ratings: &RatingSet) -> Vec<String> {
    let mut flags = Vec::new();

    if let Some(critic) = ratings.critic_percent {
        if critic < CRITIC_VERY_POOR {
            flags.push(format!("Critic score very poor ({:.0}%)", critic));
        } else if critic < CRITIC_POOR {
            flags.push(format!("Critic score poor ({:.0}%)", critic));
        }
    }

    if let Some(audience) = ratings.audience_percent {
        if audience < AUDIENCE_VERY_POOR {
            flags.push(format!("Audience score very poor ({:.0}%)", audience));
        } else if audience < AUDIENCE_POOR {
            flags.push(format!("Audience score poor ({:.0}%)", audience));
        }
    }

    if let (Some(critic), Some(audience)) = (ratings.critic_percent, ratings.audience_percent) {
        let gap = (critic - audience).abs();
        if gap > CRITIC_AUDIENCE_GAP {
            flags.push(format!(
                "Large critic/audience gap ({:.0} points) - divisive reception",
                gap
            ));
        }
    }

    if let Some(numeric) = ratings.numeric {
        if numeric.value < NUMERIC_LOW {
            flags.push(format!("IMDb rating low ({:.1}/10)", numeric.value));
        }
        if numeric.votes < VOTES_UNRELIABLE {
            flags.push(format!(
                "Very low vote count ({}) - rating unreliable",
                numeric.votes
            ));
        } else if numeric.votes < VOTES_LIMITED {
            flags.push(format!(
                "Low vote count ({}) - limited audience data",
                numeric.votes
            ));
        }
    }

    if let Some(aggregate) = ratings.aggregate {
        if aggregate < AGGREGATE_VERY_POOR {
            flags.push(format!("Aggregate score very poor ({:.0}/100)", aggregate));
        } else if aggregate < AGGREGATE_POOR {
            flags.push(format!("Aggregate score poor ({:.0}/100)", aggregate));
        }
    }

    if ratings.is_empty() {
        flags.push("No ratings available from any provider".to_string());
    }

    flags
}
