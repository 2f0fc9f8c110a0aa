//! Core data model shared by discovery, quality analysis, and sync.
//!
//! A `Candidate` is immutable once produced: enrichment and ranking build
//! replacement values instead of mutating in place.

use serde::{Deserialize, Serialize};

/// One title proposed for addition to the library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub year: Option<i32>,
    /// Numeric content-database id (TMDB).
    pub tmdb_id: Option<i64>,
    /// Alphanumeric review-database id (IMDb, `tt`-prefixed).
    pub imdb_id: Option<String>,
    /// Discovery confidence in [0, 1].
    pub confidence: f64,
    /// Free-text justification from the producing agent.
    pub overview: Option<String>,
    /// Names of the sources that surfaced this candidate.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Ratings collected during enrichment, if any.
    #[serde(default)]
    pub ratings: RatingSet,
}

impl Candidate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            confidence: 0.5,
            ..Default::default()
        }
    }

    /// True when the candidate carries neither a usable title nor any
    /// external identifier. Such candidates are rejected before network I/O.
    pub fn is_unidentified(&self) -> bool {
        self.title.trim().is_empty() && self.tmdb_id.is_none() && self.imdb_id.is_none()
    }

    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }

    /// Case-insensitive, year-tolerant identity check used for dedup.
    ///
    /// Two candidates describe the same release when their normalized titles
    /// match and their years are compatible: equal, one year apart (regional
    /// release windows straddle new year), or one side missing.
    pub fn same_release(&self, other: &Candidate) -> bool {
        if let (Some(a), Some(b)) = (self.tmdb_id, other.tmdb_id) {
            return a == b;
        }
        if self.normalized_title() != other.normalized_title() {
            return false;
        }
        match (self.year, other.year) {
            (Some(a), Some(b)) => (a - b).abs() <= 1,
            _ => true,
        }
    }

    /// Merge a duplicate into this candidate, producing a new value.
    /// Keeps the higher confidence, fills a missing year/ids, unions sources.
    pub fn merged_with(&self, dup: &Candidate) -> Candidate {
        let mut out = self.clone();
        if dup.confidence > out.confidence {
            out.confidence = dup.confidence;
        }
        if out.year.is_none() {
            out.year = dup.year;
        }
        if out.tmdb_id.is_none() {
            out.tmdb_id = dup.tmdb_id;
        }
        if out.imdb_id.is_none() {
            out.imdb_id = dup.imdb_id.clone();
        }
        if out.overview.is_none() {
            out.overview = dup.overview.clone();
        }
        for source in &dup.sources {
            if !out.sources.contains(source) {
                out.sources.push(source.clone());
            }
        }
        out
    }
}

/// Lowercase, strip everything but alphanumerics, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_space = true;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Similarity between two titles after normalization, in [0, 1].
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&normalize_title(a), &normalize_title(b))
}

/// Collapse a candidate list to distinct releases, merging duplicates.
///
/// Quadratic over the list, which is bounded by the discovery limit and the
/// per-source fetch caps (tens of entries, not thousands).
pub fn dedup_candidates(candidates: Vec<Candidate>) -> (Vec<Candidate>, usize) {
    let mut distinct: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut merged = 0usize;
    for candidate in candidates {
        match distinct.iter().position(|kept| kept.same_release(&candidate)) {
            Some(idx) => {
                distinct[idx] = distinct[idx].merged_with(&candidate);
                merged += 1;
            }
            None => distinct.push(candidate),
        }
    }
    (distinct, merged)
}

/// The collected per-provider ratings for one title.
///
/// An absent provider is absent, never zero: the quality engine renormalizes
/// weights over the providers that actually reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSet {
    /// Rotten Tomatoes critic score, 0-100.
    pub critic_percent: Option<f64>,
    /// Audience approval score, 0-100.
    pub audience_percent: Option<f64>,
    /// IMDb-style numeric score with its vote count.
    pub numeric: Option<NumericRating>,
    /// Metacritic-style aggregate, 0-100.
    pub aggregate: Option<f64>,
}

/// A 0-10 score backed by a vote count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRating {
    pub value: f64,
    pub votes: i64,
}

impl RatingSet {
    pub fn is_empty(&self) -> bool {
        self.critic_percent.is_none()
            && self.audience_percent.is_none()
            && self.numeric.is_none()
            && self.aggregate.is_none()
    }

    pub fn provider_count(&self) -> usize {
        [
            self.critic_percent.is_some(),
            self.audience_percent.is_some(),
            self.numeric.is_some(),
            self.aggregate.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The Batman: Part II"), "the batman part ii");
        assert_eq!(normalize_title("  Dune -- Part Two  "), "dune part two");
        assert_eq!(normalize_title("WALL·E"), "wall e");
    }

    #[test]
    fn test_same_release_year_tolerant() {
        let mut a = Candidate::new("Weapons");
        a.year = Some(2025);
        let mut b = Candidate::new("weapons");
        b.year = Some(2026);
        let mut c = Candidate::new("Weapons");
        c.year = None;
        assert!(a.same_release(&b));
        assert!(a.same_release(&c));

        b.year = Some(2023);
        assert!(!a.same_release(&b));
    }

    #[test]
    fn test_same_release_prefers_tmdb_id() {
        let mut a = Candidate::new("The Movie");
        a.tmdb_id = Some(100);
        let mut b = Candidate::new("The Movie (extended)");
        b.tmdb_id = Some(100);
        assert!(a.same_release(&b));
        b.tmdb_id = Some(101);
        assert!(!a.same_release(&b));
    }

    #[test]
    fn test_dedup_merges_sources_and_fills_year() {
        let mut a = Candidate::new("Sinners");
        a.sources = vec!["rt_theaters".into()];
        a.confidence = 0.7;
        let mut b = Candidate::new("SINNERS");
        b.year = Some(2025);
        b.sources = vec!["imdb_meter".into()];
        b.confidence = 0.9;

        let (distinct, merged) = dedup_candidates(vec![a, b]);
        assert_eq!(distinct.len(), 1);
        assert_eq!(merged, 1);
        assert_eq!(distinct[0].year, Some(2025));
        assert_eq!(distinct[0].confidence, 0.9);
        assert_eq!(distinct[0].sources.len(), 2);
    }

    #[test]
    fn test_rating_set_counts() {
        let mut ratings = RatingSet::default();
        assert!(ratings.is_empty());
        ratings.numeric = Some(NumericRating {
            value: 7.2,
            votes: 12000,
        });
        ratings.critic_percent = Some(88.0);
        assert_eq!(ratings.provider_count(), 2);
    }
}
