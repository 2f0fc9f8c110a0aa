//! Validator agent: confirms candidates are genuine wide theatrical
//! releases.
//!
//! Two passes: title rules against the exclusion taxonomy (pure, always
//! runs), then an enrichment pass against the library API that fills in
//! external ids and ratings and catches re-releases by year. Enrichment
//! failures for one candidate never fail the batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::discovery::protocol::{AgentKind, AgentReport};
use crate::discovery::validation::{
    ExclusionReason, Verdict, classify_title, is_rerelease_year,
};
use crate::models::{Candidate, dedup_candidates};
use crate::services::radarr::{LibraryApi, extract_ratings};

const AGENT_NAME: &str = "validate_movies";

pub struct ValidatorAgent {
    library: Option<Arc<dyn LibraryApi>>,
    current_year: i32,
}

impl ValidatorAgent {
    pub fn new(library: Option<Arc<dyn LibraryApi>>) -> Self {
        Self {
            library,
            current_year: chrono::Utc::now().year(),
        }
    }

    /// Pin the year used for re-release detection; tests use this.
    pub fn with_current_year(library: Option<Arc<dyn LibraryApi>>, current_year: i32) -> Self {
        Self {
            library,
            current_year,
        }
    }

    pub async fn run(&self, candidates: Vec<Candidate>, min_confidence: f64) -> AgentReport {
        if candidates.is_empty() {
            return AgentReport::failure(
                AgentKind::Validate,
                AGENT_NAME,
                "no candidates provided for validation",
            );
        }

        let total_input = candidates.len();
        let mut breakdown: BTreeMap<String, u64> = BTreeMap::new();
        let mut rejected_sample: Vec<String> = Vec::new();

        // Pass 1: title rules and the confidence floor.
        let mut genuine: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match classify_title(&candidate.title) {
                Verdict::Excluded(reason) => {
                    note_rejection(&mut breakdown, &mut rejected_sample, &candidate.title, reason);
                }
                Verdict::Genuine if candidate.confidence < min_confidence => {
                    note_rejection(
                        &mut breakdown,
                        &mut rejected_sample,
                        &candidate.title,
                        ExclusionReason::LowConfidence,
                    );
                }
                Verdict::Genuine => genuine.push(candidate),
            }
        }

        // Pass 2: collapse duplicates across sources.
        let (mut genuine, merged) = dedup_candidates(genuine);
        if merged > 0 {
            breakdown.insert(ExclusionReason::Duplicate.to_string(), merged as u64);
        }

        // Pass 3: enrichment and year-based re-release detection.
        let mut issues: Vec<String> = Vec::new();
        if let Some(library) = &self.library {
            let lookups = genuine.iter().map(|candidate| {
                let library = Arc::clone(library);
                let term = lookup_term(candidate);
                async move { library.lookup(&term).await }
            });
            let results = join_all(lookups).await;

            let mut kept: Vec<Candidate> = Vec::with_capacity(genuine.len());
            for (candidate, result) in genuine.into_iter().zip(results) {
                match result {
                    Ok(matches) => {
                        let Some(found) = best_match(&candidate, &matches) else {
                            // Nothing upstream; leave the candidate as-is and
                            // let the sync engine decide.
                            kept.push(candidate);
                            continue;
                        };
                        if is_rerelease_year(found.year, self.current_year) {
                            note_rejection(
                                &mut breakdown,
                                &mut rejected_sample,
                                &candidate.title,
                                ExclusionReason::ReRelease,
                            );
                            continue;
                        }
                        kept.push(enriched(candidate, found));
                    }
                    Err(e) => {
                        warn!(title = %candidate.title, error = %e, "enrichment lookup failed");
                        issues.push(format!("enrichment failed for '{}': {e}", candidate.title));
                        kept.push(candidate);
                    }
                }
            }
            genuine = kept;
        }

        let rejected_count: u64 = breakdown.values().sum();
        debug!(
            input = total_input,
            valid = genuine.len(),
            rejected = rejected_count,
            "validation complete"
        );

        let mut report = AgentReport::success(
            AgentKind::Validate,
            AGENT_NAME,
            format!(
                "validated {total_input} candidates: {} genuine, {rejected_count} excluded",
                genuine.len()
            ),
        );
        report.issues = issues;
        report.issues.extend(rejected_sample);
        report.stat("total_input", total_input as u64);
        report.stat("valid_count", genuine.len() as u64);
        if let Ok(value) = serde_json::to_value(&breakdown) {
            report.stat("rejection_breakdown", value);
        }
        report.candidates = genuine;
        report
    }
}

fn note_rejection(
    breakdown: &mut BTreeMap<String, u64>,
    sample: &mut Vec<String>,
    title: &str,
    reason: ExclusionReason,
) {
    *breakdown.entry(reason.to_string()).or_insert(0) += 1;
    if sample.len() < 5 {
        sample.push(format!("{title}: {reason}"));
    }
}

/// Prefer identifier lookups over free-text terms.
fn lookup_term(candidate: &Candidate) -> String {
    if let Some(tmdb_id) = candidate.tmdb_id {
        format!("tmdb:{tmdb_id}")
    } else if let Some(imdb_id) = &candidate.imdb_id {
        format!("imdb:{imdb_id}")
    } else {
        candidate.title.clone()
    }
}

/// Pick the lookup result that names the same release, year-tolerant.
fn best_match<'a>(
    candidate: &Candidate,
    matches: &'a [crate::services::radarr::LibraryMovie],
) -> Option<&'a crate::services::radarr::LibraryMovie> {
    matches
        .iter()
        .find(|m| match (candidate.year, m.year) {
            (Some(a), Some(b)) => (a - b).abs() <= 1,
            _ => true,
        })
        .or_else(|| matches.first())
}

/// Build the replacement candidate carrying the lookup's ids and ratings.
fn enriched(candidate: Candidate, found: &crate::services::radarr::LibraryMovie) -> Candidate {
    let mut out = candidate;
    if out.year.is_none() {
        out.year = found.year;
    }
    if out.tmdb_id.is_none() {
        out.tmdb_id = found.tmdb_id;
    }
    if out.imdb_id.is_none() {
        out.imdb_id = found.imdb_id.clone();
    }
    out.ratings = extract_ratings(found);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::protocol::ReportStatus;
    use crate::services::radarr::{
        AddMoviePayload, LibraryMovie, LibraryRatings, RatingValue, SystemStatus,
    };
    use anyhow::Result;
    use async_trait::async_trait;

    struct StubLibrary {
        movies: Vec<LibraryMovie>,
    }

    #[async_trait]
    impl LibraryApi for StubLibrary {
        async fn lookup(&self, term: &str) -> Result<Vec<LibraryMovie>> {
            Ok(self
                .movies
                .iter()
                .filter(|m| {
                    m.title.to_lowercase().contains(&term.to_lowercase())
                        || term.starts_with("tmdb:")
                })
                .cloned()
                .collect())
        }

        async fn list_movies(&self) -> Result<Vec<LibraryMovie>> {
            Ok(Vec::new())
        }

        async fn add_movie(&self, _payload: &AddMoviePayload) -> Result<LibraryMovie> {
            unreachable!("validator never adds")
        }

        async fn ping(&self) -> Result<SystemStatus> {
            Ok(SystemStatus {
                version: None,
                instance_name: None,
            })
        }
    }

    fn candidate(title: &str, year: Option<i32>, confidence: f64) -> Candidate {
        let mut c = Candidate::new(title);
        c.year = year;
        c.confidence = confidence;
        c
    }

    #[tokio::test]
    async fn test_rules_pass_excludes_taxonomy_entries() {
        let agent = ValidatorAgent::with_current_year(None, 2026);
        let report = agent
            .run(
                vec![
                    candidate("Weapons", Some(2025), 0.9),
                    candidate("Taylor Swift: The Eras Tour Film", Some(2025), 0.9),
                    candidate("Demon Slayer Recap: Infinity Castle", Some(2025), 0.9),
                    candidate("Maybe Something", Some(2025), 0.2),
                ],
                0.5,
            )
            .await;

        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].title, "Weapons");

        let breakdown = &report.stats["rejection_breakdown"];
        assert_eq!(breakdown["concert_film"], 1);
        assert_eq!(breakdown["compilation"], 1);
        assert_eq!(breakdown["low_confidence"], 1);
    }

    #[tokio::test]
    async fn test_duplicates_merged() {
        let agent = ValidatorAgent::with_current_year(None, 2026);
        let report = agent
            .run(
                vec![
                    candidate("Weapons", Some(2025), 0.8),
                    candidate("WEAPONS", None, 0.9),
                ],
                0.0,
            )
            .await;
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].confidence, 0.9);
        assert_eq!(report.stats["rejection_breakdown"]["duplicate"], 1);
    }

    #[tokio::test]
    async fn test_enrichment_fills_ids_and_catches_rereleases() {
        let library = StubLibrary {
            movies: vec![
                LibraryMovie {
                    title: "Weapons".to_string(),
                    year: Some(2025),
                    tmdb_id: Some(1078605),
                    imdb_id: Some("tt26581740".to_string()),
                    ratings: Some(LibraryRatings {
                        imdb: Some(RatingValue {
                            value: Some(7.6),
                            votes: Some(118_000),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                LibraryMovie {
                    title: "Interstellar".to_string(),
                    year: Some(2014),
                    tmdb_id: Some(157336),
                    ..Default::default()
                },
            ],
        };
        let agent = ValidatorAgent::with_current_year(Some(Arc::new(library)), 2026);
        let report = agent
            .run(
                vec![
                    candidate("Weapons", Some(2025), 0.9),
                    // Old film resurfacing on a chart: excluded as re-release.
                    candidate("Interstellar", None, 0.9),
                ],
                0.0,
            )
            .await;

        assert_eq!(report.candidates.len(), 1);
        let weapons = &report.candidates[0];
        assert_eq!(weapons.tmdb_id, Some(1078605));
        assert!(weapons.ratings.numeric.is_some());
        assert_eq!(report.stats["rejection_breakdown"]["re_release"], 1);
    }

    #[tokio::test]
    async fn test_empty_input_is_failure() {
        let agent = ValidatorAgent::with_current_year(None, 2026);
        assert!(agent.run(Vec::new(), 0.0).await.is_failure());
    }
}
