//! Sync engine
//!
//! Reconciles candidates against the existing library and issues additions.
//! Per candidate the state machine is pending -> {resolved_existing |
//! not_found | quality_rejected | added | add_failed}; every terminal state
//! is recorded as one `SyncOutcome` and nothing is retried within a run.
//! Existence checks are never bypassable; the quality gate is, via the
//! explicit force flag.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, OperationResponse};
use crate::models::{Candidate, dedup_candidates, title_similarity};
use crate::quality::{QualityAnalyzer, QualityVerdict};
use crate::services::radarr::{AddDefaults, LibraryApi, LibraryMovie, build_add_payload, extract_ratings};

/// Terminal state for one candidate in one sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// An addition request was issued and accepted.
    Added,
    /// The title is already in the library; nothing to do, force or not.
    Exists,
    /// Quality analysis failed the gate and no override was requested.
    SkippedQuality,
    /// No metadata record upstream for the identifiers/title given.
    NotFound,
    /// The lookup or addition failed at the API boundary.
    Error,
}

/// One candidate's resolution, with enough detail for the caller to decide
/// on a retry or an override without re-querying.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub candidate: Candidate,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<QualityVerdict>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl CandidateOutcome {
    /// Render as the caller-facing result contract.
    pub fn response(&self) -> OperationResponse {
        match (self.outcome, &self.verdict) {
            (SyncOutcome::Added, Some(verdict)) => {
                OperationResponse::ok_with_verdict(self.message.clone(), verdict.clone())
            }
            (SyncOutcome::Added, None) => OperationResponse::ok(self.message.clone()),
            (SyncOutcome::SkippedQuality, Some(verdict)) => {
                OperationResponse::rejected(verdict.clone(), self.message.clone())
            }
            _ => OperationResponse::failed(
                self.code.unwrap_or(ErrorCode::AddFailed),
                self.message.clone(),
            ),
        }
    }
}

/// Options for one sync invocation.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Route quality rejections to addition anyway. Never affects existence.
    pub force: bool,
    /// Skip quality analysis entirely.
    pub skip_quality: bool,
    /// Resolve everything but issue no addition requests.
    pub dry_run: bool,
}

/// Result of one sync invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub outcomes: Vec<CandidateOutcome>,
}

impl SyncReport {
    pub fn count(&self, outcome: SyncOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} added, {} existing, {} quality-rejected, {} not found, {} failed{}",
            self.count(SyncOutcome::Added),
            self.count(SyncOutcome::Exists),
            self.count(SyncOutcome::SkippedQuality),
            self.count(SyncOutcome::NotFound),
            self.count(SyncOutcome::Error),
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}

pub struct SyncEngine {
    library: Arc<dyn LibraryApi>,
    analyzer: QualityAnalyzer,
    defaults: AddDefaults,
}

impl SyncEngine {
    pub fn new(library: Arc<dyn LibraryApi>, analyzer: QualityAnalyzer, defaults: AddDefaults) -> Self {
        Self {
            library,
            analyzer,
            defaults,
        }
    }

    /// Reconcile a candidate list against the library. Per-candidate
    /// failures never abort the batch; each distinct candidate (after
    /// normalization) yields exactly one outcome and at most one addition
    /// attempt.
    pub async fn sync(&self, candidates: &[Candidate], options: &SyncOptions) -> Result<SyncReport> {
        let (distinct, merged) = dedup_candidates(candidates.to_vec());
        if merged > 0 {
            debug!(merged, "collapsed duplicate candidates before sync");
        }

        // Precondition pass: malformed candidates are rejected before any
        // network call is attempted.
        let mut outcomes = Vec::with_capacity(distinct.len());
        let mut pending = Vec::with_capacity(distinct.len());
        for candidate in distinct {
            if candidate.is_unidentified() {
                outcomes.push(CandidateOutcome {
                    candidate,
                    outcome: SyncOutcome::Error,
                    verdict: None,
                    message: "neither a title nor an identifier was supplied".to_string(),
                    code: Some(ErrorCode::MissingIdentifier),
                });
            } else {
                pending.push(candidate);
            }
        }
        if pending.is_empty() {
            return Ok(SyncReport {
                dry_run: options.dry_run,
                outcomes,
            });
        }

        // One listing up front backs the duplicate-safety check; the lookup
        // result's own library id covers anything newer.
        let mut existing_ids: HashSet<i64> = match self.library.list_movies().await {
            Ok(movies) => movies.iter().filter_map(|m| m.tmdb_id).collect(),
            Err(e) => {
                warn!(error = %e, "could not list library, relying on lookup ids only");
                HashSet::new()
            }
        };

        for candidate in pending {
            let outcome = self.sync_one(candidate, &mut existing_ids, options).await;
            debug!(
                title = %outcome.candidate.title,
                outcome = ?outcome.outcome,
                "candidate resolved"
            );
            outcomes.push(outcome);
        }

        let report = SyncReport {
            dry_run: options.dry_run,
            outcomes,
        };
        info!(summary = %report.summary(), "sync complete");
        Ok(report)
    }

    async fn sync_one(
        &self,
        candidate: Candidate,
        existing_ids: &mut HashSet<i64>,
        options: &SyncOptions,
    ) -> CandidateOutcome {
        // Lookup before add, always.
        let term = lookup_term(&candidate);
        let matches = match self.library.lookup(&term).await {
            Ok(matches) => matches,
            Err(e) => {
                return CandidateOutcome {
                    candidate,
                    outcome: SyncOutcome::Error,
                    verdict: None,
                    message: format!("library lookup failed: {e}"),
                    code: Some(ErrorCode::AddFailed),
                };
            }
        };

        let Some(found) = best_match(&candidate, &matches).cloned() else {
            return CandidateOutcome {
                candidate,
                outcome: SyncOutcome::NotFound,
                verdict: None,
                message: "no matching metadata record upstream".to_string(),
                code: Some(ErrorCode::NotFound),
            };
        };

        // Existing titles short-circuit before quality analysis and are
        // never overridable.
        let already_known = found.in_library()
            || found.tmdb_id.map(|id| existing_ids.contains(&id)).unwrap_or(false);
        if already_known {
            return CandidateOutcome {
                candidate,
                outcome: SyncOutcome::Exists,
                verdict: None,
                message: format!("'{}' is already in the library", found.title),
                code: Some(ErrorCode::AlreadyExists),
            };
        }

        // Quality gate, unless explicitly bypassed.
        let verdict = if options.skip_quality {
            None
        } else {
            Some(self.analyzer.analyze(&extract_ratings(&found)))
        };
        if let Some(v) = &verdict
            && !v.passed
            && !options.force
        {
            return CandidateOutcome {
                candidate,
                outcome: SyncOutcome::SkippedQuality,
                verdict: verdict.clone(),
                message: format!("quality gate rejected '{}': {}", found.title, v.summary()),
                code: Some(ErrorCode::QualityTooLow),
            };
        }

        if options.dry_run {
            return CandidateOutcome {
                candidate,
                outcome: SyncOutcome::Added,
                verdict,
                message: format!("dry run - would add '{}'", found.title),
                code: None,
            };
        }

        let payload = match build_add_payload(&found, &self.defaults) {
            Ok(payload) => payload,
            Err(e) => {
                return CandidateOutcome {
                    candidate,
                    outcome: SyncOutcome::Error,
                    verdict,
                    message: format!("cannot build addition request: {e}"),
                    code: Some(ErrorCode::AddFailed),
                };
            }
        };

        // Exactly one addition attempt; a failure is terminal for this run.
        match self.library.add_movie(&payload).await {
            Ok(added) => {
                if let Some(id) = added.tmdb_id.or(found.tmdb_id) {
                    existing_ids.insert(id);
                }
                CandidateOutcome {
                    candidate,
                    outcome: SyncOutcome::Added,
                    verdict,
                    message: format!("queued '{}' for download", found.title),
                    code: None,
                }
            }
            Err(e) => CandidateOutcome {
                candidate,
                outcome: SyncOutcome::Error,
                verdict,
                message: format!("library rejected addition of '{}': {e}", found.title),
                code: Some(ErrorCode::AddFailed),
            },
        }
    }
}

/// Identifier lookups first, then normalized title+year.
fn lookup_term(candidate: &Candidate) -> String {
    if let Some(tmdb_id) = candidate.tmdb_id {
        format!("tmdb:{tmdb_id}")
    } else if let Some(imdb_id) = &candidate.imdb_id {
        format!("imdb:{imdb_id}")
    } else {
        candidate.title.clone()
    }
}

/// Pick the lookup result naming the same release: the most similar title
/// among year-compatible results, otherwise the provider's best guess.
fn best_match<'a>(candidate: &Candidate, matches: &'a [LibraryMovie]) -> Option<&'a LibraryMovie> {
    matches
        .iter()
        .filter(|m| match (candidate.year, m.year) {
            (Some(a), Some(b)) => (a - b).abs() <= 1,
            _ => true,
        })
        .max_by(|a, b| {
            title_similarity(&candidate.title, &a.title)
                .total_cmp(&title_similarity(&candidate.title, &b.title))
        })
        .or_else(|| matches.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_term_prefers_identifiers() {
        let mut candidate = Candidate::new("Weapons");
        assert_eq!(lookup_term(&candidate), "Weapons");
        candidate.imdb_id = Some("tt26581740".to_string());
        assert_eq!(lookup_term(&candidate), "imdb:tt26581740");
        candidate.tmdb_id = Some(1078605);
        assert_eq!(lookup_term(&candidate), "tmdb:1078605");
    }

    #[test]
    fn test_best_match_is_year_tolerant() {
        let mut candidate = Candidate::new("Weapons");
        candidate.year = Some(2025);

        let wrong_year = LibraryMovie {
            title: "Weapons".to_string(),
            year: Some(1986),
            tmdb_id: Some(1),
            ..Default::default()
        };
        let right_year = LibraryMovie {
            title: "Weapons".to_string(),
            year: Some(2025),
            tmdb_id: Some(2),
            ..Default::default()
        };

        let matches = vec![wrong_year, right_year];
        assert_eq!(best_match(&candidate, &matches).unwrap().tmdb_id, Some(2));
    }

    #[test]
    fn test_outcome_serializes_to_fixed_tags() {
        assert_eq!(
            serde_json::to_string(&SyncOutcome::SkippedQuality).unwrap(),
            "\"skipped_quality\""
        );
        assert_eq!(
            serde_json::to_string(&SyncOutcome::NotFound).unwrap(),
            "\"not_found\""
        );
    }
}
