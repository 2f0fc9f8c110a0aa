//! Integration tests for the discovery and sync pipeline
//!
//! The library API and the language-model boundary are replaced by fixed
//! doubles so the orchestrator's adaptive logic (fallback, deduplication,
//! limit enforcement) and the sync engine's state machine are exercised
//! deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use curator::config::DiscoverySource;
use curator::discovery::{
    AgentSet, DiscoveryRequest, FetchAgent, Orchestrator, PageFetcher, RankerAgent, SearchAgent,
    ValidatorAgent,
};
use curator::error::ErrorCode;
use curator::models::Candidate;
use curator::quality::QualityAnalyzer;
use curator::services::cache::FetchCache;
use curator::services::radarr::{
    AddDefaults, AddMoviePayload, LibraryApi, LibraryMovie, LibraryRatings, RatingValue,
    SystemStatus,
};
use curator::sync::{SyncEngine, SyncOptions, SyncOutcome};

// ============================================================================
// Doubles
// ============================================================================

/// In-memory library double: a fixed upstream catalog plus a mutable set of
/// in-library ids, recording every addition attempt.
struct MockLibrary {
    catalog: Vec<LibraryMovie>,
    in_library: Mutex<HashSet<i64>>,
    add_calls: Mutex<Vec<i64>>,
    fail_adds: bool,
}

impl MockLibrary {
    fn new(catalog: Vec<LibraryMovie>) -> Self {
        Self {
            catalog,
            in_library: Mutex::new(HashSet::new()),
            add_calls: Mutex::new(Vec::new()),
            fail_adds: false,
        }
    }

    fn failing_adds(catalog: Vec<LibraryMovie>) -> Self {
        Self {
            fail_adds: true,
            ..Self::new(catalog)
        }
    }

    fn with_existing(self, tmdb_id: i64) -> Self {
        self.in_library.lock().insert(tmdb_id);
        self
    }

    fn add_count(&self) -> usize {
        self.add_calls.lock().len()
    }

    /// Project a catalog entry the way the real API would: in-library
    /// entries carry their library id.
    fn project(&self, movie: &LibraryMovie) -> LibraryMovie {
        let mut out = movie.clone();
        if let Some(tmdb_id) = movie.tmdb_id
            && self.in_library.lock().contains(&tmdb_id)
        {
            out.id = Some(tmdb_id);
        }
        out
    }
}

#[async_trait]
impl LibraryApi for MockLibrary {
    async fn lookup(&self, term: &str) -> Result<Vec<LibraryMovie>> {
        let matches: Vec<LibraryMovie> = if let Some(id) = term.strip_prefix("tmdb:") {
            let id: i64 = id.parse().unwrap();
            self.catalog
                .iter()
                .filter(|m| m.tmdb_id == Some(id))
                .map(|m| self.project(m))
                .collect()
        } else if let Some(id) = term.strip_prefix("imdb:") {
            self.catalog
                .iter()
                .filter(|m| m.imdb_id.as_deref() == Some(id))
                .map(|m| self.project(m))
                .collect()
        } else {
            let needle = term.to_lowercase();
            self.catalog
                .iter()
                .filter(|m| m.title.to_lowercase() == needle)
                .map(|m| self.project(m))
                .collect()
        };
        Ok(matches)
    }

    async fn list_movies(&self) -> Result<Vec<LibraryMovie>> {
        let in_library = self.in_library.lock();
        Ok(self
            .catalog
            .iter()
            .filter(|m| m.tmdb_id.map(|id| in_library.contains(&id)).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn add_movie(&self, payload: &AddMoviePayload) -> Result<LibraryMovie> {
        self.add_calls.lock().push(payload.tmdb_id);
        if self.fail_adds {
            return Err(anyhow!("library API returned status 500: database locked"));
        }
        self.in_library.lock().insert(payload.tmdb_id);
        Ok(LibraryMovie {
            id: Some(payload.tmdb_id),
            title: payload.title.clone(),
            year: payload.year,
            tmdb_id: Some(payload.tmdb_id),
            ..Default::default()
        })
    }

    async fn ping(&self) -> Result<SystemStatus> {
        Ok(SystemStatus {
            version: Some("5.0.0".to_string()),
            instance_name: None,
        })
    }
}

/// Page fetcher double keyed by URL; unknown URLs time out (conceptually).
struct ScriptedFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(pages: HashMap<String, String>) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection timed out"))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn catalog_movie(title: &str, year: i32, tmdb_id: i64, ratings: Option<LibraryRatings>) -> LibraryMovie {
    LibraryMovie {
        title: title.to_string(),
        year: Some(year),
        tmdb_id: Some(tmdb_id),
        imdb_id: Some(format!("tt{tmdb_id:07}")),
        title_slug: Some(format!("{}-{tmdb_id}", title.to_lowercase().replace(' ', "-"))),
        ratings,
        ..Default::default()
    }
}

fn strong_ratings() -> LibraryRatings {
    LibraryRatings {
        imdb: Some(RatingValue {
            value: Some(7.8),
            votes: Some(120_000),
        }),
        tmdb: Some(RatingValue {
            value: Some(7.5),
            votes: Some(2_000),
        }),
        rotten_tomatoes: Some(RatingValue {
            value: Some(91.0),
            votes: None,
        }),
        metacritic: Some(RatingValue {
            value: Some(80.0),
            votes: None,
        }),
    }
}

/// The widely-panned release from the gate-rejection scenario.
fn panned_ratings() -> LibraryRatings {
    LibraryRatings {
        imdb: Some(RatingValue {
            value: Some(4.3),
            votes: Some(95_420),
        }),
        tmdb: Some(RatingValue {
            value: Some(1.8),
            votes: Some(9_000),
        }),
        rotten_tomatoes: Some(RatingValue {
            value: Some(4.0),
            votes: None,
        }),
        metacritic: Some(RatingValue {
            value: Some(18.0),
            votes: None,
        }),
    }
}

fn candidate(title: &str, year: i32) -> Candidate {
    let mut c = Candidate::new(title);
    c.year = Some(year);
    c.confidence = 0.9;
    c
}

fn engine(library: Arc<MockLibrary>) -> SyncEngine {
    SyncEngine::new(
        library,
        QualityAnalyzer::new(5.0),
        AddDefaults {
            quality_profile_id: 1,
            root_folder_path: "/movies".to_string(),
            monitor: true,
            minimum_availability: Some("released".to_string()),
            tags: vec![],
        },
    )
}

// ============================================================================
// Sync engine state machine
// ============================================================================

#[tokio::test]
async fn test_sync_is_idempotent_across_runs() {
    let library = Arc::new(MockLibrary::new(vec![catalog_movie(
        "Weapons",
        2025,
        1001,
        Some(strong_ratings()),
    )]));
    let engine = engine(library.clone());
    let candidates = vec![candidate("Weapons", 2025)];
    let options = SyncOptions::default();

    let first = engine.sync(&candidates, &options).await.unwrap();
    assert_matches!(first.outcomes[0].outcome, SyncOutcome::Added);

    // No state change between runs: the second run resolves to existing.
    let second = engine.sync(&candidates, &options).await.unwrap();
    assert_matches!(second.outcomes[0].outcome, SyncOutcome::Exists);
    assert_eq!(second.outcomes[0].code, Some(ErrorCode::AlreadyExists));
    assert_eq!(library.add_count(), 1);
}

#[tokio::test]
async fn test_duplicate_candidates_collapse_to_one_addition() {
    let library = Arc::new(MockLibrary::new(vec![catalog_movie(
        "Weapons",
        2025,
        1001,
        Some(strong_ratings()),
    )]));
    let engine = engine(library.clone());

    // Same normalized title+year twice, once with year drift.
    let candidates = vec![
        candidate("Weapons", 2025),
        candidate("WEAPONS", 2025),
        candidate("weapons", 2026),
    ];
    let report = engine.sync(&candidates, &SyncOptions::default()).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(library.add_count(), 1);
}

#[tokio::test]
async fn test_quality_gate_rejects_panned_release() {
    let library = Arc::new(MockLibrary::new(vec![catalog_movie(
        "Infinite Cash Grab",
        2025,
        2002,
        Some(panned_ratings()),
    )]));
    let engine = engine(library.clone());

    let report = engine
        .sync(&[candidate("Infinite Cash Grab", 2025)], &SyncOptions::default())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_matches!(outcome.outcome, SyncOutcome::SkippedQuality);
    assert_eq!(outcome.code, Some(ErrorCode::QualityTooLow));
    assert_eq!(library.add_count(), 0);

    let verdict = outcome.verdict.as_ref().expect("gate rejection carries the verdict");
    let score = verdict.overall_score.unwrap();
    assert!((score - 2.5).abs() < 0.15, "score was {score}");
    assert!(!verdict.passed);
    assert!(verdict.red_flags.iter().any(|f| f.contains("Critic score very poor")));
    assert!(verdict.red_flags.iter().any(|f| f.contains("critic/audience gap")));

    // The caller-facing response carries code and verdict together.
    let response = outcome.response();
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::QualityTooLow));
    assert!(response.verdict.is_some());
}

#[tokio::test]
async fn test_force_overrides_quality_gate_and_keeps_verdict() {
    let library = Arc::new(MockLibrary::new(vec![catalog_movie(
        "Infinite Cash Grab",
        2025,
        2002,
        Some(panned_ratings()),
    )]));
    let engine = engine(library.clone());
    let candidates = vec![candidate("Infinite Cash Grab", 2025)];

    let rejected = engine.sync(&candidates, &SyncOptions::default()).await.unwrap();
    assert_matches!(rejected.outcomes[0].outcome, SyncOutcome::SkippedQuality);
    let original_score = rejected.outcomes[0].verdict.as_ref().unwrap().overall_score;

    // Otherwise-identical retry with force routes to added, still carrying
    // the original verdict.
    let forced = engine
        .sync(
            &candidates,
            &SyncOptions {
                force: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let outcome = &forced.outcomes[0];
    assert_matches!(outcome.outcome, SyncOutcome::Added);
    let verdict = outcome.verdict.as_ref().unwrap();
    assert_eq!(verdict.overall_score, original_score);
    assert!(!verdict.passed);
    assert_eq!(library.add_count(), 1);
}

#[tokio::test]
async fn test_existing_title_short_circuits_quality_analysis() {
    // In the library already; its ratings would fail the gate, but the
    // existence check comes first and no verdict is computed.
    let library = Arc::new(
        MockLibrary::new(vec![catalog_movie(
            "Old Favorite",
            2025,
            3003,
            Some(panned_ratings()),
        )])
        .with_existing(3003),
    );
    let engine = engine(library.clone());

    let report = engine
        .sync(
            &[candidate("Old Favorite", 2025)],
            &SyncOptions {
                force: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_matches!(outcome.outcome, SyncOutcome::Exists);
    assert!(outcome.verdict.is_none());
    assert_eq!(library.add_count(), 0);
}

#[tokio::test]
async fn test_unknown_title_is_not_found() {
    let library = Arc::new(MockLibrary::new(vec![]));
    let engine = engine(library);

    let report = engine
        .sync(&[candidate("Completely Unknown", 2025)], &SyncOptions::default())
        .await
        .unwrap();
    assert_matches!(report.outcomes[0].outcome, SyncOutcome::NotFound);
    assert_eq!(report.outcomes[0].code, Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn test_missing_identifier_rejected_without_network() {
    let library = Arc::new(MockLibrary::new(vec![]));
    let engine = engine(library);

    let report = engine
        .sync(&[Candidate::new("")], &SyncOptions::default())
        .await
        .unwrap();
    assert_matches!(report.outcomes[0].outcome, SyncOutcome::Error);
    assert_eq!(report.outcomes[0].code, Some(ErrorCode::MissingIdentifier));
}

#[tokio::test]
async fn test_add_failure_is_reported_not_retried() {
    let library = Arc::new(MockLibrary::failing_adds(vec![catalog_movie(
        "Weapons",
        2025,
        1001,
        Some(strong_ratings()),
    )]));
    let engine = engine(library.clone());

    let report = engine
        .sync(&[candidate("Weapons", 2025)], &SyncOptions::default())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_matches!(outcome.outcome, SyncOutcome::Error);
    assert_eq!(outcome.code, Some(ErrorCode::AddFailed));
    // Upstream error text is surfaced for the caller's retry decision.
    assert!(outcome.message.contains("database locked"));
    assert_eq!(library.add_count(), 1);
}

#[tokio::test]
async fn test_per_candidate_failures_never_abort_the_batch() {
    let library = Arc::new(MockLibrary::new(vec![
        catalog_movie("Weapons", 2025, 1001, Some(strong_ratings())),
        catalog_movie("Infinite Cash Grab", 2025, 2002, Some(panned_ratings())),
    ]));
    let engine = engine(library.clone());

    let report = engine
        .sync(
            &[
                Candidate::new(""),
                candidate("Infinite Cash Grab", 2025),
                candidate("Nowhere To Be Seen", 2025),
                candidate("Weapons", 2025),
            ],
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.count(SyncOutcome::Added), 1);
    assert_eq!(report.count(SyncOutcome::SkippedQuality), 1);
    assert_eq!(report.count(SyncOutcome::NotFound), 1);
    assert_eq!(report.count(SyncOutcome::Error), 1);
}

#[tokio::test]
async fn test_dry_run_issues_no_additions() {
    let library = Arc::new(MockLibrary::new(vec![catalog_movie(
        "Weapons",
        2025,
        1001,
        Some(strong_ratings()),
    )]));
    let engine = engine(library.clone());

    let report = engine
        .sync(
            &[candidate("Weapons", 2025)],
            &SyncOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_matches!(report.outcomes[0].outcome, SyncOutcome::Added);
    assert_eq!(library.add_count(), 0);
}

#[tokio::test]
async fn test_skip_quality_bypasses_analysis() {
    // No ratings at all: normally an insufficient-data failure, but the
    // caller explicitly opted out of quality analysis.
    let library = Arc::new(MockLibrary::new(vec![catalog_movie(
        "Unreviewed Premiere",
        2026,
        4004,
        None,
    )]));
    let engine = engine(library.clone());

    let gated = engine
        .sync(&[candidate("Unreviewed Premiere", 2026)], &SyncOptions::default())
        .await
        .unwrap();
    assert_matches!(gated.outcomes[0].outcome, SyncOutcome::SkippedQuality);
    assert!(gated.outcomes[0].verdict.as_ref().unwrap().insufficient_data());

    let bypassed = engine
        .sync(
            &[candidate("Unreviewed Premiere", 2026)],
            &SyncOptions {
                skip_quality: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_matches!(bypassed.outcomes[0].outcome, SyncOutcome::Added);
    assert!(bypassed.outcomes[0].verdict.is_none());
}

// ============================================================================
// Orchestrator adaptive logic
// ============================================================================

fn sources() -> Vec<DiscoverySource> {
    vec![
        DiscoverySource {
            name: "rt_theaters".to_string(),
            url: "https://a.test/theaters".to_string(),
            parser: "rt_theaters".to_string(),
        },
        DiscoverySource {
            name: "imdb_meter".to_string(),
            url: "https://b.test/chart".to_string(),
            parser: "imdb_meter".to_string(),
        },
    ]
}

fn chart_page(titles: &[&str]) -> String {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                "### [{title}](https://www.imdb.com/title/tt{:07}/?ref_=chtmvm_t_{})\n",
                i + 1,
                i + 1
            )
        })
        .collect()
}

fn orchestrator(fetcher: ScriptedFetcher, library: Option<Arc<dyn LibraryApi>>) -> Orchestrator {
    let agents = AgentSet::new(
        FetchAgent::new(
            Arc::new(fetcher),
            Arc::new(FetchCache::new(Duration::from_secs(60))),
            sources(),
        ),
        SearchAgent::new(None, "test-model"),
        ValidatorAgent::with_current_year(library, 2026),
        RankerAgent::with_current_year(None, "test-model", 2026),
        Duration::from_secs(5),
    );
    Orchestrator::new(
        agents,
        None,
        "test-model",
        3,
        vec!["rt_theaters".to_string(), "imdb_meter".to_string()],
        "US",
    )
}

#[tokio::test]
async fn test_fallback_source_attempted_after_primary_fails() {
    // Source A (rt_theaters) times out; source B and the search agent must
    // still be attempted before concluding anything.
    let pages = HashMap::from([(
        "https://b.test/chart".to_string(),
        chart_page(&["Weapons", "Sinners", "The Naked Gun"]),
    )]);
    let orchestrator = orchestrator(ScriptedFetcher::new(pages), None);

    let outcome = orchestrator
        .discover(&DiscoveryRequest::new("blockbusters in theaters", 3))
        .await
        .unwrap();

    let attempted: Vec<&str> = outcome.attempts.iter().map(|a| a.source.as_str()).collect();
    assert!(attempted.contains(&"rt_theaters"));
    assert!(attempted.contains(&"imdb_meter"));
    assert!(attempted.contains(&"web_search"));

    let primary = outcome.attempts.iter().find(|a| a.source == "rt_theaters").unwrap();
    assert!(!primary.succeeded);
    let fallback = outcome.attempts.iter().find(|a| a.source == "imdb_meter").unwrap();
    assert!(fallback.succeeded);

    assert_eq!(outcome.candidates.len(), 3);
    assert!(outcome.candidates.iter().any(|c| c.title == "Weapons"));
}

#[tokio::test]
async fn test_every_source_failing_reports_diagnostics_not_error() {
    let orchestrator = orchestrator(ScriptedFetcher::new(HashMap::new()), None);

    let outcome = orchestrator
        .discover(&DiscoveryRequest::new("anything at all", 5))
        .await
        .unwrap();

    assert!(outcome.is_empty());
    // Every attempted source appears with a reason.
    assert!(outcome.attempts.iter().all(|a| !a.succeeded));
    assert!(outcome.diagnostics.iter().any(|d| d.contains("rt_theaters")));
    assert!(outcome.diagnostics.iter().any(|d| d.contains("imdb_meter")));
}

#[tokio::test]
async fn test_discovery_deduplicates_and_enforces_limit() {
    // Both sources list overlapping titles plus junk that validation drops.
    let pages = HashMap::from([
        (
            "https://a.test/theaters".to_string(),
            "[ 94% Weapons Opened Aug 8, 2025 ](https://www.rottentomatoes.com/m/weapons)\n\
             [ 88% Sinners Opened Apr 18, 2025 ](https://www.rottentomatoes.com/m/sinners)\n\
             [ 70% Band Reunion: Live in Concert Opened Aug 1, 2025 ](https://www.rottentomatoes.com/m/band)\n"
                .to_string(),
        ),
        (
            "https://b.test/chart".to_string(),
            chart_page(&["Weapons", "Sinners", "Highest 2 Lowest", "One Battle After Another"]),
        ),
    ]);
    let orchestrator = orchestrator(ScriptedFetcher::new(pages), None);

    let outcome = orchestrator
        .discover(&DiscoveryRequest::new("popular wide releases", 3))
        .await
        .unwrap();

    assert_eq!(outcome.candidates.len(), 3);

    // No duplicate titles, case-insensitive.
    let mut seen = HashSet::new();
    for candidate in &outcome.candidates {
        assert!(seen.insert(candidate.title.to_lowercase()));
    }
    // The concert film never survives validation.
    assert!(
        outcome
            .candidates
            .iter()
            .all(|c| !c.title.contains("Live in Concert"))
    );
}

#[tokio::test]
async fn test_discovery_rejects_out_of_range_limit() {
    let orchestrator = orchestrator(ScriptedFetcher::new(HashMap::new()), None);
    assert!(
        orchestrator
            .discover(&DiscoveryRequest::new("x", 0))
            .await
            .is_err()
    );
    assert!(
        orchestrator
            .discover(&DiscoveryRequest::new("x", 51))
            .await
            .is_err()
    );
}
