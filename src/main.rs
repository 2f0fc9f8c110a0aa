//! curator - entry point
//!
//! Wires configuration into the discovery orchestrator, quality analyzer,
//! and sync engine, then dispatches one CLI command. Every operation prints
//! the structured caller-facing response as JSON on stdout.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use curator::config::Config;
use curator::discovery::{
    AgentSet, DiscoveryRequest, FetchAgent, HttpPageFetcher, Orchestrator, RankerAgent,
    SearchAgent, ValidatorAgent,
};
use curator::models::Candidate;
use curator::quality::QualityAnalyzer;
use curator::services::cache::FetchCache;
use curator::services::openai::{ChatBackend, OpenAiClient};
use curator::services::radarr::{AddDefaults, LibraryApi, RadarrClient};
use curator::services::ratings::{LibraryRatingsFetcher, RatingsSource};
use curator::sync::{SyncEngine, SyncOptions, SyncReport};

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "curator=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let command = Command::from_args()?;

    match command {
        Command::Help => {
            println!("{}", cli::USAGE);
            Ok(())
        }
        Command::Ping => ping(&config).await,
        Command::Discover {
            prompt,
            limit,
            region,
            sync,
            options,
        } => discover(&config, prompt, limit, region, sync, &options).await,
        Command::Add {
            title,
            year,
            tmdb_id,
            imdb_id,
            options,
        } => add(&config, title, year, tmdb_id, imdb_id, &options).await,
        Command::Analyze { title, year } => analyze(&config, title, year).await,
    }
}

fn language_model(config: &Config) -> Option<Arc<dyn ChatBackend>> {
    config
        .openai_api_key
        .clone()
        .map(|key| Arc::new(OpenAiClient::new(key)) as Arc<dyn ChatBackend>)
}

fn library_client(config: &Config) -> Result<Arc<dyn LibraryApi>> {
    let (base_url, api_key) = config.require_radarr()?;
    Ok(Arc::new(RadarrClient::new(base_url, api_key)))
}

fn build_orchestrator(config: &Config, library: Option<Arc<dyn LibraryApi>>) -> Orchestrator {
    let llm = language_model(config);
    let cache = Arc::new(FetchCache::new(Duration::from_secs(config.cache_ttl_secs)));

    let agents = AgentSet::new(
        FetchAgent::new(
            Arc::new(HttpPageFetcher::new()),
            cache,
            config.sources.clone(),
        ),
        SearchAgent::new(llm.clone(), &config.agent_model),
        ValidatorAgent::new(library),
        RankerAgent::new(llm.clone(), &config.agent_model),
        Duration::from_secs(config.agent_timeout_secs),
    );

    Orchestrator::new(
        agents,
        llm,
        &config.orchestrator_model,
        config.max_iterations,
        config.sources.iter().map(|s| s.name.clone()).collect(),
        &config.region,
    )
}

fn build_sync_engine(config: &Config, library: Arc<dyn LibraryApi>, dry_run: bool) -> Result<SyncEngine> {
    // A dry run resolves candidates without needing addition defaults.
    let (quality_profile_id, root_folder_path) = if dry_run {
        (
            config.quality_profile_id.unwrap_or(0),
            config.root_folder_path.clone().unwrap_or_default(),
        )
    } else {
        config.require_add_defaults()?
    };

    Ok(SyncEngine::new(
        library,
        QualityAnalyzer::new(config.quality_threshold),
        AddDefaults {
            quality_profile_id,
            root_folder_path,
            monitor: config.monitor,
            minimum_availability: config.minimum_availability.clone(),
            tags: config.tags.clone(),
        },
    ))
}

async fn ping(config: &Config) -> Result<()> {
    let library = library_client(config)?;
    let status = library.ping().await.context("library is unreachable")?;
    println!(
        "{}",
        serde_json::json!({
            "success": true,
            "message": format!(
                "library reachable (version {})",
                status.version.as_deref().unwrap_or("unknown")
            ),
        })
    );
    Ok(())
}

async fn discover(
    config: &Config,
    prompt: String,
    limit: usize,
    region: Option<String>,
    sync: bool,
    options: &SyncOptions,
) -> Result<()> {
    let library = library_client(config).ok();
    let orchestrator = build_orchestrator(config, library.clone());

    let mut request = DiscoveryRequest::new(prompt, limit);
    request.region = region;

    let outcome = orchestrator.discover(&request).await?;
    let envelope = if outcome.is_empty() {
        serde_json::json!({
            "success": false,
            "code": curator::error::ErrorCode::NoCandidates,
            "message": "discovery produced no usable candidates",
            "discovery": &outcome,
        })
    } else {
        serde_json::json!({
            "success": true,
            "message": format!("{} candidate(s) discovered", outcome.candidates.len()),
            "discovery": &outcome,
        })
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if sync && !outcome.candidates.is_empty() {
        let library = library_client(config)?;
        let engine = build_sync_engine(config, library, options.dry_run)?;
        let report = engine.sync(&outcome.candidates, options).await?;
        print_sync_report(&report)?;
    }
    Ok(())
}

async fn add(
    config: &Config,
    title: String,
    year: Option<i32>,
    tmdb_id: Option<i64>,
    imdb_id: Option<String>,
    options: &SyncOptions,
) -> Result<()> {
    let library = library_client(config)?;
    let engine = build_sync_engine(config, library, options.dry_run)?;

    let mut candidate = Candidate::new(title);
    candidate.year = year;
    candidate.tmdb_id = tmdb_id;
    candidate.imdb_id = imdb_id;
    candidate.confidence = 1.0;
    candidate.sources.push("manual".to_string());

    let report = engine.sync(&[candidate], options).await?;
    print_sync_report(&report)?;

    let all_ok = report.outcomes.iter().all(|o| o.response().success);
    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn analyze(config: &Config, title: String, year: Option<i32>) -> Result<()> {
    let library = library_client(config)?;
    let fetcher =
        LibraryRatingsFetcher::new(library, Duration::from_secs(config.cache_ttl_secs));

    let ratings = fetcher.ratings_for(&title, year).await?;
    let verdict = QualityAnalyzer::new(config.quality_threshold).analyze(&ratings);

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "title": title,
            "ratings": ratings,
            "verdict": verdict,
        }))?
    );
    Ok(())
}

fn print_sync_report(report: &SyncReport) -> Result<()> {
    let responses: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| {
            let mut value = serde_json::to_value(o.response())?;
            value["title"] = serde_json::Value::String(o.candidate.title.clone());
            value["outcome"] = serde_json::to_value(o.outcome)?;
            Ok::<_, anyhow::Error>(value)
        })
        .collect::<Result<_>>()?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": report.summary(),
            "dry_run": report.dry_run,
            "results": responses,
        }))?
    );
    Ok(())
}
