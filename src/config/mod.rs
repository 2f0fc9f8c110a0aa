//! Application configuration management
//!
//! Configuration is resolved once from environment variables and threaded
//! explicitly into the orchestrator, quality engine, and sync engine at
//! construction. No component reads ambient global state.

use std::env;

use anyhow::{Context, Result};

use crate::quality::DEFAULT_THRESHOLD;

/// One ranked-list discovery source: a page to fetch and the parser that
/// understands its layout.
#[derive(Debug, Clone)]
pub struct DiscoverySource {
    pub name: String,
    pub url: String,
    pub parser: String,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Radarr base URL, e.g. http://localhost:7878/api/v3
    pub radarr_base_url: Option<String>,

    /// Radarr API key
    pub radarr_api_key: Option<String>,

    /// OpenAI API key for the orchestrator and search/rank agents
    pub openai_api_key: Option<String>,

    /// Reasoning model for the orchestrator loop
    pub orchestrator_model: String,

    /// Cheaper model for agent tasks (search, rank)
    pub agent_model: String,

    /// Radarr quality profile used for additions
    pub quality_profile_id: Option<i64>,

    /// Radarr root folder used for additions
    pub root_folder_path: Option<String>,

    /// Radarr minimumAvailability for additions (e.g. "released")
    pub minimum_availability: Option<String>,

    /// Whether added movies are monitored
    pub monitor: bool,

    /// Numeric Radarr tag ids attached to additions
    pub tags: Vec<i64>,

    /// Quality gate threshold on the 0-10 scale
    pub quality_threshold: f64,

    /// Region hint for discovery
    pub region: String,

    /// TTL for the raw fetch/rating cache
    pub cache_ttl_secs: u64,

    /// Per-agent-call timeout
    pub agent_timeout_secs: u64,

    /// Maximum reasoning iterations for the orchestrator loop
    pub max_iterations: usize,

    /// Ranked-list sources in fallback order
    pub sources: Vec<DiscoverySource>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            radarr_base_url: env::var("RADARR_BASE_URL").ok(),
            radarr_api_key: env::var("RADARR_API_KEY").ok(),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),

            orchestrator_model: env::var("CURATOR_ORCHESTRATOR_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),

            agent_model: env::var("CURATOR_AGENT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            quality_profile_id: match env::var("RADARR_QUALITY_PROFILE_ID") {
                Ok(raw) => Some(raw.parse().context("Invalid RADARR_QUALITY_PROFILE_ID")?),
                Err(_) => None,
            },

            root_folder_path: env::var("RADARR_ROOT_FOLDER_PATH").ok(),

            minimum_availability: env::var("RADARR_MINIMUM_AVAILABILITY").ok(),

            monitor: env::var("RADARR_MONITOR")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),

            tags: env::var("RADARR_TAGS")
                .map(|raw| {
                    raw.split(',')
                        .filter_map(|t| t.trim().parse().ok())
                        .collect()
                })
                .unwrap_or_default(),

            quality_threshold: env::var("CURATOR_QUALITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_THRESHOLD),

            region: env::var("CURATOR_REGION").unwrap_or_else(|_| "US".to_string()),

            cache_ttl_secs: env::var("CURATOR_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6 * 3600),

            agent_timeout_secs: env::var("CURATOR_AGENT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),

            max_iterations: env::var("CURATOR_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            sources: default_sources(),
        })
    }

    /// Ensure the library connection settings are present before a sync.
    pub fn require_radarr(&self) -> Result<(String, String)> {
        let base_url = self
            .radarr_base_url
            .clone()
            .context("RADARR_BASE_URL is required")?;
        let api_key = self
            .radarr_api_key
            .clone()
            .context("RADARR_API_KEY is required")?;
        Ok((base_url, api_key))
    }

    /// Ensure the addition defaults are present before a live (non-dry-run) sync.
    pub fn require_add_defaults(&self) -> Result<(i64, String)> {
        let profile = self
            .quality_profile_id
            .context("RADARR_QUALITY_PROFILE_ID is required for live sync")?;
        let root = self
            .root_folder_path
            .clone()
            .context("RADARR_ROOT_FOLDER_PATH is required for live sync")?;
        Ok((profile, root))
    }
}

/// Ranked-list sources in fallback order: the review aggregator's in-theaters
/// page first, the content database's popularity chart as the alternate.
fn default_sources() -> Vec<DiscoverySource> {
    vec![
        DiscoverySource {
            name: "rt_theaters".to_string(),
            url: "https://www.rottentomatoes.com/browse/movies_in_theaters".to_string(),
            parser: "rt_theaters".to_string(),
        },
        DiscoverySource {
            name: "imdb_meter".to_string(),
            url: "https://www.imdb.com/chart/moviemeter/".to_string(),
            parser: "imdb_meter".to_string(),
        },
    ]
}
