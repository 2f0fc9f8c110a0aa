//! Radarr API client (library boundary)
//!
//! Thin asynchronous wrapper around the Radarr v3 API. The sync engine talks
//! to it through the `LibraryApi` trait so tests can substitute a double.
//!
//! Lookups are read-only and retried on transient failures; additions are
//! issued exactly once per candidate - a failed add is reported, never
//! silently retried.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};
use crate::models::{NumericRating, RatingSet};

/// A movie record as returned by the library's lookup/list endpoints.
///
/// `id` is present (non-zero) only when the movie already exists in the
/// library; lookup results for unknown movies omit it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryMovie {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(rename = "tmdbId", default)]
    pub tmdb_id: Option<i64>,
    #[serde(rename = "imdbId", default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(rename = "titleSlug", default, skip_serializing_if = "Option::is_none")]
    pub title_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratings: Option<LibraryRatings>,
    #[serde(
        rename = "originalLanguage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_language: Option<LanguageRef>,
}

impl LibraryMovie {
    /// Whether this record is already present in the library.
    pub fn in_library(&self) -> bool {
        self.id.map(|id| id > 0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageRef {
    pub name: String,
}

/// Radarr's per-provider ratings blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryRatings {
    #[serde(default)]
    pub imdb: Option<RatingValue>,
    #[serde(default)]
    pub tmdb: Option<RatingValue>,
    #[serde(rename = "rottenTomatoes", default)]
    pub rotten_tomatoes: Option<RatingValue>,
    #[serde(default)]
    pub metacritic: Option<RatingValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingValue {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub votes: Option<i64>,
}

/// Defaults applied to every addition request.
#[derive(Debug, Clone)]
pub struct AddDefaults {
    pub quality_profile_id: i64,
    pub root_folder_path: String,
    pub monitor: bool,
    pub minimum_availability: Option<String>,
    pub tags: Vec<i64>,
}

/// Payload for Radarr's POST /movie endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMoviePayload {
    pub tmdb_id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub quality_profile_id: i64,
    pub root_folder_path: String,
    pub monitored: bool,
    pub add_options: AddOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_availability: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOptions {
    pub search_for_movie: bool,
    pub monitor: String,
}

/// Assemble the addition payload from a lookup result and the configured
/// defaults. Requires the lookup to carry a content-database id.
pub fn build_add_payload(lookup: &LibraryMovie, defaults: &AddDefaults) -> Result<AddMoviePayload> {
    let tmdb_id = lookup
        .tmdb_id
        .context("lookup result has no content-database id")?;
    Ok(AddMoviePayload {
        tmdb_id,
        title: lookup.title.clone(),
        title_slug: lookup.title_slug.clone(),
        year: lookup.year,
        quality_profile_id: defaults.quality_profile_id,
        root_folder_path: defaults.root_folder_path.clone(),
        monitored: defaults.monitor,
        add_options: AddOptions {
            search_for_movie: false,
            monitor: if defaults.monitor {
                "movieOnly".to_string()
            } else {
                "none".to_string()
            },
        },
        minimum_availability: defaults.minimum_availability.clone(),
        tags: defaults.tags.clone(),
    })
}

/// Extract the typed rating set from a library lookup result.
///
/// Each provider is mapped only when it actually reported a value; absence
/// stays absence. The TMDB user score (0-10) stands in for an audience
/// percentage since the library API does not expose one directly.
pub fn extract_ratings(movie: &LibraryMovie) -> RatingSet {
    let mut out = RatingSet::default();
    let Some(ratings) = &movie.ratings else {
        return out;
    };

    if let Some(imdb) = &ratings.imdb
        && let Some(value) = imdb.value
        && value > 0.0
    {
        out.numeric = Some(NumericRating {
            value,
            votes: imdb.votes.unwrap_or(0),
        });
    }
    if let Some(rt) = &ratings.rotten_tomatoes
        && let Some(value) = rt.value
        && value > 0.0
    {
        out.critic_percent = Some(value);
    }
    if let Some(tmdb) = &ratings.tmdb
        && let Some(value) = tmdb.value
        && value > 0.0
    {
        out.audience_percent = Some(value * 10.0);
    }
    if let Some(mc) = &ratings.metacritic
        && let Some(value) = mc.value
        && value > 0.0
    {
        out.aggregate = Some(value);
    }

    out
}

/// The library API boundary consumed by the sync engine and the validator
/// agent. `lookup` before `add` is mandatory: it is how duplicate additions
/// are avoided.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    /// Free-form lookup. Supports `tmdb:<id>` and `imdb:<id>` terms as well
    /// as plain titles.
    async fn lookup(&self, term: &str) -> Result<Vec<LibraryMovie>>;

    /// All movies currently in the library.
    async fn list_movies(&self) -> Result<Vec<LibraryMovie>>;

    /// Issue one addition request. Never retried by the client.
    async fn add_movie(&self, payload: &AddMoviePayload) -> Result<LibraryMovie>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<SystemStatus>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "instanceName", default)]
    pub instance_name: Option<String>,
}

/// Radarr v3 API client.
pub struct RadarrClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

impl RadarrClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: RateLimitedClient::for_library(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_config: RetryConfig::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.url(path);
        let response = retry_async(
            || async {
                let response = self
                    .client
                    .get_with_headers_and_query(&url, &[("X-Api-Key", self.api_key.as_str())], query)
                    .await?;
                if !response.status().is_success() {
                    anyhow::bail!("library API returned status {}", response.status());
                }
                Ok::<_, anyhow::Error>(response)
            },
            &self.retry_config,
            path,
        )
        .await?;

        response
            .json()
            .await
            .context("Failed to parse library API response")
    }
}

#[async_trait]
impl LibraryApi for RadarrClient {
    async fn lookup(&self, term: &str) -> Result<Vec<LibraryMovie>> {
        debug!(term = %term, "library lookup");
        self.get_json("/movie/lookup", &[("term", term)]).await
    }

    async fn list_movies(&self) -> Result<Vec<LibraryMovie>> {
        self.get_json("/movie", &[]).await
    }

    async fn add_movie(&self, payload: &AddMoviePayload) -> Result<LibraryMovie> {
        let url = self.url("/movie");
        let response = self
            .client
            .post_json(&url, &[("X-Api-Key", self.api_key.as_str())], payload)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, title = %payload.title, "library rejected addition");
            return Err(anyhow!("library API returned status {status}: {body}"));
        }

        response
            .json()
            .await
            .context("Failed to parse addition response")
    }

    async fn ping(&self) -> Result<SystemStatus> {
        self.get_json("/system/status", &[]).await
    }
}
